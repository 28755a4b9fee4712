//! Client facade: one token, one set of tracked users, one gateway, one poller.

use crate::channels::ChannelData;
use crate::config::Config;
use crate::gateway::{ApiError, Gateway, Window};
use crate::messages::Message;
use crate::poll::{MessageObserver, MessageSource, ObserverId, Poller};
use crate::token::ChatToken;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Feeds the poller from the gateway with a fixed token and user set.
struct GatewaySource {
    gateway: Arc<Gateway>,
    token: ChatToken,
    users: Vec<String>,
}

#[async_trait]
impl MessageSource for GatewaySource {
    async fn fetch_after(&self, after: DateTime<Utc>) -> Result<Vec<Message>, ApiError> {
        self.gateway
            .get_messages(&self.token, &self.users, Window::after(after))
            .await
    }

    fn server_clock(&self) -> Option<DateTime<Utc>> {
        self.gateway.server_clock()
    }
}

/// Chat client for one account.
///
/// Explicit fetches and the background poller share the client's gateway, so they are
/// serialized and spaced together.
pub struct Client {
    gateway: Arc<Gateway>,
    token: ChatToken,
    users: Vec<String>,
    poller: Poller,
}

impl Client {
    /// Client with its own gateway built from `config.api`.
    pub fn new(config: &Config, token: ChatToken, users: Vec<String>) -> Self {
        Self::with_gateway(
            Arc::new(Gateway::new(&config.api)),
            token,
            users,
            config.poll.interval(),
        )
    }

    /// Client on an existing gateway (e.g. several clients sharing one rate limit).
    pub fn with_gateway(
        gateway: Arc<Gateway>,
        token: ChatToken,
        users: Vec<String>,
        poll_interval: Duration,
    ) -> Self {
        let source = Arc::new(GatewaySource {
            gateway: gateway.clone(),
            token: token.clone(),
            users: users.clone(),
        });
        Self {
            gateway,
            token,
            users,
            poller: Poller::new(source, poll_interval),
        }
    }

    /// Client for `config.users`, or every user on the account when that list is empty.
    pub async fn for_account(config: &Config, token: ChatToken) -> Result<Self, ApiError> {
        Self::for_account_with_gateway(Arc::new(Gateway::new(&config.api)), config, token).await
    }

    /// [`Client::for_account`] on an existing gateway, e.g. one that just fetched the token.
    /// The account listing goes through the same gate as every later call.
    pub async fn for_account_with_gateway(
        gateway: Arc<Gateway>,
        config: &Config,
        token: ChatToken,
    ) -> Result<Self, ApiError> {
        let users = if config.users.is_empty() {
            gateway.get_channel_data(&token).await?.user_names()
        } else {
            config.users.clone()
        };
        Ok(Self::with_gateway(
            gateway,
            token,
            users,
            config.poll.interval(),
        ))
    }

    pub fn token(&self) -> &ChatToken {
        &self.token
    }

    pub fn users(&self) -> &[String] {
        &self.users
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// Latest server time seen by this client's gateway.
    pub fn server_clock(&self) -> Option<DateTime<Utc>> {
        self.gateway.server_clock()
    }

    /// Messages received in the window after `time`. `users` defaults to the tracked users.
    pub async fn get_messages_after(
        &self,
        time: DateTime<Utc>,
        users: Option<&[String]>,
    ) -> Result<Vec<Message>, ApiError> {
        let users = users.unwrap_or(self.users.as_slice());
        self.gateway
            .get_messages(&self.token, users, Window::after(time))
            .await
    }

    /// Messages received in the window before `time`. `users` defaults to the tracked users.
    pub async fn get_messages_before(
        &self,
        time: DateTime<Utc>,
        users: Option<&[String]>,
    ) -> Result<Vec<Message>, ApiError> {
        let users = users.unwrap_or(self.users.as_slice());
        self.gateway
            .get_messages(&self.token, users, Window::before(time))
            .await
    }

    pub async fn send_message(&self, from: &str, channel: &str, msg: &str) -> Result<(), ApiError> {
        self.gateway
            .send_message(&self.token, from, channel, msg)
            .await
    }

    pub async fn tell_message(&self, from: &str, to: &str, msg: &str) -> Result<(), ApiError> {
        self.gateway.tell_message(&self.token, from, to, msg).await
    }

    /// Channels the account's users are in and who else is in them.
    pub async fn get_channel_data(&self) -> Result<ChannelData, ApiError> {
        self.gateway.get_channel_data(&self.token).await
    }

    /// Whether the server still accepts this client's token.
    pub async fn is_token_valid(&self) -> Result<bool, ApiError> {
        self.gateway.is_token_valid(self.token.as_str()).await
    }

    /// Receive live messages. The first observer starts polling (requires a tokio runtime).
    pub fn on_messages(&self, observer: Arc<dyn MessageObserver>) -> ObserverId {
        self.poller.register(observer)
    }

    /// Stop delivering to `id`. Polling stops when no observers remain.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.poller.unregister(id)
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_running()
    }

    /// Stop polling and wait for the poll task to exit.
    pub async fn shutdown(&self) {
        self.poller.shutdown().await;
    }
}
