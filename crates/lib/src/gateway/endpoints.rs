//! Typed wrappers over the four API methods.

use crate::channels::ChannelData;
use crate::gateway::error::ApiError;
use crate::gateway::gate::Gateway;
use crate::gateway::protocol::{
    Ack, AccountDataRequest, AccountDataResponse, ChatTarget, ChatsRequest, ChatsResponse,
    CreateChatRequest, Endpoint, GetTokenRequest, GetTokenResponse, Window,
};
use crate::messages::{normalize, Message};
use crate::token::ChatToken;

/// Reply to a token check when the token is accepted but the (empty) user list is not.
const NO_VALID_USERNAMES: &str = "no valid usernames were provided";

impl Gateway {
    /// Exchange a chat pass (from `chat_pass` in game) for a chat token.
    pub async fn get_token(&self, pass: &str) -> Result<ChatToken, ApiError> {
        let res: GetTokenResponse = self
            .call(Endpoint::GetToken, &GetTokenRequest { pass })
            .await?;
        ChatToken::new(res.chat_token)
    }

    /// Channels each of the account's users is in, and the members of those channels.
    pub async fn get_channel_data(&self, token: &ChatToken) -> Result<ChannelData, ApiError> {
        let res: AccountDataResponse = self
            .call(
                Endpoint::AccountData,
                &AccountDataRequest {
                    chat_token: token.as_str(),
                },
            )
            .await?;
        ChannelData::from_account_data(res.users)
    }

    /// Messages received by `users` in the window anchored at `window`, merged and time-ordered.
    pub async fn get_messages(
        &self,
        token: &ChatToken,
        users: &[String],
        window: Window,
    ) -> Result<Vec<Message>, ApiError> {
        let res: ChatsResponse = self
            .call(
                Endpoint::Chats,
                &ChatsRequest {
                    chat_token: token.as_str(),
                    usernames: users,
                    window,
                },
            )
            .await?;
        Ok(normalize(res.into_recipients()?))
    }

    /// Send `msg` to `channel` as user `from`.
    pub async fn send_message(
        &self,
        token: &ChatToken,
        from: &str,
        channel: &str,
        msg: &str,
    ) -> Result<(), ApiError> {
        self.create_chat(token, from, ChatTarget::Channel(channel), msg)
            .await
    }

    /// Tell `msg` to user `to` as user `from`.
    pub async fn tell_message(
        &self,
        token: &ChatToken,
        from: &str,
        to: &str,
        msg: &str,
    ) -> Result<(), ApiError> {
        self.create_chat(token, from, ChatTarget::Tell(to), msg).await
    }

    async fn create_chat(
        &self,
        token: &ChatToken,
        from: &str,
        target: ChatTarget<'_>,
        msg: &str,
    ) -> Result<(), ApiError> {
        let _: Ack = self
            .call(
                Endpoint::CreateChat,
                &CreateChatRequest {
                    chat_token: token.as_str(),
                    username: from,
                    target,
                    msg,
                },
            )
            .await?;
        Ok(())
    }

    /// Ask the server whether it accepts `token`. Wrong-length tokens are rejected without a call.
    pub async fn is_token_valid(&self, token: &str) -> Result<bool, ApiError> {
        let Ok(token) = ChatToken::new(token) else {
            return Ok(false);
        };
        let check = ChatsRequest {
            chat_token: token.as_str(),
            usernames: &[],
            window: Window::After(0.0),
        };
        match self.call::<_, serde_json::Value>(Endpoint::Chats, &check).await {
            Ok(_) => Ok(true),
            Err(ApiError::Auth) => Ok(false),
            Err(ApiError::Remote(msg)) if msg == NO_VALID_USERNAMES => Ok(true),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::gateway::gate::tests::{ok_reply, test_config, ScriptedTransport};
    use crate::gateway::transport::HttpReply;
    use crate::gateway::{ApiError, Gateway};
    use crate::messages::Message;
    use crate::token::ChatToken;
    use serde_json::json;
    use std::sync::Arc;

    const TOKEN: &str = "abcdefghij0123456789";

    fn gateway() -> (Gateway, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::default());
        (Gateway::with_transport(&test_config(), transport.clone()), transport)
    }

    #[tokio::test(start_paused = true)]
    async fn get_token_returns_chat_token() {
        let (gw, transport) = gateway();
        transport.push_ok(json!({ "ok": true, "chat_token": TOKEN }));
        let token = gw.get_token("pass1").await.unwrap();
        assert_eq!(token.as_str(), TOKEN);
        let attempts = transport.attempts.lock().unwrap();
        assert_eq!(attempts[0].2, json!({ "pass": "pass1" }));
    }

    #[tokio::test(start_paused = true)]
    async fn fanned_out_channel_message_merges_recipients() {
        let (gw, transport) = gateway();
        let m1 = json!({ "id": "m1", "channel": "general", "from_user": "alice", "msg": "hi", "t": 1000 });
        transport.push_ok(json!({ "ok": true, "chats": { "bob": [m1.clone()], "carol": [m1] } }));
        let token = ChatToken::new(TOKEN).unwrap();
        let users = vec!["bob".to_string(), "carol".to_string()];
        let messages = gw
            .get_messages(&token, &users, crate::gateway::Window::After(990.0))
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            Message::Channel(m) => assert_eq!(m.recipients, vec!["bob", "carol"]),
            other => panic!("expected channel message, got {:?}", other),
        }
        let attempts = transport.attempts.lock().unwrap();
        assert_eq!(
            attempts[0].2,
            json!({ "chat_token": TOKEN, "usernames": ["bob", "carol"], "after": 990.0 })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn send_and_tell_target_the_right_field() {
        let (gw, transport) = gateway();
        let token = ChatToken::new(TOKEN).unwrap();
        gw.send_message(&token, "bob", "0000", "hello").await.unwrap();
        gw.tell_message(&token, "bob", "carol", "psst").await.unwrap();
        let attempts = transport.attempts.lock().unwrap();
        assert_eq!(attempts[0].1, "https://chat.test/mobile/create_chat.json");
        assert_eq!(attempts[0].2["channel"], "0000");
        assert_eq!(attempts[1].2["tell"], "carol");
        assert!(attempts[1].2.get("channel").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn token_validity_follows_the_reply() {
        let (gw, transport) = gateway();
        assert!(!gw.is_token_valid("short").await.unwrap());
        assert_eq!(transport.attempt_count(), 0);

        transport.push_ok(json!({ "ok": false, "msg": "no valid usernames were provided", "invalid_usernames": [] }));
        assert!(gw.is_token_valid(TOKEN).await.unwrap());

        transport.push(Ok(HttpReply {
            status: 401,
            ..ok_reply(json!({}))
        }));
        assert!(!gw.is_token_valid(TOKEN).await.unwrap());

        transport.push_ok(json!({ "ok": false, "msg": "slow down" }));
        assert_eq!(
            gw.is_token_valid(TOKEN).await.unwrap_err(),
            ApiError::Remote("slow down".into())
        );
        let attempts = transport.attempts.lock().unwrap();
        assert_eq!(attempts[0].2, json!({ "chat_token": TOKEN, "usernames": [], "after": 0.0 }));
    }
}
