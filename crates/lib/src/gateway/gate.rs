//! The rate-limited gateway: one call in flight at a time, minimum spacing between calls,
//! bounded retry on transport failure, and the server clock taken from reply `Date` headers.

use crate::config::ApiConfig;
use crate::gateway::error::ApiError;
use crate::gateway::protocol::{Endpoint, Envelope};
use crate::gateway::transport::{HttpReply, ReqwestTransport, Transport};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

const NO_SERVER_CLOCK: i64 = i64::MIN;

/// Serializes every call to the chat API for one client.
///
/// The gate is a FIFO mutex held for the whole call (spacing wait, every retry attempt, reply
/// parsing), so concurrent callers run strictly in submission order.
pub struct Gateway {
    base_url: String,
    call_spacing: Duration,
    account_data_spacing: Duration,
    max_attempts: u32,
    retry_delay: Duration,
    transport: Arc<dyn Transport>,
    /// Completion time of the previous call; `None` before the first one.
    gate: Mutex<Option<Instant>>,
    /// Server time in Unix ms from the latest reply, or `NO_SERVER_CLOCK`.
    server_clock: AtomicI64,
}

impl Gateway {
    pub fn new(config: &ApiConfig) -> Self {
        Self::with_transport(config, Arc::new(ReqwestTransport::new()))
    }

    pub fn with_transport(config: &ApiConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            call_spacing: config.call_spacing(),
            account_data_spacing: config.account_data_spacing(),
            max_attempts: config.retry_attempts.max(1),
            retry_delay: config.retry_delay(),
            transport,
            gate: Mutex::new(None),
            server_clock: AtomicI64::new(NO_SERVER_CLOCK),
        }
    }

    /// Minimum gap between the previous call's completion and this call's start.
    pub fn spacing_for(&self, endpoint: Endpoint) -> Duration {
        match endpoint {
            Endpoint::AccountData => self.account_data_spacing,
            _ => self.call_spacing,
        }
    }

    /// Server time from the most recent reply that carried one.
    pub fn server_clock(&self) -> Option<DateTime<Utc>> {
        match self.server_clock.load(Ordering::SeqCst) {
            NO_SERVER_CLOCK => None,
            ms => DateTime::from_timestamp_millis(ms),
        }
    }

    fn set_server_clock(&self, time: DateTime<Utc>) {
        self.server_clock
            .store(time.timestamp_millis(), Ordering::SeqCst);
    }

    /// Make one API call and decode the `ok: true` body into `Res`.
    pub async fn call<Req, Res>(&self, endpoint: Endpoint, request: &Req) -> Result<Res, ApiError>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let body = serde_json::to_value(request).map_err(|e| {
            ApiError::Protocol(format!("encoding {} request: {}", endpoint, e))
        })?;
        let value = self.call_value(endpoint, &body).await?;
        serde_json::from_value(value)
            .map_err(|e| ApiError::Protocol(format!("{} response: {}", endpoint, e)))
    }

    async fn call_value(
        &self,
        endpoint: Endpoint,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, ApiError> {
        let last_call = self.gate.lock().await;
        if let Some(last) = *last_call {
            let wait = self.spacing_for(endpoint).saturating_sub(last.elapsed());
            if !wait.is_zero() {
                log::debug!("{}: waiting {:?} for rate limit", endpoint, wait);
                tokio::time::sleep(wait).await;
            }
        }
        // Marked on drop so a caller cancelled mid-request still spaces the next one.
        let _completion = CompletionMark(last_call);
        self.exchange(endpoint, body).await
    }

    async fn exchange(
        &self,
        endpoint: Endpoint,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, ApiError> {
        let url = format!("{}/{}.json", self.base_url, endpoint.method());
        let reply = self.post_with_retry(endpoint, &url, body).await?;
        self.interpret(reply)
    }

    async fn post_with_retry(
        &self,
        endpoint: Endpoint,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<HttpReply, ApiError> {
        let mut attempt = 1;
        loop {
            log::debug!("{}: attempt {}/{}", endpoint, attempt, self.max_attempts);
            match self.transport.post_json(url, body).await {
                Ok(reply) => return Ok(reply),
                Err(e) if attempt < self.max_attempts => {
                    log::warn!("{}: attempt {} failed: {}", endpoint, attempt, e);
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(ApiError::Network(e)),
            }
        }
    }

    /// Classify a completed HTTP exchange. Only an `ok: true` reply moves the server clock.
    fn interpret(&self, reply: HttpReply) -> Result<serde_json::Value, ApiError> {
        if reply.status == 401 {
            return Err(ApiError::Auth);
        }

        let date = reply
            .date
            .as_deref()
            .ok_or_else(|| ApiError::Protocol("response has no date header".to_string()))?;
        let server_time = DateTime::parse_from_rfc2822(date)
            .map_err(|e| ApiError::Protocol(format!("bad date header {:?}: {}", date, e)))?
            .with_timezone(&Utc);

        if let Some(content_type) = reply.content_type.as_deref() {
            if !content_type.to_ascii_lowercase().contains("json") {
                return Err(ApiError::Protocol(format!(
                    "expected JSON, got {} (status {})",
                    content_type, reply.status
                )));
            }
        }
        if reply.body.trim().is_empty() {
            return Err(ApiError::Protocol(format!(
                "response body empty, got status code {}",
                reply.status
            )));
        }

        let value: serde_json::Value = serde_json::from_str(&reply.body)
            .map_err(|e| ApiError::Protocol(format!("invalid JSON: {}", e)))?;
        let envelope = Envelope::deserialize(&value)
            .map_err(|e| ApiError::Protocol(format!("bad envelope: {}", e)))?;

        if let Some(names) = envelope.invalid_usernames.filter(|n| !n.is_empty()) {
            return Err(ApiError::InvalidUsernames(names));
        }
        if envelope.ok {
            self.set_server_clock(server_time);
            Ok(value)
        } else {
            Err(ApiError::Remote(
                envelope.msg.unwrap_or_else(|| "request failed".to_string()),
            ))
        }
    }
}

/// Holds the gate and stamps the completion time when released, however the call ends.
struct CompletionMark<'a>(MutexGuard<'a, Option<Instant>>);

impl Drop for CompletionMark<'_> {
    fn drop(&mut self) {
        *self.0 = Some(Instant::now());
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    pub const DATE: &str = "Tue, 15 Nov 1994 08:12:31 GMT";

    /// Replays scripted replies and records when and with what each attempt was made.
    #[derive(Default)]
    pub struct ScriptedTransport {
        replies: StdMutex<VecDeque<Result<HttpReply, String>>>,
        pub attempts: StdMutex<Vec<(Instant, String, serde_json::Value)>>,
    }

    impl ScriptedTransport {
        pub fn push(&self, reply: Result<HttpReply, String>) {
            self.replies.lock().unwrap().push_back(reply);
        }

        pub fn push_ok(&self, body: serde_json::Value) {
            self.push(Ok(ok_reply(body)));
        }

        pub fn attempt_count(&self) -> usize {
            self.attempts.lock().unwrap().len()
        }
    }

    pub fn ok_reply(body: serde_json::Value) -> HttpReply {
        HttpReply {
            status: 200,
            date: Some(DATE.to_string()),
            content_type: Some("application/json; charset=utf-8".to_string()),
            body: body.to_string(),
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn post_json(
            &self,
            url: &str,
            body: &serde_json::Value,
        ) -> Result<HttpReply, String> {
            self.attempts
                .lock()
                .unwrap()
                .push((Instant::now(), url.to_string(), body.clone()));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ok_reply(serde_json::json!({ "ok": true }))))
        }
    }

    pub fn test_config() -> ApiConfig {
        ApiConfig {
            base_url: "https://chat.test/mobile/".to_string(),
            call_spacing_ms: 2000,
            account_data_spacing_ms: 5000,
            retry_attempts: 4,
            retry_delay_ms: 1000,
        }
    }

    fn gateway() -> (Gateway, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::default());
        (Gateway::with_transport(&test_config(), transport.clone()), transport)
    }

    #[tokio::test(start_paused = true)]
    async fn first_call_is_immediate_and_hits_method_url() {
        let (gw, transport) = gateway();
        let start = Instant::now();
        let _: serde_json::Value = gw
            .call(Endpoint::Chats, &serde_json::json!({ "a": 1 }))
            .await
            .unwrap();
        let attempts = transport.attempts.lock().unwrap();
        assert_eq!(attempts[0].0, start);
        assert_eq!(attempts[0].1, "https://chat.test/mobile/chats.json");
        assert_eq!(attempts[0].2, serde_json::json!({ "a": 1 }));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_calls_are_spaced_and_fifo() {
        let (gw, transport) = gateway();
        let gw = Arc::new(gw);
        let mut handles = Vec::new();
        for i in 0..4 {
            let gw = gw.clone();
            handles.push(tokio::spawn(async move {
                let _: serde_json::Value = gw
                    .call(Endpoint::CreateChat, &serde_json::json!({ "n": i }))
                    .await
                    .unwrap();
            }));
            tokio::task::yield_now().await;
        }
        for h in handles {
            h.await.unwrap();
        }
        let attempts = transport.attempts.lock().unwrap();
        assert_eq!(attempts.len(), 4);
        for pair in attempts.windows(2) {
            assert!(pair[1].0 - pair[0].0 >= Duration::from_millis(2000));
        }
        let order: Vec<i64> = attempts.iter().map(|a| a.2["n"].as_i64().unwrap()).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn account_data_waits_longer() {
        let (gw, transport) = gateway();
        let _: serde_json::Value = gw.call(Endpoint::Chats, &serde_json::json!({})).await.unwrap();
        let _: serde_json::Value = gw
            .call(Endpoint::AccountData, &serde_json::json!({}))
            .await
            .unwrap();
        let attempts = transport.attempts.lock().unwrap();
        assert!(attempts[1].0 - attempts[0].0 >= Duration::from_millis(5000));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_below_bound_recover() {
        let (gw, transport) = gateway();
        for _ in 0..3 {
            transport.push(Err("connection reset".into()));
        }
        transport.push_ok(serde_json::json!({ "ok": true, "chat_token": "x" }));
        let v: serde_json::Value = gw.call(Endpoint::GetToken, &serde_json::json!({})).await.unwrap();
        assert_eq!(v["chat_token"], "x");
        assert_eq!(transport.attempt_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_at_bound_surface_last_error() {
        let (gw, transport) = gateway();
        for i in 0..4 {
            transport.push(Err(format!("failure {}", i)));
        }
        transport.push_ok(serde_json::json!({ "ok": true }));
        let r: Result<serde_json::Value, _> = gw.call(Endpoint::Chats, &serde_json::json!({})).await;
        assert_eq!(r.unwrap_err(), ApiError::Network("failure 3".into()));
        assert_eq!(transport.attempt_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn unauthorized_is_not_retried_and_keeps_clock() {
        let (gw, transport) = gateway();
        transport.push(Ok(HttpReply {
            status: 401,
            date: Some(DATE.to_string()),
            content_type: Some("application/json".into()),
            body: String::new(),
        }));
        let r: Result<serde_json::Value, _> = gw.call(Endpoint::GetToken, &serde_json::json!({})).await;
        assert_eq!(r.unwrap_err(), ApiError::Auth);
        assert_eq!(transport.attempt_count(), 1);
        assert!(gw.server_clock().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn success_updates_server_clock() {
        let (gw, _transport) = gateway();
        let _: serde_json::Value = gw.call(Endpoint::Chats, &serde_json::json!({})).await.unwrap();
        assert_eq!(gw.server_clock().unwrap().timestamp(), 784_887_151);
    }

    #[tokio::test(start_paused = true)]
    async fn remote_failure_is_surfaced_verbatim_without_retry() {
        let (gw, transport) = gateway();
        transport.push_ok(serde_json::json!({ "ok": false, "msg": "channel does not exist" }));
        let r: Result<serde_json::Value, _> = gw.call(Endpoint::CreateChat, &serde_json::json!({})).await;
        assert_eq!(r.unwrap_err(), ApiError::Remote("channel does not exist".into()));
        assert_eq!(transport.attempt_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_replies_leave_server_clock_alone() {
        let (gw, transport) = gateway();
        transport.push_ok(serde_json::json!({ "ok": false, "msg": "nope" }));
        transport.push_ok(serde_json::json!({ "ok": true, "invalid_usernames": ["ghost"] }));
        for _ in 0..2 {
            let r: Result<serde_json::Value, _> = gw.call(Endpoint::Chats, &serde_json::json!({})).await;
            assert!(r.is_err());
        }
        assert!(gw.server_clock().is_none());
    }

    /// Takes half a second to answer each request.
    struct SlowTransport {
        starts: StdMutex<Vec<Instant>>,
    }

    #[async_trait]
    impl Transport for SlowTransport {
        async fn post_json(
            &self,
            _url: &str,
            _body: &serde_json::Value,
        ) -> Result<HttpReply, String> {
            self.starts.lock().unwrap().push(Instant::now());
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(ok_reply(serde_json::json!({ "ok": true })))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_call_still_spaces_the_next_one() {
        let transport = Arc::new(SlowTransport {
            starts: StdMutex::new(Vec::new()),
        });
        let gw = Gateway::with_transport(&test_config(), transport.clone());

        let abandoned = tokio::time::timeout(
            Duration::from_millis(100),
            gw.call::<_, serde_json::Value>(Endpoint::Chats, &serde_json::json!({})),
        )
        .await;
        assert!(abandoned.is_err());

        let _: serde_json::Value = gw
            .call(Endpoint::CreateChat, &serde_json::json!({}))
            .await
            .unwrap();
        let starts = transport.starts.lock().unwrap();
        assert_eq!(starts.len(), 2);
        assert!(starts[1] - starts[0] >= Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_replies_are_protocol_errors() {
        let (gw, transport) = gateway();
        transport.push(Ok(HttpReply {
            content_type: Some("text/html".into()),
            body: "<html></html>".into(),
            ..ok_reply(serde_json::json!({}))
        }));
        transport.push(Ok(HttpReply {
            body: "  ".into(),
            ..ok_reply(serde_json::json!({}))
        }));
        transport.push(Ok(HttpReply {
            body: "{ nope".into(),
            ..ok_reply(serde_json::json!({}))
        }));
        transport.push(Ok(HttpReply {
            date: None,
            ..ok_reply(serde_json::json!({ "ok": true }))
        }));
        for _ in 0..4 {
            let r: Result<serde_json::Value, _> = gw.call(Endpoint::Chats, &serde_json::json!({})).await;
            assert!(matches!(r, Err(ApiError::Protocol(_))), "{:?}", r);
        }
        assert_eq!(transport.attempt_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_usernames_are_reported_by_name() {
        let (gw, transport) = gateway();
        transport.push_ok(serde_json::json!({
            "ok": true, "chats": {}, "invalid_usernames": ["nobody", "ghost"]
        }));
        let r: Result<serde_json::Value, _> = gw.call(Endpoint::Chats, &serde_json::json!({})).await;
        assert_eq!(
            r.unwrap_err(),
            ApiError::InvalidUsernames(vec!["nobody".into(), "ghost".into()])
        );
    }
}
