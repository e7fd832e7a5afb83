use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

const TELEGRAM_API: &str = "https://api.telegram.org";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("failed to build http client: {0}")]
    Config(#[source] reqwest::Error),

    #[error("telegram returned {status}: {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Delivers alert text to a chat user.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify(&self, user_id: i64, text: &str) -> Result<(), NotifyError>;
}

/// Sends plain-text messages through the Telegram Bot API.
pub struct TelegramNotifier {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>) -> Result<Self, NotifyError> {
        Self::with_base_url(TELEGRAM_API, token, REQUEST_TIMEOUT)
    }

    /// Every request is bounded by `timeout` so a silent API cannot stall
    /// the caller.
    pub fn with_base_url(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(NotifyError::Config)?;
        Ok(Self {
            base_url: base_url.into(),
            token: token.into(),
            http,
        })
    }

    fn url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.base_url, self.token)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, user_id: i64, text: &str) -> Result<(), NotifyError> {
        let resp = self
            .http
            .post(self.url())
            .json(&SendMessage {
                chat_id: user_id,
                text,
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected { status, body });
        }
        Ok(())
    }
}

/// Writes alerts to the log instead of delivering them.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, user_id: i64, text: &str) -> Result<(), NotifyError> {
        tracing::info!(user_id, text, "alert (no bot token configured)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_message_url_embeds_token() {
        let notifier = TelegramNotifier::new("123:abc").unwrap();
        assert_eq!(notifier.url(), "https://api.telegram.org/bot123:abc/sendMessage");
    }

    #[test]
    fn payload_is_plain_text() {
        let body = serde_json::to_value(SendMessage {
            chat_id: 42,
            text: "⚠️ Disk WARN",
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"chat_id": 42, "text": "⚠️ Disk WARN"}));
    }

    #[tokio::test]
    async fn unreachable_api_is_network_error() {
        let notifier = TelegramNotifier::with_base_url("http://127.0.0.1:1", "t", REQUEST_TIMEOUT).unwrap();
        let err = notifier.notify(1, "hi").await.unwrap_err();
        assert!(matches!(err, NotifyError::Network(_)));
    }

    #[tokio::test]
    async fn silent_api_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept and hold connections without ever answering.
        let silent = tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                open.push(socket);
            }
        });

        let notifier =
            TelegramNotifier::with_base_url(format!("http://{addr}"), "t", Duration::from_millis(200)).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), notifier.notify(1, "hi"))
            .await
            .expect("notify must give up on its own");

        match result {
            Err(NotifyError::Network(e)) => assert!(e.is_timeout()),
            other => panic!("expected a timeout, got {other:?}"),
        }
        silent.abort();
    }

    #[tokio::test]
    async fn log_notifier_never_fails() {
        assert!(LogNotifier.notify(1, "hello").await.is_ok());
    }
}
