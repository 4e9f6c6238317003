//! Alert delivery.

use async_trait::async_trait;
use serde_json::json;

use crate::error::{AppError, Result};
use crate::models::{HttpConfig, MonitorConfig};

const TELEGRAM_API: &str = "https://api.telegram.org";

/// A channel that can deliver a text alert.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, message: &str) -> Result<()>;
}

/// Telegram Bot API `sendMessage`, Markdown formatted.
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
    token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(http: &HttpConfig, token: impl Into<String>, chat_id: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&http.user_agent)
            .timeout(http.timeout())
            .build()?;
        Ok(Self {
            client,
            api_base: TELEGRAM_API.to_string(),
            token: token.into(),
            chat_id: chat_id.into(),
        })
    }

    /// Point at another Bot API host.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, message: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_base.trim_end_matches('/'), self.token);
        let payload = json!({
            "chat_id": self.chat_id,
            "text": message,
            "parse_mode": "Markdown",
            "disable_web_page_preview": false,
        });

        let response = self.client.post(&url).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::delivery(
                self.name(),
                format!("Bot API answered {}: {}", status, body),
            ));
        }
        log::info!("Message sent to Telegram chat {}", self.chat_id);
        Ok(())
    }
}

/// Writes alerts to the log; used when no delivery channel is configured.
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    fn name(&self) -> &str {
        "console"
    }

    async fn send(&self, message: &str) -> Result<()> {
        log::info!("Alert (console delivery):\n{}", message);
        Ok(())
    }
}

/// Pick Telegram when both credentials are present, the console otherwise.
pub fn from_config(http: &HttpConfig, monitor: &MonitorConfig) -> Result<Box<dyn Notifier>> {
    match (&monitor.telegram_token, &monitor.telegram_chat_id) {
        (Some(token), Some(chat_id)) if !token.is_empty() && !chat_id.is_empty() => {
            Ok(Box::new(TelegramNotifier::new(http, token, chat_id)?))
        }
        _ => {
            log::warn!("TELEGRAM_TOKEN or TELEGRAM_CHAT_ID not set; alerts go to the console");
            Ok(Box::new(ConsoleNotifier))
        }
    }
}

/// Send messages in order; returns how many were delivered.
pub async fn send_batch(notifier: &dyn Notifier, messages: &[String]) -> usize {
    let mut sent = 0;
    for message in messages {
        match notifier.send(message).await {
            Ok(()) => sent += 1,
            Err(e) => log::error!("{} delivery failed: {}", notifier.name(), e),
        }
    }
    sent
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Fails every message containing "fail".
    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, message: &str) -> Result<()> {
            if message.contains("fail") {
                return Err(AppError::delivery("recording", "rejected"));
            }
            self.sent.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_send_batch_counts_deliveries() {
        let notifier = Recording::default();
        let messages = vec!["one".to_string(), "fail".to_string(), "three".to_string()];

        let sent = send_batch(&notifier, &messages).await;

        assert_eq!(sent, 2);
        assert_eq!(*notifier.sent.lock().unwrap(), vec!["one", "three"]);
    }

    #[test]
    fn test_console_fallback_without_credentials() {
        let mut monitor = MonitorConfig::default();
        let notifier = from_config(&HttpConfig::default(), &monitor).unwrap();
        assert_eq!(notifier.name(), "console");

        monitor.telegram_token = Some("123:abc".into());
        monitor.telegram_chat_id = Some(String::new());
        let notifier = from_config(&HttpConfig::default(), &monitor).unwrap();
        assert_eq!(notifier.name(), "console");

        monitor.telegram_chat_id = Some("42".into());
        let notifier = from_config(&HttpConfig::default(), &monitor).unwrap();
        assert_eq!(notifier.name(), "telegram");
    }

    /// Answer one HTTP request with `status_line` and return the base URL.
    async fn one_shot_server(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_telegram_rejection_is_delivery_error() {
        let base = one_shot_server("400 Bad Request", r#"{"ok":false,"description":"chat not found"}"#).await;
        let notifier = TelegramNotifier::new(&HttpConfig::default(), "123:abc", "42")
            .unwrap()
            .with_api_base(base);

        let err = notifier.send("hello").await.unwrap_err();

        match err {
            AppError::Delivery { channel, message } => {
                assert_eq!(channel, "telegram");
                assert!(message.contains("400"));
                assert!(message.contains("chat not found"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
