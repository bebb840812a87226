//! Notification sinks
//!
//! The dispatcher only ever calls [`Notifier::send`]. Delivery is best
//! effort: no retries, a failure is reported back and logged by the caller.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{NotifierConfig, NotifierKind};
use crate::record::SignalRecord;

/// Rendered message: subject, plain body and optional HTML body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub subject: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Build the configured notifier
pub fn notifier_from_config(cfg: &NotifierConfig) -> Result<Box<dyn Notifier>> {
    match cfg.kind {
        NotifierKind::Log => Ok(Box::new(LogNotifier)),
        NotifierKind::Webhook => {
            let url = cfg
                .webhook_url
                .clone()
                .context("webhook notifier needs notifier.webhook_url")?;
            Ok(Box::new(WebhookNotifier::new(url, cfg.timeout_secs)?))
        }
    }
}

pub fn render_signal_message(record: &SignalRecord) -> Notification {
    let subject = format!(
        "{} {} @ {:.4} (score {:.0})",
        record.direction.label(),
        record.symbol,
        record.entry_price,
        record.score
    );

    let passed = record.criteria.passed_names();
    let mut text = String::new();
    text.push_str(&format!(
        "{} signal for {}\n",
        record.direction.label(),
        record.symbol
    ));
    text.push_str(&format!("Entry:       {:.4}\n", record.entry_price));
    text.push_str(&format!("Score:       {:.1}/100\n", record.score));
    text.push_str(&format!(
        "Take profit: {:.4} ({:+.2}%)\n",
        record.take_profit, record.expected_move_pct
    ));
    text.push_str(&format!("Stop loss:   {:.4}\n", record.stop_loss));
    text.push_str(&format!("Risk/reward: {:.2}\n", record.risk_reward));
    text.push_str(&format!("Trend (1h):  {}\n", record.market_trend));
    text.push_str(&format!(
        "Criteria:    {}/{} ({})\n",
        record.criteria_met,
        record.total_criteria,
        passed.join(", ")
    ));
    text.push_str(&format!(
        "RSI 1m/5m/15m: {:.1}/{:.1}/{:.1}  volume x{:.2}\n",
        record.rsi_1m, record.rsi_5m, record.rsi_15m, record.volume_ratio
    ));
    text.push_str(&format!(
        "Time: {}\n",
        record.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    let rows: String = record
        .criteria
        .checks
        .iter()
        .map(|c| {
            format!(
                "<tr><td>{}</td><td>{}</td></tr>",
                c.criterion.name(),
                if c.passed { "yes" } else { "no" }
            )
        })
        .collect();
    let html = format!(
        "<h2>{} {}</h2><p>Entry <b>{:.4}</b>, score <b>{:.1}</b></p>\
         <p>TP {:.4} / SL {:.4}, R:R {:.2}, trend {}</p><table>{}</table>",
        record.direction.label(),
        record.symbol,
        record.entry_price,
        record.score,
        record.take_profit,
        record.stop_loss,
        record.risk_reward,
        record.market_trend,
        rows
    );

    Notification {
        subject,
        text,
        html: Some(html),
    }
}

/// Writes notifications to the log
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        info!("📣 {}\n{}", notification.subject, notification.text);
        Ok(())
    }
}

/// POSTs the notification as JSON, for mail relays and chat hooks
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(StdDuration::from_secs(timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(WebhookNotifier {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .context("Failed to reach notification webhook")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Webhook returned {}: {}", status, body);
        }
        debug!("Webhook accepted '{}'", notification.subject);
        Ok(())
    }
}

/// Keeps every notification in memory; can be told to fail
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail_on_send: AtomicBool,
    attempts: AtomicU64,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.set_fail_on_send(true);
        notifier
    }

    pub fn set_fail_on_send(&self, fail: bool) {
        self.fail_on_send.store(fail, Ordering::Relaxed);
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        if self.fail_on_send.load(Ordering::Relaxed) {
            anyhow::bail!("notification sink unavailable");
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification.clone());
        Ok(())
    }
}

#[async_trait]
impl<T: Notifier + ?Sized> Notifier for std::sync::Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        (**self).send(notification).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Notification {
        Notification {
            subject: "BUY BTCUSDT".to_string(),
            text: "body".to_string(),
            html: None,
        }
    }

    #[tokio::test]
    async fn test_recording_notifier() {
        let notifier = RecordingNotifier::new();
        notifier.send(&sample()).await.unwrap();
        assert_eq!(notifier.sent().len(), 1);

        notifier.set_fail_on_send(true);
        assert!(notifier.send(&sample()).await.is_err());
        assert_eq!(notifier.sent().len(), 1);
        assert_eq!(notifier.attempts(), 2);
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        assert!(LogNotifier.send(&sample()).await.is_ok());
    }

    #[test]
    fn test_notification_json_shape() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["subject"], "BUY BTCUSDT");
        assert!(json.get("html").is_none());
    }

    #[test]
    fn test_webhook_requires_url() {
        let cfg = NotifierConfig {
            kind: NotifierKind::Webhook,
            webhook_url: None,
            timeout_secs: 5,
        };
        assert!(notifier_from_config(&cfg).is_err());

        let cfg = NotifierConfig {
            webhook_url: Some("http://localhost:9/hook".to_string()),
            ..cfg
        };
        assert_eq!(notifier_from_config(&cfg).unwrap().name(), "webhook");
    }
}
