use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::info;

use crate::config::SmtpConfig;

/// A fully rendered outbound email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Rejection reported by an email gateway.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct GatewayError {
    pub code: Option<u16>,
    pub message: String,
}

impl GatewayError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait EmailGateway: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), GatewayError>;
}

/// SMTP relay over STARTTLS.
#[derive(Clone)]
pub struct SmtpGateway {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpGateway {
    pub fn new(config: &SmtpConfig) -> anyhow::Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .with_context(|| format!("smtp relay {}", config.host))?
            .port(config.port)
            .timeout(Some(Duration::from_secs(10)));
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }
        Ok(Self {
            transport: builder.build(),
        })
    }
}

fn mailbox(address: &str, role: &str) -> Result<Mailbox, GatewayError> {
    address
        .parse::<Mailbox>()
        .map_err(|e| GatewayError::new(format!("invalid {} address: {}", role, e)))
}

#[async_trait]
impl EmailGateway for SmtpGateway {
    async fn send(&self, message: &EmailMessage) -> Result<(), GatewayError> {
        let email = Message::builder()
            .from(mailbox(&message.from, "from")?)
            .to(mailbox(&message.to, "to")?)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(message.html.clone())
            .map_err(|e| GatewayError::new(format!("failed to build email: {}", e)))?;

        self.transport.send(email).await.map_err(|e| GatewayError {
            code: e.status().and_then(|code| code.to_string().parse().ok()),
            message: e.to_string(),
        })?;
        Ok(())
    }
}

/// Writes messages to the log instead of sending them; used when no SMTP
/// relay is configured.
#[derive(Clone, Default)]
pub struct LogGateway;

#[async_trait]
impl EmailGateway for LogGateway {
    async fn send(&self, message: &EmailMessage) -> Result<(), GatewayError> {
        info!(to = %message.to, subject = %message.subject, "email not sent: no SMTP relay configured");
        Ok(())
    }
}

/// Keeps every message in memory; can be told to reject sends.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingGateway {
    sent: std::sync::Mutex<Vec<EmailMessage>>,
    failure: std::sync::Mutex<Option<GatewayError>>,
}

#[cfg(test)]
impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_with(&self, error: Option<GatewayError>) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = error;
        }
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
#[async_trait]
impl EmailGateway for RecordingGateway {
    async fn send(&self, message: &EmailMessage) -> Result<(), GatewayError> {
        if let Some(err) = self.failure.lock().ok().and_then(|f| f.clone()) {
            return Err(err);
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message.clone());
        }
        Ok(())
    }
}
