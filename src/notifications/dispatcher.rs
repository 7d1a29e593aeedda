use std::sync::Arc;

use tracing::{debug, error};

use crate::config::EmailConfig;
use crate::error::EmailError;
use crate::notifications::gateway::{EmailGateway, EmailMessage, GatewayError};
use crate::notifications::templates::{EmailTemplates, NotificationKind};
use crate::users::User;

/// Turns workflow events into outbound emails.
#[derive(Clone)]
pub struct NotificationDispatcher {
    gateway: Arc<dyn EmailGateway>,
    templates: Arc<EmailTemplates>,
    domain: String,
    signup_sender: String,
    reset_sender: String,
}

impl NotificationDispatcher {
    pub fn new(
        gateway: Arc<dyn EmailGateway>,
        templates: Arc<EmailTemplates>,
        config: &EmailConfig,
    ) -> Self {
        Self {
            gateway,
            templates,
            domain: config.domain.clone(),
            signup_sender: config.signup_sender.clone(),
            reset_sender: config.reset_sender.clone(),
        }
    }

    fn render(&self, kind: NotificationKind, user: &User, token: Option<&str>) -> EmailMessage {
        let template = self.templates.get(kind);
        let action_url = token.and_then(|t| template.render_action_url(user, &self.domain, t));
        let from = match kind {
            NotificationKind::PasswordReset => &self.reset_sender,
            _ => &self.signup_sender,
        };
        EmailMessage {
            from: from.clone(),
            to: user.email.clone(),
            subject: template.subject.clone(),
            html: template.render_body(user, &self.domain, action_url.as_deref()),
        }
    }

    /// Sends the email; failures are returned to the caller.
    pub async fn send(
        &self,
        kind: NotificationKind,
        user: &User,
        token: Option<&str>,
    ) -> Result<(), EmailError> {
        let message = self.render(kind, user, token);
        match self.gateway.send(&message).await {
            Ok(()) => {
                debug!(user_id = %user.id, kind = ?kind, "email sent");
                Ok(())
            }
            Err(e) => {
                let normalized = normalize(kind, e);
                error!(user_id = %user.id, kind = ?kind, code = normalized.code, error = %normalized.error, "error sending email");
                Err(normalized)
            }
        }
    }

    /// Sends the email; failures are logged and dropped.
    pub async fn send_best_effort(&self, kind: NotificationKind, user: &User, token: Option<&str>) {
        let _ = self.send(kind, user, token).await;
    }
}

fn normalize(kind: NotificationKind, e: GatewayError) -> EmailError {
    let message = if e.message.trim().is_empty() {
        format!("Error sending {} email", kind.label())
    } else {
        e.message.clone()
    };
    EmailError {
        code: e.code.unwrap_or(500),
        message,
        error: e.to_string(),
    }
}
