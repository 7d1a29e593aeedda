use std::path::Path;

use anyhow::Context;

use crate::users::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    SignupConfirmation,
    EarlyAccessInvitation,
    Welcome,
    PasswordReset,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 4] = [
        NotificationKind::SignupConfirmation,
        NotificationKind::EarlyAccessInvitation,
        NotificationKind::Welcome,
        NotificationKind::PasswordReset,
    ];

    pub fn label(self) -> &'static str {
        match self {
            NotificationKind::SignupConfirmation => "confirmation",
            NotificationKind::EarlyAccessInvitation => "early access invitation",
            NotificationKind::Welcome => "subscription completed",
            NotificationKind::PasswordReset => "password reset",
        }
    }

    fn file_name(self) -> &'static str {
        match self {
            NotificationKind::SignupConfirmation => "signup-confirmation.html",
            NotificationKind::EarlyAccessInvitation => "early-access-invitation.html",
            NotificationKind::Welcome => "subscription-completed.html",
            NotificationKind::PasswordReset => "password-reset.html",
        }
    }

    fn builtin_body(self) -> &'static str {
        match self {
            NotificationKind::SignupConfirmation => {
                include_str!("../../templates/emails/signup-confirmation.html")
            }
            NotificationKind::EarlyAccessInvitation => {
                include_str!("../../templates/emails/early-access-invitation.html")
            }
            NotificationKind::Welcome => {
                include_str!("../../templates/emails/subscription-completed.html")
            }
            NotificationKind::PasswordReset => {
                include_str!("../../templates/emails/password-reset.html")
            }
        }
    }

    fn subject(self) -> &'static str {
        match self {
            NotificationKind::SignupConfirmation => "Please confirm your subscription",
            NotificationKind::EarlyAccessInvitation => "Your early access invitation",
            NotificationKind::Welcome => "Welcome",
            NotificationKind::PasswordReset => "Reset your password",
        }
    }

    fn action_url(self) -> Option<&'static str> {
        match self {
            NotificationKind::SignupConfirmation => {
                Some("https://{DOMAIN}/api/v1/signup/{USER_ID}/confirm?token={TOKEN}")
            }
            NotificationKind::EarlyAccessInvitation => {
                Some("https://{DOMAIN}/signup/early_access/{USER_ID}/confirm?token={TOKEN}")
            }
            NotificationKind::Welcome => None,
            NotificationKind::PasswordReset => {
                Some("https://{DOMAIN}/password/{USER_ID}/reset?token={TOKEN}")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmailTemplate {
    pub subject: String,
    pub body: String,
    pub action_url: Option<String>,
}

impl EmailTemplate {
    fn builtin(kind: NotificationKind) -> Self {
        Self {
            subject: kind.subject().to_string(),
            body: kind.builtin_body().to_string(),
            action_url: kind.action_url().map(str::to_string),
        }
    }

    /// The link embedded in the email, if this kind carries one.
    pub fn render_action_url(&self, user: &User, domain: &str, token: &str) -> Option<String> {
        self.action_url.as_ref().map(|url| {
            url.replace("{DOMAIN}", domain)
                .replace("{USER_ID}", &user.id.to_string())
                .replace("{TOKEN}", token)
        })
    }

    pub fn render_body(&self, user: &User, domain: &str, action_url: Option<&str>) -> String {
        self.body
            .replace("{ACTION_URL}", &escape_html(action_url.unwrap_or("")))
            .replace("{FIRST_NAME}", &escape_html(&user.first_name))
            .replace(
                "{LAST_NAME}",
                &escape_html(user.last_name.as_deref().unwrap_or("")),
            )
            .replace("{EMAIL}", &escape_html(&user.email))
            .replace("{DOMAIN}", &escape_html(domain))
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Subject, body and link template for every notification kind.
#[derive(Debug, Clone)]
pub struct EmailTemplates {
    signup_confirmation: EmailTemplate,
    early_access_invitation: EmailTemplate,
    welcome: EmailTemplate,
    password_reset: EmailTemplate,
}

impl EmailTemplates {
    pub fn builtin() -> Self {
        Self {
            signup_confirmation: EmailTemplate::builtin(NotificationKind::SignupConfirmation),
            early_access_invitation: EmailTemplate::builtin(
                NotificationKind::EarlyAccessInvitation,
            ),
            welcome: EmailTemplate::builtin(NotificationKind::Welcome),
            password_reset: EmailTemplate::builtin(NotificationKind::PasswordReset),
        }
    }

    /// Built-in templates, with bodies overridden by any matching file in
    /// `dir`. The result is validated.
    pub fn load(dir: Option<&Path>) -> anyhow::Result<Self> {
        let mut templates = Self::builtin();
        if let Some(dir) = dir {
            for kind in NotificationKind::ALL {
                let path = dir.join(kind.file_name());
                if path.exists() {
                    let body = std::fs::read_to_string(&path)
                        .with_context(|| format!("read email template {}", path.display()))?;
                    templates.get_mut(kind).body = body;
                }
            }
        }
        templates.validate()?;
        Ok(templates)
    }

    pub fn get(&self, kind: NotificationKind) -> &EmailTemplate {
        match kind {
            NotificationKind::SignupConfirmation => &self.signup_confirmation,
            NotificationKind::EarlyAccessInvitation => &self.early_access_invitation,
            NotificationKind::Welcome => &self.welcome,
            NotificationKind::PasswordReset => &self.password_reset,
        }
    }

    fn get_mut(&mut self, kind: NotificationKind) -> &mut EmailTemplate {
        match kind {
            NotificationKind::SignupConfirmation => &mut self.signup_confirmation,
            NotificationKind::EarlyAccessInvitation => &mut self.early_access_invitation,
            NotificationKind::Welcome => &mut self.welcome,
            NotificationKind::PasswordReset => &mut self.password_reset,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for kind in NotificationKind::ALL {
            let template = self.get(kind);
            anyhow::ensure!(
                !template.subject.trim().is_empty(),
                "'subject' in '{}' template is empty",
                kind.label()
            );
            if let Some(url) = &template.action_url {
                for placeholder in ["{USER_ID}", "{TOKEN}"] {
                    anyhow::ensure!(
                        url.contains(placeholder),
                        "action url of '{}' template should contain {}",
                        kind.label(),
                        placeholder
                    );
                }
                anyhow::ensure!(
                    template.body.contains("{ACTION_URL}"),
                    "body of '{}' template should contain {{ACTION_URL}}",
                    kind.label()
                );
            }
        }
        Ok(())
    }
}
