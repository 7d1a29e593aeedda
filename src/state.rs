use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::notifications::{
    EmailGateway, EmailTemplates, LogGateway, NotificationDispatcher, SmtpGateway,
};
use crate::users::{PgUserDirectory, UserDirectory};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserDirectory>,
    pub notifier: NotificationDispatcher,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        if let Err(e) = sqlx::migrate!("./migrations").run(&db).await {
            warn!(error = %e, "migration failed; continuing");
        }

        let gateway: Arc<dyn EmailGateway> = match &config.email.smtp {
            Some(smtp) => Arc::new(SmtpGateway::new(smtp)?),
            None => {
                warn!("SMTP_HOST not set; outgoing emails will only be logged");
                Arc::new(LogGateway)
            }
        };
        let templates = Arc::new(
            EmailTemplates::load(config.email.templates_dir.as_deref())
                .context("load email templates")?,
        );

        let users: Arc<dyn UserDirectory> = Arc::new(PgUserDirectory::new(db));
        let count = users.count().await?;
        info!(users = count, "user directory ready");

        Ok(Self::from_parts(config, users, gateway, templates))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserDirectory>,
        gateway: Arc<dyn EmailGateway>,
        templates: Arc<EmailTemplates>,
    ) -> Self {
        let notifier = NotificationDispatcher::new(gateway, templates, &config.email);
        Self {
            config,
            users,
            notifier,
        }
    }
}
