pub mod dispatcher;
pub mod gateway;
pub mod templates;

pub use dispatcher::NotificationDispatcher;
#[cfg(test)]
pub use gateway::RecordingGateway;
pub use gateway::{EmailGateway, LogGateway, SmtpGateway};
pub use templates::{EmailTemplates, NotificationKind};
