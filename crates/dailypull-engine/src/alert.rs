use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, Message, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("Invalid email address '{address}': {reason}")]
    Address { address: String, reason: String },
    #[error("Invalid attachment content type: {0}")]
    ContentType(String),
    #[error("Failed to build alert message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("SMTP delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("Failed to access alert settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed alert settings: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Best-effort failure reporting.
#[async_trait]
pub trait AlertNotifier: Send + Sync {
    async fn notify_failure(
        &self,
        context: &str,
        message: &str,
        screenshot: Option<&[u8]>,
    ) -> Result<(), AlertError>;
}

/// Sends an alert and logs, rather than returns, any failure.
pub async fn notify_best_effort(
    notifier: &dyn AlertNotifier,
    context: &str,
    message: &str,
    screenshot: Option<&[u8]>,
) {
    if let Err(e) = notifier.notify_failure(context, message, screenshot).await {
        warn!("Alert for '{}' could not be sent: {}", context, e);
    }
}

/// Used when no SMTP settings are configured.
pub struct LogOnlyNotifier;

#[async_trait]
impl AlertNotifier for LogOnlyNotifier {
    async fn notify_failure(
        &self,
        context: &str,
        message: &str,
        screenshot: Option<&[u8]>,
    ) -> Result<(), AlertError> {
        error!(
            "ALERT [{}] {} (screenshot: {})",
            context,
            message,
            screenshot.map_or("none".to_string(), |s| format!("{} bytes", s.len()))
        );
        Ok(())
    }
}

fn default_smtp_server() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_subject_prefix() -> String {
    "[dailypull]".to_string()
}

/// Persisted by `dailypull save-alert-config`.
#[derive(Clone, Serialize, Deserialize)]
pub struct SmtpSettings {
    #[serde(default = "default_smtp_server")]
    pub smtp_server: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub email_from: String,
    pub email_password: String,
    pub email_to: Vec<String>,
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
}

impl fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("smtp_server", &self.smtp_server)
            .field("smtp_port", &self.smtp_port)
            .field("email_from", &self.email_from)
            .field("email_password", &"<redacted>")
            .field("email_to", &self.email_to)
            .field("subject_prefix", &self.subject_prefix)
            .finish()
    }
}

impl SmtpSettings {
    pub fn new(
        email_from: impl Into<String>,
        email_password: impl Into<String>,
        email_to: Vec<String>,
    ) -> Self {
        Self {
            smtp_server: default_smtp_server(),
            smtp_port: default_smtp_port(),
            email_from: email_from.into(),
            email_password: email_password.into(),
            email_to,
            subject_prefix: default_subject_prefix(),
        }
    }

    /// `Ok(None)` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>, AlertError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        Ok(Some(serde_yaml::from_str(&content)?))
    }

    pub fn save(&self, path: &Path) -> Result<(), AlertError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        crate::credentials::restrict_permissions(path)?;
        info!("Alert settings saved to {}", path.display());
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, AlertError> {
    address.trim().parse().map_err(|e: lettre::address::AddressError| AlertError::Address {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

fn png_content_type() -> Result<ContentType, AlertError> {
    ContentType::parse("image/png").map_err(|e| AlertError::ContentType(e.to_string()))
}

/// Emails the failure with the screenshot attached as PNG, over STARTTLS.
pub struct SmtpAlertNotifier {
    settings: SmtpSettings,
}

impl SmtpAlertNotifier {
    pub fn new(settings: SmtpSettings) -> Self {
        Self { settings }
    }

    pub fn build_message(
        &self,
        context: &str,
        message: &str,
        screenshot: Option<&[u8]>,
    ) -> Result<Message, AlertError> {
        let mut builder = Message::builder()
            .from(parse_mailbox(&self.settings.email_from)?)
            .subject(format!("{} Run failed: {}", self.settings.subject_prefix, context));
        for to in &self.settings.email_to {
            builder = builder.to(parse_mailbox(to)?);
        }

        let body = format!(
            "The daily report run failed during '{context}'.\n\nError:\n{message}\n\nTime: {}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        );

        let email = match screenshot {
            Some(png) => {
                let attachment = Attachment::new("screenshot.png".to_string())
                    .body(png.to_vec(), png_content_type()?);
                builder.multipart(
                    MultiPart::mixed()
                        .singlepart(SinglePart::plain(body))
                        .singlepart(attachment),
                )?
            }
            None => builder.singlepart(SinglePart::plain(body))?,
        };
        Ok(email)
    }
}

#[async_trait]
impl AlertNotifier for SmtpAlertNotifier {
    async fn notify_failure(
        &self,
        context: &str,
        message: &str,
        screenshot: Option<&[u8]>,
    ) -> Result<(), AlertError> {
        let email = self.build_message(context, message, screenshot)?;
        let creds = Credentials::new(
            self.settings.email_from.clone(),
            self.settings.email_password.clone(),
        );
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.settings.smtp_server)?
            .port(self.settings.smtp_port)
            .credentials(creds)
            .build();
        mailer.send(email).await?;
        info!("Alert sent to {}", self.settings.email_to.join(", "));
        Ok(())
    }
}
