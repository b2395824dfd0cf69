//! Out-of-band delivery of reset links.
//!
//! The manager hands every freshly issued token to a [`Notifier`] and bounds the
//! call with a timeout. Delivery failures are logged by the caller and never undo
//! the token. `LogNotifier` is the development default; `SmtpNotifier` sends real
//! mail through an authenticated STARTTLS relay.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::info;

/// What the user needs to finish a reset.
#[derive(Clone)]
pub struct ResetNotice {
    pub to_email: String,
    pub reset_url: SecretString,
    pub expires_at: DateTime<Utc>,
    pub ttl_minutes: i64,
}

impl std::fmt::Debug for ResetNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResetNotice")
            .field("to_email", &self.to_email)
            .field("reset_url", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("ttl_minutes", &self.ttl_minutes)
            .finish()
    }
}

impl ResetNotice {
    #[must_use]
    pub fn subject(&self) -> &'static str {
        "Password Reset Link"
    }

    /// HTML body for the reset email.
    #[must_use]
    pub fn html_body(&self) -> String {
        let url = self.reset_url.expose_secret();
        format!(
            "<h3>Password Reset Request</h3>\n\
             <p>Click the link below to reset your password:</p>\n\
             <a href=\"{url}\">Reset Password</a>\n\
             <p>This link will expire in {} minutes.</p>\n\
             <p>If you did not request a password reset, you can ignore this email.</p>\n",
            self.ttl_minutes
        )
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver the notice or return an error describing why it failed.
    async fn send(&self, notice: &ResetNotice) -> Result<()>;
}

/// Local dev notifier that logs the reset link instead of sending email.
#[derive(Clone, Debug)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notice: &ResetNotice) -> Result<()> {
        info!(
            to_email = %notice.to_email,
            reset_url = %notice.reset_url.expose_secret(),
            expires_at = %notice.expires_at,
            "password reset notifier stub"
        );
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub from: String,
    pub timeout: Duration,
}

pub struct SmtpNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    /// Build a STARTTLS transport for the configured relay.
    ///
    /// # Errors
    /// Returns an error if the sender address is invalid or the relay cannot be configured.
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .with_context(|| format!("Invalid sender address: {}", config.from))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .with_context(|| format!("Failed to create SMTP transport for {}", config.host))?
            .port(config.port)
            .timeout(Some(config.timeout));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(
                username.clone(),
                password.expose_secret().to_string(),
            ));
        }

        Ok(Self {
            mailer: builder.build(),
            from,
        })
    }

    fn message(&self, notice: &ResetNotice) -> Result<Message> {
        let to: Mailbox = notice
            .to_email
            .parse()
            .with_context(|| format!("Invalid recipient address: {}", notice.to_email))?;
        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(notice.subject())
            .user_agent(crate::APP_USER_AGENT.to_string())
            .header(ContentType::TEXT_HTML)
            .body(notice.html_body())
            .context("Failed to build reset email")
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, notice: &ResetNotice) -> Result<()> {
        let message = self.message(notice)?;
        self.mailer
            .send(message)
            .await
            .context("Failed to send reset email")?;
        info!(to_email = %notice.to_email, "password reset email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notice() -> ResetNotice {
        ResetNotice {
            to_email: "alice@example.com".to_string(),
            reset_url: SecretString::from(
                "https://reset.dev/reset-password?token=abc&email=alice%40example.com",
            ),
            expires_at: Utc::now(),
            ttl_minutes: 15,
        }
    }

    fn smtp_config() -> SmtpConfig {
        SmtpConfig {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: Some("mailer".to_string()),
            password: Some(SecretString::from("app-password")),
            from: "Password Reset <no-reply@example.com>".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn html_body_contains_link_and_ttl() {
        let body = notice().html_body();
        assert!(body.contains("href=\"https://reset.dev/reset-password?token=abc"));
        assert!(body.contains("expire in 15 minutes"));
    }

    #[test]
    fn notice_debug_redacts_link() {
        let debug = format!("{:?}", notice());
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("token=abc"));
    }

    #[tokio::test]
    async fn log_notifier_always_succeeds() {
        assert!(LogNotifier.send(&notice()).await.is_ok());
    }

    #[tokio::test]
    async fn smtp_notifier_builds_message() -> Result<()> {
        let notifier = SmtpNotifier::new(&smtp_config())?;
        let message = notifier.message(&notice())?;
        let raw = String::from_utf8(message.formatted())?;
        assert!(raw.contains("Subject: Password Reset Link"));
        assert!(raw.contains("To: alice@example.com"));
        assert!(raw.contains(crate::APP_USER_AGENT));
        Ok(())
    }

    #[tokio::test]
    async fn smtp_notifier_rejects_bad_sender() {
        let mut config = smtp_config();
        config.from = "not an address".to_string();
        assert!(SmtpNotifier::new(&config).is_err());
    }

    #[tokio::test]
    async fn smtp_notifier_rejects_bad_recipient() -> Result<()> {
        let notifier = SmtpNotifier::new(&smtp_config())?;
        let mut bad = notice();
        bad.to_email = "nobody".to_string();
        assert!(notifier.message(&bad).is_err());
        Ok(())
    }
}
