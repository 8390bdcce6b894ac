use anyhow::{Context, Result};
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use crate::config::AppConfig;

/// SMTP notifier for expiring documents. Optional: when the SMTP settings
/// are absent the application runs without outbound mail.
pub struct Mailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl Mailer {
    pub fn from_config(config: &AppConfig) -> Result<Option<Self>> {
        let (host, from) = match (&config.smtp_host, &config.smtp_from) {
            (Some(host), Some(from)) => (host, from),
            _ => return Ok(None),
        };

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .context("invalid SMTP relay host")?;
        if let (Some(username), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let from = from.parse().context("SMTP_FROM must be a valid mailbox")?;
        Ok(Some(Self {
            transport: builder.build(),
            from,
        }))
    }

    /// Sends a plain-text summary of documents in warning or expired state
    /// after a sync pass.
    pub async fn send_alert_summary(
        &self,
        to: &str,
        client_name: &str,
        expired: &[String],
        warning: &[String],
    ) -> Result<()> {
        let mut body = format!("Document alert summary for {client_name}\n\n");
        if !expired.is_empty() {
            body.push_str("Expired:\n");
            for line in expired {
                body.push_str("  - ");
                body.push_str(line);
                body.push('\n');
            }
            body.push('\n');
        }
        if !warning.is_empty() {
            body.push_str("Expiring soon:\n");
            for line in warning {
                body.push_str("  - ");
                body.push_str(line);
                body.push('\n');
            }
        }

        let message = Message::builder()
            .from(self.from.clone())
            .to(to.parse().context("invalid recipient address")?)
            .subject(format!("[isovault] document alerts for {client_name}"))
            .body(body)
            .context("failed to build alert mail")?;

        self.transport
            .send(message)
            .await
            .context("failed to send alert mail")?;
        info!(recipient = %to, "alert summary mail sent");
        Ok(())
    }
}
