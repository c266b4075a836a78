//! Email Service
//!
//! SMTP side channel for lifecycle alert email. The notification records
//! in the dashboard are the source of truth; email mirrors them for
//! recipients who opted in, and delivery is always best-effort.

use anyhow::{Context, Result};
use hl_common::NotificationKind;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::Config;

/// Email service for sending lifecycle alerts via SMTP.
#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: Mailbox,
}

impl EmailService {
    /// Create a new email service from server configuration.
    ///
    /// Requires SMTP to be fully configured (`config.has_smtp()` must be true).
    pub fn new(config: &Config) -> Result<Self> {
        let host = config.smtp_host.as_ref().context("SMTP_HOST is required")?;
        let username = config
            .smtp_username
            .as_ref()
            .context("SMTP_USERNAME is required")?;
        let password = config
            .smtp_password
            .as_ref()
            .context("SMTP_PASSWORD is required")?;
        let from = config.smtp_from.as_ref().context("SMTP_FROM is required")?;

        let from_address: Mailbox = from
            .parse()
            .context("SMTP_FROM is not a valid email address")?;

        let creds = Credentials::new(username.clone(), password.clone());

        let mailer = match config.smtp_tls.as_str() {
            "tls" => AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .context("Failed to create SMTP TLS transport")?
                .port(config.smtp_port)
                .credentials(creds)
                .build(),
            "none" => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                .port(config.smtp_port)
                .credentials(creds)
                .build(),
            // Default: STARTTLS
            _ => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .context("Failed to create SMTP STARTTLS transport")?
                .port(config.smtp_port)
                .credentials(creds)
                .build(),
        };

        Ok(Self {
            mailer,
            from_address,
        })
    }

    /// Test the SMTP connection by sending a NOOP command.
    pub async fn test_connection(&self) -> Result<()> {
        let ok = self
            .mailer
            .test_connection()
            .await
            .context("SMTP connection test failed")?;
        if !ok {
            anyhow::bail!("SMTP server did not respond positively to connection test");
        }
        Ok(())
    }

    /// Send an alert about a page connection's lifecycle state.
    ///
    /// The message names the page and the condition; it never carries
    /// token material.
    pub async fn send_lifecycle_alert(
        &self,
        to_email: &str,
        display_name: &str,
        page_name: &str,
        kind: NotificationKind,
        days_remaining: i64,
    ) -> Result<()> {
        let to_mailbox: Mailbox = to_email
            .parse()
            .context("Invalid recipient email address")?;

        let email = Message::builder()
            .from(self.from_address.clone())
            .to(to_mailbox)
            .subject(subject_for(kind))
            .body(body_for(display_name, page_name, kind, days_remaining))
            .context("Failed to build email message")?;

        self.mailer
            .send(email)
            .await
            .context("Failed to send email via SMTP")?;

        Ok(())
    }
}

fn subject_for(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::ExpiringSoon => "Page connection expiring soon",
        NotificationKind::ExpiringUrgent => "Action needed: page connection about to expire",
        NotificationKind::Expired => "Page connection expired",
        NotificationKind::WebhookFailed => "Page webhook subscription failed",
    }
}

fn body_for(display_name: &str, page_name: &str, kind: NotificationKind, days: i64) -> String {
    let condition = match kind {
        NotificationKind::ExpiringSoon | NotificationKind::ExpiringUrgent => {
            let window = if days == 1 {
                "1 day".to_string()
            } else {
                format!("{days} days")
            };
            format!(
                "The access token for the page \"{page_name}\" expires in {window}.\n\
                 \n\
                 Refresh the connection from the dashboard to keep receiving\n\
                 candidate messages without interruption.\n"
            )
        }
        NotificationKind::Expired => format!(
            "The access token for the page \"{page_name}\" has expired.\n\
             \n\
             Candidate messages from this page are no longer being received.\n\
             Reconnect the page from the dashboard to restore them.\n"
        ),
        NotificationKind::WebhookFailed => format!(
            "The webhook subscription for the page \"{page_name}\" could not\n\
             be established. Message delivery from this page may be\n\
             interrupted.\n\
             \n\
             Retry the subscription from the dashboard.\n"
        ),
    };

    format!(
        "Hello {display_name},\n\
         \n\
         {condition}"
    )
}
