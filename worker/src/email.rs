// ==============================================================================
// email.rs - Upload Failure Notifications
// ==============================================================================
// Description: Mail the requester when a manual upload fails
// Author: Matt Barham
// Created: 2025-11-18
// Modified: 2026-10-19
// Version: 1.1.0
// ==============================================================================

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, Message, SmtpTransport,
    Transport,
};
use std::collections::HashMap;
use std::fs;
use tracing::{error, info};

const FAILURE_TEMPLATE: &str = "\
Hello,

The upload of case {{case_id}} requested by {{requested_by}} failed on {{failed_at}}.

Error: {{error}}

The analysis has been reset and can be uploaded again with restart.

Request: {{request_id}}
";

/// Replace {{variable}} placeholders; unknown placeholders are left as-is
fn render_template(template: &str, variables: &HashMap<&str, String>) -> String {
    let mut result = template.to_string();

    for (key, value) in variables {
        let placeholder = format!("{{{{{}}}}}", key);
        result = result.replace(&placeholder, value);
    }

    result
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%B %d, %Y at %I:%M %p UTC").to_string()
}

/// Details of a failed upload for the notification body
pub struct UploadFailure {
    pub request_id: String,
    pub case_id: String,
    pub requested_by: String,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

impl UploadFailure {
    pub fn subject(&self) -> String {
        format!("Upload of {} failed", self.case_id)
    }

    pub fn body(&self) -> String {
        let mut variables = HashMap::new();
        variables.insert("request_id", self.request_id.clone());
        variables.insert("case_id", self.case_id.clone());
        variables.insert("requested_by", self.requested_by.clone());
        variables.insert("error", self.error.clone());
        variables.insert("failed_at", format_datetime(&self.failed_at));
        render_template(FAILURE_TEMPLATE, &variables)
    }
}

/// SMTP settings from environment variables
pub struct EmailConfig {
    smtp_host: String,
    smtp_port: u16,
    smtp_username: String,
    smtp_password: String,
    smtp_use_tls: bool,
    from_email: String,
    from_name: String,
}

impl EmailConfig {
    /// None when SMTP_HOST is unset: failure mails are then skipped
    pub fn from_env() -> Result<Option<Self>> {
        let Ok(smtp_host) = std::env::var("SMTP_HOST") else {
            return Ok(None);
        };

        Ok(Some(Self {
            smtp_host,
            smtp_port: std::env::var("SMTP_PORT")
                .unwrap_or_else(|_| "25".to_string())
                .parse()
                .context("SMTP_PORT must be a valid port number")?,
            smtp_username: std::env::var("SMTP_USERNAME").context("SMTP_USERNAME not set")?,
            smtp_password: Self::read_smtp_password()?,
            smtp_use_tls: std::env::var("SMTP_USE_TLS")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            from_email: std::env::var("SMTP_FROM_EMAIL").context("SMTP_FROM_EMAIL not set")?,
            from_name: std::env::var("SMTP_FROM_NAME").unwrap_or_else(|_| "Clinical Genomics".to_string()),
        }))
    }

    /// Read SMTP password from secret file
    fn read_smtp_password() -> Result<String> {
        let password_file = std::env::var("SMTP_PASSWORD_FILE").context("SMTP_PASSWORD_FILE not set")?;

        fs::read_to_string(&password_file)
            .with_context(|| format!("Failed to read SMTP password from {}", password_file))
            .map(|s| s.trim().to_string())
    }
}

pub struct EmailSender {
    config: EmailConfig,
}

impl EmailSender {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    pub fn send_upload_failure(&self, to: &str, failure: &UploadFailure) -> Result<()> {
        info!("Sending upload failure notice for {} to {}", failure.case_id, to);

        let from_mailbox = format!("{} <{}>", self.config.from_name, self.config.from_email)
            .parse()
            .context("Failed to parse from address")?;
        let to_mailbox = to.parse().context("Failed to parse recipient address")?;

        let email = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(failure.subject())
            .header(ContentType::TEXT_PLAIN)
            .body(failure.body())
            .context("Failed to build email message")?;

        let credentials = Credentials::new(self.config.smtp_username.clone(), self.config.smtp_password.clone());

        let mailer = if self.config.smtp_use_tls {
            SmtpTransport::relay(&self.config.smtp_host)?
                .credentials(credentials)
                .port(self.config.smtp_port)
                .build()
        } else {
            // Internal relay without TLS
            SmtpTransport::builder_dangerous(&self.config.smtp_host)
                .credentials(credentials)
                .port(self.config.smtp_port)
                .build()
        };

        match mailer.send(&email) {
            Ok(_) => {
                info!("Failure notice sent to {} for {}", to, failure.case_id);
                Ok(())
            }
            Err(e) => {
                error!("Failed to send failure notice to {}: {}", to, e);
                Err(anyhow::anyhow!("SMTP send failed: {}", e))
            }
        }
    }
}
