//! SMTP delivery.
//!
//! The transport sits behind a small trait so the digest flow can be
//! exercised without a mail server. The real implementation sends over
//! SMTPS (implicit TLS) with plaintext + HTML alternatives and the audit
//! CSV attached.

use anyhow::{Context, Result};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

/// A rendered digest ready for delivery.
#[derive(Debug, Clone)]
pub struct OutboundDigest {
    pub subject: String,
    pub body_text: String,
    pub body_html: String,
    /// `(filename, bytes)` of the audit CSV, when present.
    pub attachment: Option<(String, Vec<u8>)>,
}

// Digest runs await the transport inline; no Send bound is needed on the
// returned future.
#[allow(async_fn_in_trait)]
pub trait Mailer {
    async fn send(&self, digest: OutboundDigest) -> Result<()>;
}

/// SMTP settings, sourced from the environment.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    pub from: String,
    pub to: String,
}

impl SmtpConfig {
    /// Read settings from `SMTP_HOST`, `SMTP_PORT`, `SMTP_USER`,
    /// `SMTP_PASS`, `EMAIL_FROM` and `EMAIL_TO`. Any missing value is a
    /// startup error naming every absent variable.
    pub fn from_env() -> Result<Self> {
        let get = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());

        let host = get("SMTP_HOST");
        let user = get("SMTP_USER");
        let pass = get("SMTP_PASS");
        let from = get("EMAIL_FROM");
        let to = get("EMAIL_TO");

        let missing: Vec<&str> = [
            ("SMTP_HOST", &host),
            ("SMTP_USER", &user),
            ("SMTP_PASS", &pass),
            ("EMAIL_FROM", &from),
            ("EMAIL_TO", &to),
        ]
        .iter()
        .filter(|(_, v)| v.is_none())
        .map(|(k, _)| *k)
        .collect();
        if !missing.is_empty() {
            anyhow::bail!("Missing env vars: {}", missing.join(", "));
        }

        let port = match std::env::var("SMTP_PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("invalid SMTP_PORT: {raw}"))?,
            Err(_) => 465,
        };

        Ok(Self {
            host: host.unwrap_or_default(),
            port,
            user: user.unwrap_or_default(),
            pass: pass.unwrap_or_default(),
            from: from.unwrap_or_default(),
            to: to.unwrap_or_default(),
        })
    }
}

/// Production transport: SMTPS with credentials.
pub struct SmtpMailer {
    config: SmtpConfig,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }
}

impl Mailer for SmtpMailer {
    async fn send(&self, digest: OutboundDigest) -> Result<()> {
        let OutboundDigest {
            subject,
            body_text,
            body_html,
            attachment,
        } = digest;

        let builder = Message::builder()
            .from(self.config.from.parse().context("invalid EMAIL_FROM")?)
            .to(self.config.to.parse().context("invalid EMAIL_TO")?)
            .subject(subject);

        let alternatives = MultiPart::alternative_plain_html(body_text, body_html);

        let message = match attachment {
            Some((filename, bytes)) => {
                let content_type = ContentType::parse("text/csv").context("csv content type")?;
                builder.multipart(
                    MultiPart::mixed()
                        .multipart(alternatives)
                        .singlepart(Attachment::new(filename).body(bytes, content_type)),
                )?
            }
            None => builder.multipart(alternatives)?,
        };

        let transport: AsyncSmtpTransport<Tokio1Executor> =
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.host)
                .context("smtp relay setup")?
                .port(self.config.port)
                .credentials(Credentials::new(
                    self.config.user.clone(),
                    self.config.pass.clone(),
                ))
                .build();

        transport.send(message).await.context("smtp send")?;
        info!(host = %self.config.host, "digest email sent");
        Ok(())
    }
}
