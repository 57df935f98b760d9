//! Digest emission: select qualifying jobs, render, audit, send, mark.

pub mod audit;
pub mod digest;
pub mod mailer;
pub mod render;

pub use audit::AuditCsv;
pub use digest::{digest_id, run_digest, DigestOptions, DigestOutcome};
pub use mailer::{Mailer, OutboundDigest, SmtpConfig, SmtpMailer};
pub use render::{format_html_digest, format_markdown_digest, format_plaintext_digest};

/// Display time zone for audit timestamps unless overridden.
pub const DEFAULT_DISPLAY_TZ: chrono_tz::Tz = chrono_tz::America::Denver;
