//! SMTP subjects and stream definition.

use messaging::{StreamConfig, SubjectKind};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Subjects of the `smtp` domain.
///
/// Rendered as `debug.smtp.<token>` or `internal.smtp.<token>`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, EnumIter,
)]
pub enum SmtpSubject {
    /// Every SMTP subject (filters only)
    #[strum(serialize = ">")]
    All,
    /// Subscription confirmation emails
    #[strum(serialize = "subscribe")]
    Subscribe,
    /// Plain outgoing emails
    #[strum(serialize = "send")]
    Send,
}

impl SubjectKind for SmtpSubject {
    const DOMAIN: &'static str = "smtp";
    const ENVIRONMENT_SCOPED: bool = true;
}

/// Email work-queue stream.
pub struct SmtpStream;

impl StreamConfig for SmtpStream {
    const STREAM_NAME: &'static str = "SMTP";

    /// Worker pool / queue group shared by every email worker
    const CONSUMER_NAME: &'static str = "smtp";

    const DLQ_STREAM: &'static str = "SMTP_DLQ";

    /// Max delivery attempts before the broker gives up
    const MAX_DELIVER: i64 = 5;

    type Subject = SmtpSubject;
}
