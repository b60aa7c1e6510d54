//! Stream, consumer and worker settings.

use std::time::Duration;
use strum::{Display, EnumString};

use crate::error::QueueError;
use crate::subject::{self, SubjectKind, SubjectNamespace};

/// Stream configuration trait (type-safe constants).
///
/// ```rust,ignore
/// struct SmtpStream;
///
/// impl StreamConfig for SmtpStream {
///     const STREAM_NAME: &'static str = "SMTP";
///     const CONSUMER_NAME: &'static str = "smtp";
///     const DLQ_STREAM: &'static str = "SMTP_DLQ";
///     type Subject = SmtpSubject;
/// }
/// ```
pub trait StreamConfig {
    /// JetStream stream name (e.g., "SMTP")
    const STREAM_NAME: &'static str;

    /// Durable consumer / queue group name (e.g., "smtp")
    const CONSUMER_NAME: &'static str;

    /// Dead letter stream name (e.g., "SMTP_DLQ")
    const DLQ_STREAM: &'static str;

    const RETENTION: Retention = Retention::WorkQueue;

    /// Stream size bound in bytes (default: 1 MiB)
    const MAX_BYTES: i64 = 1024 * 1024;

    /// Maximum deliveries per message (default: 10)
    const MAX_DELIVER: i64 = 10;

    /// Ack wait timeout in seconds (default: 30)
    const ACK_WAIT_SECS: u64 = 30;

    /// Maximum unacknowledged messages per consumer (default: 1)
    const MAX_PENDING: i64 = 1;

    /// Subject enumeration routed through this stream.
    type Subject: SubjectKind;
}

/// Stream retention policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum Retention {
    /// Each message is removed once acknowledged by a consumer
    #[default]
    WorkQueue,
    /// Messages kept until stream limits are reached
    Limits,
    /// Messages kept while consumers are interested
    Interest,
}

/// What to do when an existing stream's subjects differ from the requested set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum SubjectDrift {
    /// Log and keep the existing subjects
    #[default]
    Warn,
    /// Update the stream to the union of both sets
    Reconcile,
    /// Refuse to start
    Fail,
}

/// Consumer acknowledgment policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum AckPolicy {
    #[default]
    Explicit,
    All,
    None,
}

/// How a worker reacts to a message it cannot handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum FailurePolicy {
    /// Retry or dead-letter the message and keep listening
    #[default]
    Isolate,
    /// Stop listening and return the error; the message stays unacked
    FailFast,
}

/// Whether a publish waits for the stream's acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum PublishMode {
    /// Hand the message to the connection and return
    #[default]
    Buffered,
    /// Wait for the stream to persist the message
    Acknowledged,
}

/// Requested shape of a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSpec {
    pub name: String,
    pub subjects: Vec<String>,
    pub retention: Retention,
    /// `-1` for unlimited
    pub max_bytes: i64,
    pub drift: SubjectDrift,
}

impl StreamSpec {
    pub fn new(name: impl Into<String>, subjects: Vec<String>) -> Self {
        Self {
            name: name.into(),
            subjects,
            retention: Retention::default(),
            max_bytes: -1,
            drift: SubjectDrift::default(),
        }
    }

    pub fn from_stream<C: StreamConfig>() -> Self {
        Self {
            name: C::STREAM_NAME.to_string(),
            subjects: SubjectNamespace::<C::Subject>::stream_subjects(),
            retention: C::RETENTION,
            max_bytes: C::MAX_BYTES,
            drift: SubjectDrift::default(),
        }
    }

    pub fn with_retention(mut self, retention: Retention) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: i64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_drift(mut self, drift: SubjectDrift) -> Self {
        self.drift = drift;
        self
    }

    pub fn validate(&self) -> Result<(), QueueError> {
        validate_name(&self.name).map_err(|e| QueueError::stream(&self.name, e))?;
        if self.subjects.is_empty() {
            return Err(QueueError::stream(&self.name, "no subjects"));
        }
        for pattern in &self.subjects {
            subject::validate_pattern(pattern).map_err(|e| QueueError::stream(&self.name, e))?;
        }
        if self.max_bytes == 0 || self.max_bytes < -1 {
            return Err(QueueError::stream(
                &self.name,
                format!("invalid max bytes {}", self.max_bytes),
            ));
        }
        Ok(())
    }

    /// Whether a concrete subject lands in this stream.
    pub fn captures(&self, subject: &str) -> bool {
        self.subjects.iter().any(|p| subject::matches(p, subject))
    }
}

/// Requested shape of a durable consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerSpec {
    /// Durable name, also used as the queue group
    pub durable: String,
    pub filter_subject: String,
    pub ack_policy: AckPolicy,
    pub max_ack_pending: i64,
    pub ack_wait: Duration,
    /// `-1` for unlimited
    pub max_deliver: i64,
}

impl ConsumerSpec {
    pub fn new(durable: impl Into<String>, filter_subject: impl Into<String>) -> Self {
        Self {
            durable: durable.into(),
            filter_subject: filter_subject.into(),
            ack_policy: AckPolicy::default(),
            max_ack_pending: 1,
            ack_wait: Duration::from_secs(30),
            max_deliver: -1,
        }
    }

    pub fn from_stream<C: StreamConfig>(filter_subject: impl Into<String>) -> Self {
        Self {
            durable: C::CONSUMER_NAME.to_string(),
            filter_subject: filter_subject.into(),
            ack_policy: AckPolicy::Explicit,
            max_ack_pending: C::MAX_PENDING,
            ack_wait: Duration::from_secs(C::ACK_WAIT_SECS),
            max_deliver: C::MAX_DELIVER,
        }
    }

    pub fn deliver_group(&self) -> &str {
        &self.durable
    }

    pub fn with_durable(mut self, durable: impl Into<String>) -> Self {
        self.durable = durable.into();
        self
    }

    pub fn with_ack_policy(mut self, policy: AckPolicy) -> Self {
        self.ack_policy = policy;
        self
    }

    pub fn with_max_ack_pending(mut self, max: i64) -> Self {
        self.max_ack_pending = max;
        self
    }

    pub fn with_ack_wait(mut self, ack_wait: Duration) -> Self {
        self.ack_wait = ack_wait;
        self
    }

    pub fn with_max_deliver(mut self, max: i64) -> Self {
        self.max_deliver = max;
        self
    }

    /// Validate against the stream the consumer will be attached to.
    pub fn validate(&self, stream_subjects: &[String]) -> Result<(), QueueError> {
        validate_name(&self.durable).map_err(|e| QueueError::consumer(&self.durable, e))?;
        subject::validate_pattern(&self.filter_subject)
            .map_err(|e| QueueError::consumer(&self.durable, e))?;
        if !stream_subjects
            .iter()
            .any(|p| subject::covers(p, &self.filter_subject))
        {
            return Err(QueueError::consumer(
                &self.durable,
                format!(
                    "filter subject '{}' is not covered by stream subjects [{}]",
                    self.filter_subject,
                    stream_subjects.join(", ")
                ),
            ));
        }
        if self.ack_wait.is_zero() {
            return Err(QueueError::consumer(&self.durable, "ack wait must be positive"));
        }
        Ok(())
    }
}

/// Worker behavior independent of the broker-side consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub failure_policy: FailurePolicy,
    /// Dead letter stream; `None` terminates failed messages after logging
    pub dlq_stream: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::Isolate,
            dlq_stream: None,
        }
    }
}

impl WorkerConfig {
    pub fn from_stream<C: StreamConfig>() -> Self {
        Self {
            dlq_stream: Some(C::DLQ_STREAM.to_string()),
            ..Default::default()
        }
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_dlq_stream(mut self, stream: Option<String>) -> Self {
        self.dlq_stream = stream;
        self
    }
}

/// Stream and durable names share the broker's naming rules.
fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name must not be empty".to_string());
    }
    if let Some(c) = name
        .chars()
        .find(|c| c.is_whitespace() || matches!(c, '.' | '*' | '>' | '/' | '\\'))
    {
        return Err(format!("name '{}' contains invalid character '{}'", name, c));
    }
    Ok(())
}
