//! Subject-validated producer.

use tracing::{debug, instrument};

use crate::broker::{Broker, PublishReceipt, StreamHandle};
use crate::config::{PublishMode, StreamSpec};
use crate::envelope::Envelope;
use crate::error::QueueError;
use crate::subject::{InvalidSubject, SubjectKind, SubjectNamespace};

/// Publishes envelopes to the subjects of one namespace.
///
/// Cheap to clone; share one per process across request handlers.
#[derive(Clone)]
pub struct Producer<B, S> {
    broker: B,
    namespace: SubjectNamespace<S>,
    stream: StreamHandle,
    mode: PublishMode,
}

impl<B: Broker, S: SubjectKind> Producer<B, S> {
    /// Provision the stream (idempotent) and build a producer for it.
    pub async fn new(
        broker: B,
        namespace: SubjectNamespace<S>,
        stream: &StreamSpec,
    ) -> Result<Self, QueueError> {
        let handle = broker.ensure_stream(stream).await?;
        Ok(Self {
            broker,
            namespace,
            stream: handle,
            mode: PublishMode::default(),
        })
    }

    pub fn with_mode(mut self, mode: PublishMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn namespace(&self) -> &SubjectNamespace<S> {
        &self.namespace
    }

    pub fn stream(&self) -> &StreamHandle {
        &self.stream
    }

    /// Encode and publish a payload to a concrete subject.
    #[instrument(skip(self, payload), fields(stream = %self.stream.name))]
    pub async fn publish<E: Envelope>(
        &self,
        subject: S,
        payload: &E,
    ) -> Result<PublishReceipt, QueueError> {
        let rendered = self.namespace.render(subject);
        if subject.is_wildcard() {
            return Err(InvalidSubject::Wildcard(rendered).into());
        }

        let bytes = payload.encode().map_err(QueueError::Encode)?;
        let size = bytes.len();
        let receipt = self.broker.publish(&rendered, bytes, self.mode).await?;

        debug!(
            subject = %rendered,
            bytes = size,
            sequence = ?receipt.sequence,
            "Published message"
        );
        Ok(receipt)
    }

    /// Publish to a subject given by its token, e.g. from configuration.
    pub async fn publish_token<E: Envelope>(
        &self,
        token: &str,
        payload: &E,
    ) -> Result<PublishReceipt, QueueError> {
        let subject = SubjectNamespace::<S>::validate(token)?;
        self.publish(subject, payload).await
    }
}
