//! Classification of async-nats errors.
//!
//! "Not found" and "already exists" are decided from JetStream API error
//! codes only. Anything else (timeouts, permission errors, ...) is surfaced
//! to the caller and never treated as absence.

use async_nats::jetstream::stream::{ConsumerError, ConsumerErrorKind};
use async_nats::jetstream::context::{
    CreateStreamError, CreateStreamErrorKind, GetStreamError, GetStreamErrorKind,
};
use async_nats::jetstream::ErrorCode;

pub(crate) fn is_stream_not_found(err: &GetStreamError) -> bool {
    matches!(
        err.kind(),
        GetStreamErrorKind::JetStream(e) if e.error_code() == ErrorCode::STREAM_NOT_FOUND
    )
}

pub(crate) fn is_stream_exists(err: &CreateStreamError) -> bool {
    matches!(
        err.kind(),
        CreateStreamErrorKind::JetStream(e) if e.error_code() == ErrorCode::STREAM_NAME_EXIST
    )
}

/// Lost a concurrent create race for a durable.
pub(crate) fn is_consumer_exists(err: &ConsumerError) -> bool {
    matches!(
        err.kind(),
        ConsumerErrorKind::JetStream(e)
            if e.error_code() == ErrorCode::CONSUMER_ALREADY_EXISTS
                || e.error_code() == ErrorCode::CONSUMER_NAME_EXIST
    )
}

