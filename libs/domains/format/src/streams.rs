//! Format subjects and stream definition.

use messaging::{Producer, StreamConfig, SubjectKind};
use strum::{AsRefStr, Display, EnumIter, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, EnumIter,
)]
pub enum FormatSubject {
    #[strum(serialize = ">")]
    All,
    #[strum(serialize = "foo")]
    Foo,
    #[strum(serialize = "bar")]
    Bar,
}

impl SubjectKind for FormatSubject {
    const DOMAIN: &'static str = "format";
    const ENVIRONMENT_SCOPED: bool = false;
}

pub struct FormatStream;

impl StreamConfig for FormatStream {
    const STREAM_NAME: &'static str = "FORMAT";
    const CONSUMER_NAME: &'static str = "worker";
    const DLQ_STREAM: &'static str = "FORMAT_DLQ";
    type Subject = FormatSubject;
}

/// Raw producer for the format subjects.
pub type FormatProducer<B> = Producer<B, FormatSubject>;
