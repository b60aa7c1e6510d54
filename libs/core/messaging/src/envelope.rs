//! Payload codecs.
//!
//! A worker is parameterized by one [`Envelope`] type: `Raw` hands the
//! processor the original bytes, `Json<T>` deserializes into `T`. Domain
//! types with validation rules implement the trait directly.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::EnvelopeError;

/// Encode/decode contract between producers and workers.
pub trait Envelope: Sized + Send + Sync + 'static {
    fn encode(&self) -> Result<Vec<u8>, EnvelopeError>;

    fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError>;
}

/// Opaque payload delivered as-is.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Raw(pub Vec<u8>);

impl Raw {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lossy UTF-8 view for logging.
    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

impl From<Vec<u8>> for Raw {
    fn from(bytes: Vec<u8>) -> Self {
        Raw(bytes)
    }
}

impl From<&str> for Raw {
    fn from(text: &str) -> Self {
        Raw(text.as_bytes().to_vec())
    }
}

impl From<String> for Raw {
    fn from(text: String) -> Self {
        Raw(text.into_bytes())
    }
}

impl Envelope for Raw {
    fn encode(&self) -> Result<Vec<u8>, EnvelopeError> {
        Ok(self.0.clone())
    }

    fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        Ok(Raw(bytes.to_vec()))
    }
}

/// JSON payload of any serde type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Envelope for Json<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn encode(&self) -> Result<Vec<u8>, EnvelopeError> {
        to_json(&self.0)
    }

    fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        from_json(bytes).map(Json)
    }
}

/// Serialize helper for hand-written `Envelope` impls.
pub fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>, EnvelopeError> {
    Ok(serde_json::to_vec(value)?)
}

/// Deserialize helper for hand-written `Envelope` impls.
pub fn from_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, EnvelopeError> {
    Ok(serde_json::from_slice(bytes)?)
}
