//! Email payload published on the SMTP stream.

use lettre::message::Mailbox;
use messaging::envelope::{self, Envelope};
use messaging::EnvelopeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use validator::Validate;

use crate::error::EmailError;

/// A validated RFC 5322 mailbox address.
///
/// Accepts `user@host` or `Name <user@host>`; only the address part is kept
/// and serialized.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(lettre::Address);

impl Address {
    pub fn as_str(&self) -> &str {
        self.0.as_ref()
    }

    /// Mailbox with an optional display name, for message headers.
    pub fn mailbox(&self, name: Option<String>) -> Mailbox {
        Mailbox::new(name, self.0.clone())
    }
}

impl FromStr for Address {
    type Err = lettre::address::AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mailbox: Mailbox = s.trim().parse()?;
        Ok(Self(mailbox.email))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse()
            .map_err(|e| serde::de::Error::custom(format!("invalid address '{}': {}", raw, e)))
    }
}

/// One recipient of an [`Email`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    #[schema(value_type = String, example = "kristopherab@gmail.com")]
    pub address: Address,

    #[validate(length(min = 1, max = 50, message = "firstName must be between 1 to 50 characters"))]
    #[schema(example = "Kristopher")]
    pub first_name: String,

    /// An empty string on the wire means no last name
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    #[validate(length(
        min = 1,
        max = 50,
        message = "lastName must be between 1 to 50 characters if provided"
    ))]
    pub last_name: Option<String>,
}

impl Recipient {
    pub fn new(address: Address, first_name: impl Into<String>) -> Self {
        Self {
            address,
            first_name: first_name.into(),
            last_name: None,
        }
    }

    pub fn with_last_name(mut self, last_name: impl Into<String>) -> Self {
        self.last_name = Some(last_name.into()).filter(|s: &String| !s.is_empty());
        self
    }

    pub fn display_name(&self) -> String {
        match &self.last_name {
            Some(last) => format!("{} {}", self.first_name, last),
            None => self.first_name.clone(),
        }
    }

    pub fn mailbox(&self) -> Mailbox {
        self.address.mailbox(Some(self.display_name()))
    }
}

fn empty_as_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

/// Email request carried on `*.smtp.subscribe` and `*.smtp.send`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
pub struct Email {
    #[validate(length(min = 1, max = 50, message = "subject must be between 1 to 50 characters"))]
    #[schema(example = "Test")]
    pub subject: String,

    /// HTML body
    #[validate(length(min = 1, max = 255, message = "message must be between 1 to 255 characters"))]
    #[schema(example = "Hello World")]
    pub message: String,

    #[serde(rename = "recipient")]
    #[validate(length(min = 1, message = "at least one recipient is required"), nested)]
    pub recipients: Vec<Recipient>,
}

impl Email {
    pub fn new(
        subject: impl Into<String>,
        message: impl Into<String>,
        recipients: Vec<Recipient>,
    ) -> Self {
        Self {
            subject: subject.into(),
            message: message.into(),
            recipients,
        }
    }

    /// Parse and validate a JSON body.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, EmailError> {
        let email: Email = serde_json::from_slice(bytes)?;
        email.validate()?;
        Ok(email)
    }

    pub fn mailboxes(&self) -> Vec<Mailbox> {
        self.recipients.iter().map(Recipient::mailbox).collect()
    }
}

impl Envelope for Email {
    fn encode(&self) -> Result<Vec<u8>, EnvelopeError> {
        self.validate()
            .map_err(|e| EnvelopeError::Invalid(e.to_string()))?;
        envelope::to_json(self)
    }

    fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        Email::from_slice(bytes).map_err(|e| match e {
            EmailError::Json(e) => EnvelopeError::Json(e),
            EmailError::Invalid(e) => EnvelopeError::Invalid(e.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{"subject":"Test","message":"Hello World","recipient":[{"address":"kristopherab@gmail.com","firstName":"Kristopher"}]}"#;

    fn address(s: &str) -> Address {
        s.parse().unwrap()
    }

    #[test]
    fn test_address_parsing() {
        assert_eq!(
            address("kristopherab@gmail.com").as_str(),
            "kristopherab@gmail.com"
        );
        assert_eq!(
            address("Kristopher <kristopherab@gmail.com>").as_str(),
            "kristopherab@gmail.com"
        );
        assert!("test#gmail.com".parse::<Address>().is_err());
        assert!("".parse::<Address>().is_err());
    }

    #[test]
    fn test_address_json() {
        let addr: Address = serde_json::from_str(r#""kristopherab@gmail.com""#).unwrap();
        assert_eq!(addr.to_string(), "kristopherab@gmail.com");
        assert_eq!(
            serde_json::to_string(&addr).unwrap(),
            r#""kristopherab@gmail.com""#
        );

        let err = serde_json::from_str::<Address>(r#""test#gmail.com""#).unwrap_err();
        assert!(err.to_string().contains("test#gmail.com"));
    }

    #[test]
    fn test_decode_sample() {
        let email = Email::decode(SAMPLE.as_bytes()).unwrap();
        assert_eq!(email.subject, "Test");
        assert_eq!(email.message, "Hello World");
        assert_eq!(email.recipients.len(), 1);
        assert_eq!(email.recipients[0].first_name, "Kristopher");
        assert_eq!(email.recipients[0].last_name, None);
    }

    #[test]
    fn test_round_trip() {
        let email = Email::new(
            "Welcome",
            "<h1>Hi</h1>",
            vec![Recipient::new(address("a@example.com"), "Ada").with_last_name("Lovelace")],
        );
        let bytes = email.encode().unwrap();
        assert_eq!(Email::decode(&bytes).unwrap(), email);
    }

    #[test]
    fn test_empty_last_name_is_absent() {
        let json = r#"{"subject":"s","message":"m","recipient":[{"address":"a@example.com","firstName":"Ada","lastName":""}]}"#;
        let email = Email::decode(json.as_bytes()).unwrap();
        assert_eq!(email.recipients[0].last_name, None);

        let encoded = String::from_utf8(email.encode().unwrap()).unwrap();
        assert!(!encoded.contains("lastName"));
    }

    #[test]
    fn test_malformed_address_is_rejected() {
        let json = r#"{"subject":"s","message":"m","recipient":[{"address":"test#gmail.com","firstName":"Ada"}]}"#;
        let err = Email::from_slice(json.as_bytes()).unwrap_err();
        assert!(matches!(err, EmailError::Json(_)));
        assert!(matches!(
            Email::decode(json.as_bytes()),
            Err(EnvelopeError::Json(_))
        ));
    }

    #[test]
    fn test_length_rules() {
        let recipient = Recipient::new(address("a@example.com"), "Ada");

        let long_subject = Email::new("x".repeat(51), "m", vec![recipient.clone()]);
        assert!(long_subject.validate().is_err());

        let long_message = Email::new("s", "x".repeat(256), vec![recipient.clone()]);
        assert!(long_message.validate().is_err());

        let max = Email::new("x".repeat(50), "x".repeat(255), vec![recipient.clone()]);
        assert!(max.validate().is_ok());

        let empty_first = Email::new(
            "s",
            "m",
            vec![Recipient::new(address("a@example.com"), "")],
        );
        assert!(empty_first.validate().is_err());

        let long_last = Email::new("s", "m", vec![recipient.with_last_name("x".repeat(51))]);
        assert!(long_last.validate().is_err());

        let nobody = Email::new("s", "m", vec![]);
        assert!(matches!(nobody.encode(), Err(EnvelopeError::Invalid(_))));
    }

    #[test]
    fn test_mailbox_uses_full_name() {
        let recipient = Recipient::new(address("a@example.com"), "Ada").with_last_name("Lovelace");
        let mailbox = recipient.mailbox();
        assert_eq!(mailbox.name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(mailbox.email.to_string(), "a@example.com");
    }
}
