//! Subject namespaces and NATS subject matching.
//!
//! A namespace renders a closed enumeration of subject tokens into wire
//! subjects. Environment-scoped domains carry a `debug.` or `internal.`
//! prefix selected once at startup:
//!
//! ```text
//! SmtpSubject::Subscribe  --(Debug)------>  debug.smtp.subscribe
//!                         --(Production)->  internal.smtp.subscribe
//! FormatSubject::Foo      --------------->  format.foo
//! ```

use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;
use std::str::FromStr;
use strum::IntoEnumIterator;
use thiserror::Error;

/// Token matching every subject below a prefix.
pub const FULL_WILDCARD: &str = ">";

/// Token matching exactly one subject level.
pub const SINGLE_WILDCARD: &str = "*";

/// Subject validation error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidSubject {
    /// Token is not part of the namespace's enumeration
    #[error("invalid subject '{token}' (expected one of: {expected})")]
    Unknown { token: String, expected: String },

    /// Rendered subject does not belong to this namespace
    #[error("subject '{subject}' is outside namespace '{namespace}'")]
    Foreign { subject: String, namespace: String },

    /// Wildcards may be used to filter, never to publish
    #[error("cannot publish to wildcard subject '{0}'")]
    Wildcard(String),

    /// Empty tokens, whitespace or misplaced wildcards
    #[error("malformed subject '{0}'")]
    Malformed(String),
}

/// Environment tag applied to scoped subjects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SubjectMode {
    /// `debug.` prefix (tests, local development)
    Debug,
    /// `internal.` prefix
    #[default]
    Production,
}

impl SubjectMode {
    /// Pick the mode from the process-wide debug flag.
    pub fn from_debug(debug: bool) -> Self {
        if debug {
            SubjectMode::Debug
        } else {
            SubjectMode::Production
        }
    }

    /// Durable name for a worker pool in this mode.
    ///
    /// Debug and production workers share one stream, so their durables
    /// must differ: `smtp` in production, `smtp-debug` in debug.
    pub fn durable(&self, base: &str) -> String {
        match self {
            SubjectMode::Debug => format!("{}-debug", base),
            SubjectMode::Production => base.to_string(),
        }
    }

    /// The environment tag rendered in front of scoped subjects.
    pub fn tag(&self) -> &'static str {
        match self {
            SubjectMode::Debug => "debug",
            SubjectMode::Production => "internal",
        }
    }
}

/// A closed enumeration of subject tokens for one routing domain.
///
/// Implemented on strum-derived enums; the `AsRef<str>` value is the wire
/// token and `FromStr` is the membership check.
///
/// ```rust,ignore
/// #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, AsRefStr, EnumIter)]
/// enum SmtpSubject {
///     #[strum(serialize = ">")]
///     All,
///     #[strum(serialize = "subscribe")]
///     Subscribe,
/// }
///
/// impl SubjectKind for SmtpSubject {
///     const DOMAIN: &'static str = "smtp";
///     const ENVIRONMENT_SCOPED: bool = true;
/// }
/// ```
pub trait SubjectKind:
    Copy + Eq + Hash + Debug + FromStr + AsRef<str> + IntoEnumIterator + Send + Sync + 'static
{
    /// Second-level routing domain, e.g. `smtp`.
    const DOMAIN: &'static str;

    /// Whether rendered subjects carry the environment tag.
    const ENVIRONMENT_SCOPED: bool;

    /// Whether this token is the full wildcard.
    fn is_wildcard(&self) -> bool {
        self.as_ref() == FULL_WILDCARD
    }
}

/// Renders and parses subjects of one domain for a fixed [`SubjectMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubjectNamespace<S> {
    mode: SubjectMode,
    _kind: PhantomData<S>,
}

impl<S: SubjectKind> SubjectNamespace<S> {
    pub fn new(mode: SubjectMode) -> Self {
        Self {
            mode,
            _kind: PhantomData,
        }
    }

    pub fn mode(&self) -> SubjectMode {
        self.mode
    }

    /// Rendered prefix shared by every subject of the namespace.
    pub fn prefix(&self) -> String {
        if S::ENVIRONMENT_SCOPED {
            format!("{}.{}", self.mode.tag(), S::DOMAIN)
        } else {
            S::DOMAIN.to_string()
        }
    }

    /// Render a subject to its wire form.
    pub fn render(&self, subject: S) -> String {
        format!("{}.{}", self.prefix(), subject.as_ref())
    }

    /// Check that a token belongs to the enumeration.
    pub fn validate(token: &str) -> Result<S, InvalidSubject> {
        S::from_str(token).map_err(|_| InvalidSubject::Unknown {
            token: token.to_string(),
            expected: S::iter()
                .map(|s| s.as_ref().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    /// Parse a rendered subject back into its token.
    pub fn parse(&self, rendered: &str) -> Result<S, InvalidSubject> {
        let prefix = self.prefix();
        let token = rendered
            .strip_prefix(prefix.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
            .ok_or_else(|| InvalidSubject::Foreign {
                subject: rendered.to_string(),
                namespace: prefix.clone(),
            })?;
        Self::validate(token)
    }

    /// Subject patterns a stream must capture to hold this domain.
    ///
    /// Scoped domains wildcard the environment tag so debug and production
    /// traffic share one stream and are separated by consumer filters.
    pub fn stream_subjects() -> Vec<String> {
        if S::ENVIRONMENT_SCOPED {
            vec![format!("{}.{}.{}", SINGLE_WILDCARD, S::DOMAIN, FULL_WILDCARD)]
        } else {
            vec![format!("{}.{}", S::DOMAIN, FULL_WILDCARD)]
        }
    }
}

/// Validate a subject or subject pattern.
pub fn validate_pattern(subject: &str) -> Result<(), InvalidSubject> {
    let malformed = || InvalidSubject::Malformed(subject.to_string());
    if subject.is_empty() {
        return Err(malformed());
    }
    let tokens: Vec<&str> = subject.split('.').collect();
    for (i, token) in tokens.iter().enumerate() {
        if token.is_empty() || token.chars().any(char::is_whitespace) {
            return Err(malformed());
        }
        if *token == FULL_WILDCARD && i != tokens.len() - 1 {
            return Err(malformed());
        }
        if token.len() > 1 && (token.contains('*') || token.contains('>')) {
            return Err(malformed());
        }
    }
    Ok(())
}

/// Validate a concrete subject suitable for publishing.
pub fn validate_publish(subject: &str) -> Result<(), InvalidSubject> {
    validate_pattern(subject)?;
    if has_wildcard(subject) {
        return Err(InvalidSubject::Wildcard(subject.to_string()));
    }
    Ok(())
}

/// Whether a subject contains wildcard tokens.
pub fn has_wildcard(subject: &str) -> bool {
    subject
        .split('.')
        .any(|t| t == FULL_WILDCARD || t == SINGLE_WILDCARD)
}

/// Whether a concrete `subject` matches `pattern`.
pub fn matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');
    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(FULL_WILDCARD), Some(_)) => return true,
            (Some(SINGLE_WILDCARD), Some(_)) => continue,
            (Some(p), Some(s)) if p == s => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Whether every subject matched by `filter` is also matched by `pattern`.
pub fn covers(pattern: &str, filter: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut filter_tokens = filter.split('.');
    loop {
        match (pattern_tokens.next(), filter_tokens.next()) {
            (Some(FULL_WILDCARD), Some(_)) => return true,
            (Some(SINGLE_WILDCARD), Some(f)) if f != FULL_WILDCARD => continue,
            (Some(p), Some(f)) if p == f => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Whether some concrete subject matches both patterns.
pub fn overlaps(a: &str, b: &str) -> bool {
    let mut a_tokens = a.split('.');
    let mut b_tokens = b.split('.');
    loop {
        match (a_tokens.next(), b_tokens.next()) {
            (Some(FULL_WILDCARD), Some(_)) | (Some(_), Some(FULL_WILDCARD)) => return true,
            (Some(SINGLE_WILDCARD), Some(_)) | (Some(_), Some(SINGLE_WILDCARD)) => continue,
            (Some(x), Some(y)) if x == y => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::{AsRefStr, EnumIter, EnumString};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, AsRefStr, EnumIter)]
    enum MailSubject {
        #[strum(serialize = ">")]
        All,
        #[strum(serialize = "subscribe")]
        Subscribe,
        #[strum(serialize = "send")]
        Send,
    }

    impl SubjectKind for MailSubject {
        const DOMAIN: &'static str = "smtp";
        const ENVIRONMENT_SCOPED: bool = true;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, AsRefStr, EnumIter)]
    enum PlainSubject {
        #[strum(serialize = ">")]
        All,
        #[strum(serialize = "foo")]
        Foo,
    }

    impl SubjectKind for PlainSubject {
        const DOMAIN: &'static str = "format";
        const ENVIRONMENT_SCOPED: bool = false;
    }

    #[test]
    fn test_durable_per_mode() {
        assert_eq!(SubjectMode::Production.durable("smtp"), "smtp");
        assert_eq!(SubjectMode::Debug.durable("smtp"), "smtp-debug");
    }

    #[test]
    fn test_render_scoped() {
        let debug = SubjectNamespace::<MailSubject>::new(SubjectMode::Debug);
        let prod = SubjectNamespace::<MailSubject>::new(SubjectMode::Production);

        assert_eq!(debug.render(MailSubject::Subscribe), "debug.smtp.subscribe");
        assert_eq!(debug.render(MailSubject::Send), "debug.smtp.send");
        assert_eq!(prod.render(MailSubject::Subscribe), "internal.smtp.subscribe");
        assert_eq!(prod.render(MailSubject::All), "internal.smtp.>");
    }

    #[test]
    fn test_render_unscoped_ignores_mode() {
        let debug = SubjectNamespace::<PlainSubject>::new(SubjectMode::Debug);
        let prod = SubjectNamespace::<PlainSubject>::new(SubjectMode::Production);

        assert_eq!(debug.render(PlainSubject::Foo), "format.foo");
        assert_eq!(prod.render(PlainSubject::Foo), "format.foo");
        assert_eq!(prod.render(PlainSubject::All), "format.>");
    }

    #[test]
    fn test_parse_round_trip_all_modes() {
        for mode in [SubjectMode::Debug, SubjectMode::Production] {
            let ns = SubjectNamespace::<MailSubject>::new(mode);
            for subject in MailSubject::iter() {
                let rendered = ns.render(subject);
                let parsed = ns.parse(&rendered).unwrap();
                assert_eq!(ns.render(parsed), rendered);
            }
        }
    }

    #[test]
    fn test_parse_rejects_other_mode() {
        let prod = SubjectNamespace::<MailSubject>::new(SubjectMode::Production);
        let err = prod.parse("debug.smtp.subscribe").unwrap_err();
        assert!(matches!(err, InvalidSubject::Foreign { .. }));
    }

    #[test]
    fn test_validate_membership() {
        assert_eq!(
            SubjectNamespace::<MailSubject>::validate("subscribe").unwrap(),
            MailSubject::Subscribe
        );

        let err = SubjectNamespace::<MailSubject>::validate("unsubscribe").unwrap_err();
        assert!(err.to_string().contains("unsubscribe"));
        assert!(err.to_string().contains("subscribe, send"));
    }

    #[test]
    fn test_stream_subjects() {
        assert_eq!(
            SubjectNamespace::<MailSubject>::stream_subjects(),
            vec!["*.smtp.>".to_string()]
        );
        assert_eq!(
            SubjectNamespace::<PlainSubject>::stream_subjects(),
            vec!["format.>".to_string()]
        );
    }

    #[test]
    fn test_matches() {
        assert!(matches("*.smtp.>", "debug.smtp.subscribe"));
        assert!(matches("*.smtp.>", "internal.smtp.send"));
        assert!(!matches("*.smtp.>", "debug.smtp"));
        assert!(matches("format.foo", "format.foo"));
        assert!(!matches("format.foo", "format.bar"));
        assert!(matches("format.*", "format.bar"));
        assert!(!matches("format.*", "format.bar.baz"));
        assert!(matches(">", "anything.at.all"));
    }

    #[test]
    fn test_covers() {
        assert!(covers("*.smtp.>", "debug.smtp.subscribe"));
        assert!(covers("*.smtp.>", "debug.smtp.>"));
        assert!(covers("format.>", "format.>"));
        assert!(!covers("format.foo", "format.>"));
        assert!(!covers("format.*", "format.>"));
        assert!(!covers("*.smtp.>", "debug.format.foo"));
    }

    #[test]
    fn test_overlaps() {
        assert!(overlaps("format.>", "format.foo"));
        assert!(overlaps("format.*", "format.foo"));
        assert!(!overlaps("format.foo", "format.bar"));
        assert!(overlaps("debug.smtp.subscribe", "*.smtp.subscribe"));
        assert!(!overlaps("debug.smtp.subscribe", "internal.smtp.subscribe"));
    }

    #[test]
    fn test_validate_pattern() {
        assert!(validate_pattern("debug.smtp.>").is_ok());
        assert!(validate_pattern("*.smtp.subscribe").is_ok());
        assert!(validate_pattern("").is_err());
        assert!(validate_pattern("smtp..send").is_err());
        assert!(validate_pattern("smtp.>.send").is_err());
        assert!(validate_pattern("smtp.se nd").is_err());
        assert!(validate_pattern("smtp.a*").is_err());

        assert!(validate_publish("debug.smtp.send").is_ok());
        assert_eq!(
            validate_publish("debug.smtp.>"),
            Err(InvalidSubject::Wildcard("debug.smtp.>".to_string()))
        );
    }
}
