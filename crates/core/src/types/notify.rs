//! Customer notification targets.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Notify`] target.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// The address is too long.
    #[error("notify address must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// An email address without an @ symbol.
    #[error("email must contain an @ symbol")]
    MissingAtSymbol,
    /// The local part (before @) is empty.
    #[error("email local part cannot be empty")]
    EmptyLocalPart,
    /// The domain part (after @) is empty.
    #[error("email domain cannot be empty")]
    EmptyDomain,
    /// Not a usable ntfy topic.
    #[error("ntfy topic must be 1-64 characters of A-Z, a-z, 0-9, '-' or '_'")]
    InvalidTopic,
    /// Protocol missing and not guessable from the address.
    #[error("unknown notify protocol: {0:?}")]
    UnknownProtocol(String),
}

/// How a customer wants to be told that their payment arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.notify_proto", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum NotifyProto {
    Email,
    Ntfy,
}

impl NotifyProto {
    /// Stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Ntfy => "ntfy",
        }
    }
}

impl fmt::Display for NotifyProto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for NotifyProto {
    type Err = NotifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Self::Email),
            "ntfy" | "ntfysh" => Ok(Self::Ntfy),
            other => Err(NotifyError::UnknownProtocol(other.to_string())),
        }
    }
}

/// A validated notification target.
///
/// The address is personal data; `Debug` output hides it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notify {
    pub proto: NotifyProto,
    pub addr: String,
}

impl fmt::Debug for Notify {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notify")
            .field("proto", &self.proto)
            .field("addr", &"[REDACTED]")
            .finish()
    }
}

impl Notify {
    /// Maximum accepted address length.
    pub const MAX_ADDR_LENGTH: usize = 1024;

    /// Maximum length of an email address (RFC 5321).
    pub const MAX_EMAIL_LENGTH: usize = 254;

    /// Parse customer input.
    ///
    /// An empty address clears the target (`Ok(None)`). Without a protocol,
    /// an address containing `@` is taken as email.
    ///
    /// # Errors
    ///
    /// Returns an error if the protocol is unknown or cannot be guessed, or
    /// if the address is invalid for the protocol.
    pub fn parse(proto: Option<&str>, addr: &str) -> Result<Option<Self>, NotifyError> {
        let addr = addr.trim();
        if addr.is_empty() {
            return Ok(None);
        }
        if addr.len() > Self::MAX_ADDR_LENGTH {
            return Err(NotifyError::TooLong {
                max: Self::MAX_ADDR_LENGTH,
            });
        }

        let proto = match proto.map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) => p.parse()?,
            None if addr.contains('@') => NotifyProto::Email,
            None => return Err(NotifyError::UnknownProtocol(String::new())),
        };

        let addr = match proto {
            NotifyProto::Email => validate_email(addr)?,
            NotifyProto::Ntfy => validate_topic(addr)?,
        };
        Ok(Some(Self { proto, addr }))
    }
}

fn validate_email(s: &str) -> Result<String, NotifyError> {
    if s.len() > Notify::MAX_EMAIL_LENGTH {
        return Err(NotifyError::TooLong {
            max: Notify::MAX_EMAIL_LENGTH,
        });
    }
    let (local, domain) = s.rsplit_once('@').ok_or(NotifyError::MissingAtSymbol)?;
    if local.is_empty() {
        return Err(NotifyError::EmptyLocalPart);
    }
    if domain.is_empty() {
        return Err(NotifyError::EmptyDomain);
    }
    Ok(s.to_owned())
}

fn validate_topic(s: &str) -> Result<String, NotifyError> {
    // accept a pasted subscription URL
    let topic = s
        .strip_prefix("https://ntfy.sh/")
        .unwrap_or(s)
        .trim_end_matches('/');
    let valid = (1..=64).contains(&topic.len())
        && topic
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if valid {
        Ok(topic.to_owned())
    } else {
        Err(NotifyError::InvalidTopic)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_address_clears() {
        assert_eq!(Notify::parse(Some("email"), "   "), Ok(None));
    }

    #[test]
    fn test_email_guessed() {
        let notify = Notify::parse(None, " user@example.com ").unwrap().unwrap();
        assert_eq!(notify.proto, NotifyProto::Email);
        assert_eq!(notify.addr, "user@example.com");
    }

    #[test]
    fn test_invalid_email() {
        assert_eq!(
            Notify::parse(Some("email"), "@example.com"),
            Err(NotifyError::EmptyLocalPart)
        );
        assert_eq!(
            Notify::parse(Some("email"), "user@"),
            Err(NotifyError::EmptyDomain)
        );
        assert_eq!(
            Notify::parse(Some("email"), "nobody"),
            Err(NotifyError::MissingAtSymbol)
        );
    }

    #[test]
    fn test_ntfy_topic() {
        let notify = Notify::parse(Some("ntfy"), "https://ntfy.sh/my_topic-1")
            .unwrap()
            .unwrap();
        assert_eq!(notify.addr, "my_topic-1");
        assert_eq!(
            Notify::parse(Some("ntfy"), "bad topic"),
            Err(NotifyError::InvalidTopic)
        );
    }

    #[test]
    fn test_protocol_required_without_at() {
        assert!(matches!(
            Notify::parse(None, "mytopic"),
            Err(NotifyError::UnknownProtocol(_))
        ));
        assert!(matches!(
            Notify::parse(Some("pigeon"), "mytopic"),
            Err(NotifyError::UnknownProtocol(_))
        ));
    }

    #[test]
    fn test_debug_hides_address() {
        let notify = Notify::parse(None, "user@example.com").unwrap().unwrap();
        assert!(!format!("{notify:?}").contains("example.com"));
    }
}
