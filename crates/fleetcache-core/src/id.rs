//! Canonical identifiers for cached data.
//!
//! An [`Identifier`] names one piece of cacheable data by its logical
//! `source` (a table, a service, a domain) and the `key` of the item within
//! it. Its string form is used both as the local cache key and as the entry
//! published on the shared invalidation log, so it must be injective and
//! parse back to an equal value.
//!
//! ## Wire form
//!
//! URL query encoding of three fields, in this order:
//!
//! ```text
//! id=<key>&s=<source>&t=data.ID
//! ```
//!
//! The `t` marker distinguishes identifiers from other strings that may share
//! the log.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Value of the `t` field carried by every encoded identifier.
pub const IDENTIFIER_MARKER: &str = "data.ID";

const KEY_FIELD: &str = "id";
const SOURCE_FIELD: &str = "s";
const MARKER_FIELD: &str = "t";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// The string is not a validly escaped query string.
    #[error("identifier: unable to parse due to malformed escaping")]
    Malformed,

    /// The string parses, but does not carry the identifier marker.
    #[error("identifier: value is not an identifier")]
    NotIdentifier,
}

/// Names a piece of cacheable data.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identifier {
    source: String,
    key: String,
}

impl Identifier {
    /// e.g. `Identifier::new("db.users.userid", "12345")`
    pub fn new(source: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            key: key.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Decode the wire form produced by `to_string()`.
    pub fn parse(s: &str) -> Result<Self, IdentifierError> {
        let mut key = None;
        let mut source = None;
        let mut marker = None;

        for pair in s.split('&') {
            if pair.is_empty() {
                continue;
            }
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            let name = unescape(name)?;
            let value = unescape(value)?;
            // First occurrence of a field wins.
            let slot = match name.as_str() {
                KEY_FIELD => &mut key,
                SOURCE_FIELD => &mut source,
                MARKER_FIELD => &mut marker,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }

        match marker.as_deref() {
            Some(IDENTIFIER_MARKER) => Ok(Self {
                source: source.unwrap_or_default(),
                key: key.unwrap_or_default(),
            }),
            _ => Err(IdentifierError::NotIdentifier),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{KEY_FIELD}={}&{SOURCE_FIELD}={}&{MARKER_FIELD}={}",
            urlencoding::encode(&self.key),
            urlencoding::encode(&self.source),
            urlencoding::encode(IDENTIFIER_MARKER),
        )
    }
}

impl FromStr for Identifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Identifier {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Identifier::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Strict query-component decoding: every `%` must introduce two hex digits,
/// `;` is rejected and the result must be UTF-8.
fn unescape(component: &str) -> Result<String, IdentifierError> {
    let bytes = component.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let valid = bytes
                    .get(i + 1..i + 3)
                    .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
                if !valid {
                    return Err(IdentifierError::Malformed);
                }
                i += 3;
            }
            b';' => return Err(IdentifierError::Malformed),
            _ => i += 1,
        }
    }

    let spaced = component.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| IdentifierError::Malformed)
}

/// Anything that can name its own [`Identifier`], for invalidation purposes.
pub trait Observable {
    fn observable_id(&self) -> Identifier;
}

impl Observable for Identifier {
    fn observable_id(&self) -> Identifier {
        self.clone()
    }
}
