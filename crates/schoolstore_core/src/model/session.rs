//! Academic session identity and explicit session context.
//!
//! # Invariants
//! - A `SessionId` is non-empty, at most 32 chars, and only contains ASCII
//!   alphanumerics, `-` and `_`.
//! - Directory lookups never read an ambient global session; the caller
//!   passes a `SessionContext` obtained once per request.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

const MAX_SESSION_CHARS: usize = 32;

/// Validated academic-year identifier, e.g. `2024-25`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Parses and validates a session identifier.
    pub fn parse(value: &str) -> Result<Self, SessionIdError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(SessionIdError::Empty);
        }
        if trimmed.chars().count() > MAX_SESSION_CHARS {
            return Err(SessionIdError::TooLong(trimmed.to_string()));
        }
        if let Some(invalid) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(SessionIdError::InvalidCharacter {
                value: trimmed.to_string(),
                character: invalid,
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SessionId {
    type Error = SessionIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionId> for String {
    fn from(value: SessionId) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionIdError {
    Empty,
    TooLong(String),
    InvalidCharacter { value: String, character: char },
}

impl Display for SessionIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "session id must not be empty"),
            Self::TooLong(value) => {
                write!(f, "session id exceeds {MAX_SESSION_CHARS} chars: {value}")
            }
            Self::InvalidCharacter { value, character } => {
                write!(f, "session id `{value}` contains invalid character `{character}`")
            }
        }
    }
}

impl Error for SessionIdError {}

/// Request-bound session selection passed into every directory call.
///
/// Holding a context pins the session: switching the persisted active
/// session later does not retarget lookups made through this value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionContext {
    session: SessionId,
}

impl SessionContext {
    /// Pins an explicit session, e.g. to read an older academic year.
    pub fn pinned(session: SessionId) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }
}
