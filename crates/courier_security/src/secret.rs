//! Opaque credential storage.

use serde::{Deserialize, Deserializer};
use std::fmt;
use zeroize::Zeroizing;

/// A credential value (bot token, API key).
///
/// The value is wiped from memory on drop, never printed by `Debug`, and cannot be
/// serialized. Read it with [`SecretToken::expose`] only where the cleartext is
/// genuinely needed, such as building the request URL.
///
/// # Examples
///
/// ```
/// use courier_security::SecretToken;
///
/// let token = SecretToken::new("123:ABC");
/// assert_eq!(token.expose(), "123:ABC");
/// assert!(!format!("{:?}", token).contains("123:ABC"));
/// ```
#[derive(Clone)]
pub struct SecretToken(Zeroizing<String>);

impl SecretToken {
    /// Wrap a credential value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// A token with no value; scrubbing with it is a no-op.
    pub fn empty() -> Self {
        Self::new(String::new())
    }

    /// The cleartext credential.
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    /// Whether the token holds no value.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for SecretToken {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("SecretToken(<empty>)")
        } else {
            f.write_str("SecretToken([REDACTED])")
        }
    }
}

impl From<String> for SecretToken {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SecretToken {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl<'de> Deserialize<'de> for SecretToken {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(SecretToken::new)
    }
}
