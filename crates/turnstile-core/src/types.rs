//! Strong type definitions for Turnstile.
//!
//! All identifiers are newtypes to prevent misuse at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a subscriber on the messaging platform.
///
/// Primary key of the subscription store.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(pub i64);

impl SubscriberId {
    /// Create a new SubscriberId from the raw platform value.
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Get the raw platform value.
    pub const fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Debug for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriberId({})", self.0)
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SubscriberId {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

/// Identifier of the restricted channel access is granted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub i64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a confirmed payment, as reported by the payment provider.
///
/// Used to recognise duplicate confirmation callbacks for one purchase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(pub String);

impl PaymentId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single-use invitation credential admitting exactly one identity.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InviteToken(pub String);

impl InviteToken {
    pub fn new(link: impl Into<String>) -> Self {
        Self(link.into())
    }

    /// The invitation as it is delivered to the subscriber.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Invitations are credentials; keep them out of debug logs.
impl fmt::Debug for InviteToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InviteToken(..{})", self.0.len())
    }
}

impl fmt::Display for InviteToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Descriptive metadata about a subscriber. Never used in decisions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Full display name.
    pub display_name: Option<String>,
    /// Public handle (username), if the subscriber has one.
    pub handle: Option<String>,
}

impl Identity {
    pub fn new(display_name: impl Into<String>, handle: Option<String>) -> Self {
        Self {
            display_name: Some(display_name.into()),
            handle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscriber_id_display() {
        let id = SubscriberId::new(424242);
        assert_eq!(format!("{}", id), "424242");
        assert_eq!(format!("{:?}", id), "SubscriberId(424242)");
    }

    #[test]
    fn test_invite_token_debug_hides_link() {
        let token = InviteToken::new("https://t.me/+secret");
        let debug = format!("{:?}", token);
        assert!(!debug.contains("secret"));
        assert_eq!(token.as_str(), "https://t.me/+secret");
    }

    #[test]
    fn test_subscriber_id_serde_transparent() {
        let json = serde_json::to_string(&SubscriberId::new(7)).unwrap();
        assert_eq!(json, "7");
    }
}
