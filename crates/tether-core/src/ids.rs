//! Branded identifier newtypes.
//!
//! Every id on the wire is an opaque string. Wrapping them keeps a
//! `UserId` from being passed where a `CommunityId` is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw string.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the raw string.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Whether the id is empty or whitespace only.
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }

            /// Consume into the raw string.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

branded_id!(
    /// Stable user identity; the relay's addressing key.
    UserId
);

branded_id!(
    /// Community (group) identifier.
    CommunityId
);

branded_id!(
    /// Identifier of one call attempt, shared by both parties' state machines.
    CallId
);

branded_id!(
    /// Identifier of a single live relay socket.
    ConnectionId
);

impl CallId {
    /// Generate a fresh, time-ordered call id.
    pub fn generate() -> Self {
        Self(format!("call_{}", uuid::Uuid::now_v7().simple()))
    }
}

impl ConnectionId {
    /// Generate a fresh connection id.
    pub fn generate() -> Self {
        Self(format!("conn_{}", uuid::Uuid::now_v7().simple()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_serializes_transparently() {
        let id = UserId::new("u1");
        assert_eq!(serde_json::to_value(&id).unwrap(), serde_json::json!("u1"));
        let back: UserId = serde_json::from_value(serde_json::json!("u1")).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn blank_detection() {
        assert!(UserId::new("").is_blank());
        assert!(UserId::new("   ").is_blank());
        assert!(!UserId::new("u").is_blank());
    }

    #[test]
    fn generated_call_ids_are_unique() {
        let a = CallId::generate();
        let b = CallId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("call_"));
    }

    #[test]
    fn generated_connection_ids_have_prefix() {
        assert!(ConnectionId::generate().as_str().starts_with("conn_"));
    }

    #[test]
    fn display_matches_inner() {
        assert_eq!(CommunityId::from("grief-circle").to_string(), "grief-circle");
    }
}
