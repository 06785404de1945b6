//! User identity and role types.
//!
//! A [`User`] is the profile the application works with after sign-in: the
//! identity provider supplies the stable id, while name, role, and avatar
//! come from the remote `users` collection.

use serde::{Deserialize, Serialize};

/// Unique identifier for a user.
///
/// Opaque string assigned by the identity provider; also used as the
/// document id of the user's profile in the `users` collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Creates a user id from its string form.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two account roles, fixed at sign-up.
///
/// Providers create and delete tasks; clients see only tasks assigned to
/// them. Visibility scoping is applied by the filter logic, not enforced
/// server-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Service-provider account: creates, assigns, and deletes tasks.
    Provider,
    /// Client account: works tasks assigned to it.
    Client,
}

impl Role {
    /// Parses the stored string form of a role.
    ///
    /// Returns `None` for anything other than the two known values; callers
    /// reading profile documents treat that as "default to client".
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "provider" => Some(Self::Provider),
            "client" => Some(Self::Client),
            _ => None,
        }
    }

    /// Returns the stored string form of this role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Provider => "provider",
            Self::Client => "client",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A signed-in user's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Stable identity-provider id.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Sign-in email address.
    pub email: String,
    /// Account role, immutable after sign-up.
    pub role: Role,
    /// Optional avatar URL.
    pub avatar: Option<String>,
}
