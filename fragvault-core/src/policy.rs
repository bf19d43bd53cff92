use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyParseError {
    #[error("unknown policy: {0}")]
    Unknown(String),
    #[error("user policy is missing a user id")]
    MissingUser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    View,
    Edit,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::View => f.write_str("view"),
            Capability::Edit => f.write_str("edit"),
        }
    }
}

/// Who may exercise a capability. Stored as `public`, `users`, `admin`,
/// `no-one` or `user:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Policy {
    Public,
    Users,
    Admin,
    NoOne,
    User(String),
}

impl Policy {
    pub fn as_string(&self) -> String {
        match self {
            Policy::Public => "public".to_string(),
            Policy::Users => "users".to_string(),
            Policy::Admin => "admin".to_string(),
            Policy::NoOne => "no-one".to_string(),
            Policy::User(id) => format!("user:{id}"),
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

impl FromStr for Policy {
    type Err = PolicyParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "public" => Ok(Policy::Public),
            "users" => Ok(Policy::Users),
            "admin" => Ok(Policy::Admin),
            "no-one" => Ok(Policy::NoOne),
            other => match other.strip_prefix("user:") {
                Some("") => Err(PolicyParseError::MissingUser),
                Some(id) => Ok(Policy::User(id.to_string())),
                None => Err(PolicyParseError::Unknown(other.to_string())),
            },
        }
    }
}

impl TryFrom<String> for Policy {
    type Error = PolicyParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Policy> for String {
    fn from(policy: Policy) -> Self {
        policy.as_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyPair {
    pub view: Policy,
    pub edit: Policy,
}

impl PolicyPair {
    pub fn new(view: Policy, edit: Policy) -> Self {
        Self { view, edit }
    }

    pub fn policy_for(&self, capability: Capability) -> &Policy {
        match capability {
            Capability::View => &self.view,
            Capability::Edit => &self.edit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Viewer {
    Anonymous,
    User { id: String, admin: bool },
    /// Internal actor that bypasses every policy (CLI imports, maintenance).
    Omnipotent,
}

impl Viewer {
    pub fn user(id: impl Into<String>) -> Self {
        Viewer::User {
            id: id.into(),
            admin: false,
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Viewer::User {
            id: id.into(),
            admin: true,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Viewer::User { id, .. } => Some(id),
            _ => None,
        }
    }

    fn is_admin(&self) -> bool {
        matches!(self, Viewer::User { admin: true, .. })
    }
}

/// Fragments grant no automatic capabilities, so the decision depends on
/// the policy alone.
pub fn can(capability: Capability, policies: &PolicyPair, viewer: &Viewer) -> bool {
    if *viewer == Viewer::Omnipotent {
        return true;
    }
    match policies.policy_for(capability) {
        Policy::Public => true,
        Policy::Users => viewer.user_id().is_some(),
        Policy::Admin => viewer.is_admin(),
        Policy::NoOne => false,
        Policy::User(id) => viewer.user_id() == Some(id.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_renders_policies() {
        for raw in ["public", "users", "admin", "no-one", "user:alice"] {
            let policy: Policy = raw.parse().unwrap();
            assert_eq!(policy.to_string(), raw);
        }
        assert_eq!("user:".parse::<Policy>(), Err(PolicyParseError::MissingUser));
        assert!(matches!(
            "everyone".parse::<Policy>(),
            Err(PolicyParseError::Unknown(_))
        ));
    }

    #[test]
    fn policy_pair_serializes_as_strings() {
        let pair = PolicyPair::new(Policy::Public, Policy::User("alice".into()));
        let json = serde_json::to_string(&pair).unwrap();
        assert_eq!(json, r#"{"view":"public","edit":"user:alice"}"#);
        assert_eq!(serde_json::from_str::<PolicyPair>(&json).unwrap(), pair);
        assert!(serde_json::from_str::<PolicyPair>(r#"{"view":"x","edit":"users"}"#).is_err());
    }

    #[test]
    fn users_policy_excludes_anonymous() {
        let pair = PolicyPair::new(Policy::Users, Policy::Admin);
        assert!(!can(Capability::View, &pair, &Viewer::Anonymous));
        assert!(can(Capability::View, &pair, &Viewer::user("bob")));
        assert!(!can(Capability::Edit, &pair, &Viewer::user("bob")));
        assert!(can(Capability::Edit, &pair, &Viewer::admin("root")));
    }

    #[test]
    fn user_policy_matches_only_that_user() {
        let pair = PolicyPair::new(Policy::User("alice".into()), Policy::NoOne);
        assert!(can(Capability::View, &pair, &Viewer::user("alice")));
        assert!(!can(Capability::View, &pair, &Viewer::admin("bob")));
        assert!(!can(Capability::Edit, &pair, &Viewer::user("alice")));
        assert!(can(Capability::Edit, &pair, &Viewer::Omnipotent));
    }
}
