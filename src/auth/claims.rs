use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Role granted to operators.
pub const ROLE_ADMIN: &str = "ADMIN";
/// Role granted to ordinary users.
pub const ROLE_USER: &str = "USER";

/// The signed assertion carried inside a token.
///
/// Serialised with the registered JWT claim names (`iss`, `sub`, `aud`, `exp`,
/// `nbf`, `iat`, `jti`) plus a `roles` array. Timestamps are seconds since the
/// Unix epoch. A value is never mutated after it has been signed; mint a new
/// one instead.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Claims {
    #[serde(rename = "iss")]
    pub issuer: String,
    #[serde(rename = "sub")]
    pub subject: String,
    #[serde(rename = "aud", default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
    #[serde(rename = "exp")]
    pub expires_at: u64,
    #[serde(rename = "nbf", default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<u64>,
    #[serde(rename = "iat")]
    pub issued_at: u64,
    #[serde(rename = "jti", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

impl Claims {
    /// Claims issued now, expiring after `ttl`, with a fresh unique id and no roles.
    pub fn new(issuer: impl Into<String>, subject: impl Into<String>, ttl: Duration) -> Self {
        let now = jsonwebtoken::get_current_timestamp();
        Self {
            issuer: issuer.into(),
            subject: subject.into(),
            audience: None,
            expires_at: now.saturating_add(ttl.as_secs()),
            not_before: None,
            issued_at: now,
            id: Some(uuid::Uuid::new_v4().to_string()),
            roles: BTreeSet::new(),
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn with_not_before(mut self, not_before: u64) -> Self {
        self.not_before = Some(not_before);
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// `true` iff the claims hold at least one of `required`.
    ///
    /// An empty `required` list authorizes no one.
    pub fn authorized<S: AsRef<str>>(&self, required: &[S]) -> bool {
        required.iter().any(|role| self.has_role(role.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with(roles: &[&str]) -> Claims {
        Claims::new("service project", "user-1", Duration::from_secs(60)).with_roles(roles.iter().copied())
    }

    #[test]
    fn authorized_when_roles_overlap() {
        let claims = user_with(&[ROLE_USER, ROLE_ADMIN]);
        assert!(claims.authorized(&[ROLE_ADMIN]));
        assert!(claims.authorized(&["AUDITOR", ROLE_USER]));
    }

    #[test]
    fn not_authorized_when_roles_are_disjoint() {
        let claims = user_with(&[ROLE_USER]);
        assert!(!claims.authorized(&[ROLE_ADMIN]));
        assert!(!user_with(&[]).authorized(&[ROLE_USER]));
    }

    #[test]
    fn empty_requirement_denies_everyone() {
        let none: [&str; 0] = [];
        assert!(!user_with(&[ROLE_ADMIN, ROLE_USER]).authorized(&none));
        assert!(!user_with(&[]).authorized(&none));
    }

    #[test]
    fn serialises_with_registered_claim_names() {
        let claims = Claims {
            issuer: "service project".into(),
            subject: "123456789".into(),
            audience: None,
            expires_at: 2_000_000_000,
            not_before: None,
            issued_at: 1_700_000_000,
            id: None,
            roles: [ROLE_ADMIN.to_owned()].into(),
        };
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "iss": "service project",
                "sub": "123456789",
                "exp": 2_000_000_000u64,
                "iat": 1_700_000_000u64,
                "roles": ["ADMIN"],
            })
        );
        let back: Claims = serde_json::from_value(json).unwrap();
        assert_eq!(back, claims);
    }

    #[test]
    fn new_claims_expire_after_ttl() {
        let claims = Claims::new("iss", "sub", Duration::from_secs(3600));
        assert_eq!(claims.expires_at - claims.issued_at, 3600);
        assert!(claims.id.is_some());
        assert!(claims.roles.is_empty());
    }
}
