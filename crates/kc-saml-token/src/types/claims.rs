//! Claims and identities produced by validation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{claim_types, claim_value_types};

/// A single statement about the subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// Claim type URI or name.
    pub claim_type: String,

    /// Claim value.
    pub value: String,

    /// XML Schema type of the value.
    pub value_type: String,

    /// Authority that issued the assertion the claim came from.
    pub issuer: String,

    /// Authority that originally asserted the claim.
    pub original_issuer: String,

    /// Additional metadata keyed by claim property URI.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl Claim {
    /// Creates a string-valued claim whose original issuer is its issuer.
    #[must_use]
    pub fn new(claim_type: impl Into<String>, value: impl Into<String>, issuer: impl Into<String>) -> Self {
        let issuer = issuer.into();
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
            value_type: claim_value_types::STRING.to_string(),
            original_issuer: issuer.clone(),
            issuer,
            properties: BTreeMap::new(),
        }
    }

    /// Sets the value type.
    #[must_use]
    pub fn with_value_type(mut self, value_type: impl Into<String>) -> Self {
        self.value_type = value_type.into();
        self
    }

    /// Sets the original issuer.
    #[must_use]
    pub fn with_original_issuer(mut self, original_issuer: impl Into<String>) -> Self {
        self.original_issuer = original_issuer.into();
        self
    }

    /// Adds a property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// An ordered set of claims with an optional delegated actor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimsIdentity {
    /// How the identity was authenticated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication_type: Option<String>,

    /// Claims in the order they were produced.
    pub claims: Vec<Claim>,

    /// Identity acting on behalf of this one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<Box<ClaimsIdentity>>,

    /// The raw token the identity was built from, when retained.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootstrap_context: Option<String>,
}

impl ClaimsIdentity {
    /// Creates an empty identity.
    #[must_use]
    pub fn new(authentication_type: impl Into<String>) -> Self {
        Self {
            authentication_type: Some(authentication_type.into()),
            ..Self::default()
        }
    }

    /// Appends a claim.
    pub fn add_claim(&mut self, claim: Claim) {
        self.claims.push(claim);
    }

    /// Appends a claim, builder style.
    #[must_use]
    pub fn with_claim(mut self, claim: Claim) -> Self {
        self.claims.push(claim);
        self
    }

    /// Sets the actor, builder style.
    #[must_use]
    pub fn with_actor(mut self, actor: Self) -> Self {
        self.actor = Some(Box::new(actor));
        self
    }

    /// Returns the first claim of the given type.
    #[must_use]
    pub fn find_first(&self, claim_type: &str) -> Option<&Claim> {
        self.claims.iter().find(|c| c.claim_type == claim_type)
    }

    /// Iterates over claims of the given type.
    pub fn claims_of_type<'a>(&'a self, claim_type: &'a str) -> impl Iterator<Item = &'a Claim> {
        self.claims.iter().filter(move |c| c.claim_type == claim_type)
    }

    /// Returns the subject name identifier, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.find_first(claim_types::NAME_IDENTIFIER)
            .map(|c| c.value.as_str())
    }

    /// Returns the number of identities in the actor chain below this one.
    #[must_use]
    pub fn actor_depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.actor.as_deref();
        while let Some(actor) = current {
            depth += 1;
            current = actor.actor.as_deref();
        }
        depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_defaults_to_string_value_from_issuer() {
        let claim = Claim::new("email", "user@example.com", "https://idp.example.com");
        assert_eq!(claim.value_type, claim_value_types::STRING);
        assert_eq!(claim.original_issuer, "https://idp.example.com");
        assert!(claim.properties.is_empty());
    }

    #[test]
    fn lookup_by_type_preserves_order() {
        let identity = ClaimsIdentity::new("test")
            .with_claim(Claim::new(claim_types::ROLE, "admin", "idp"))
            .with_claim(Claim::new(claim_types::NAME_IDENTIFIER, "alice", "idp"))
            .with_claim(Claim::new(claim_types::ROLE, "user", "idp"));

        let roles: Vec<_> = identity
            .claims_of_type(claim_types::ROLE)
            .map(|c| c.value.as_str())
            .collect();
        assert_eq!(roles, ["admin", "user"]);
        assert_eq!(identity.name(), Some("alice"));
    }

    #[test]
    fn actor_depth_counts_chain() {
        let inner = ClaimsIdentity::new("actor");
        let middle = ClaimsIdentity::new("actor").with_actor(inner);
        let identity = ClaimsIdentity::new("test").with_actor(middle);
        assert_eq!(identity.actor_depth(), 2);
        assert_eq!(ClaimsIdentity::default().actor_depth(), 0);
    }
}
