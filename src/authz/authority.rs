use std::collections::HashSet;
use std::fmt;

pub const ROLE_PREFIX: &str = "ROLE_";
pub const PERMISSION_PREFIX: &str = "PERMISSION_";

/// A single flat authority token, e.g. `ROLE_ADMIN` or
/// `PERMISSION_CLAIMS_APPROVE`. These are what the access token carries in
/// its `authorities` claim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Authority {
    Role(String),
    Permission(String),
}

impl Authority {
    pub fn role(name: impl Into<String>) -> Self {
        Authority::Role(name.into())
    }

    pub fn permission(name: impl Into<String>) -> Self {
        Authority::Permission(name.into())
    }

    /// Parse the flat wire form. Unknown prefixes and empty names are
    /// rejected, not skipped.
    pub fn parse(token: &str) -> Option<Self> {
        if let Some(name) = token.strip_prefix(ROLE_PREFIX) {
            if !name.is_empty() {
                return Some(Authority::Role(name.to_string()));
            }
        }
        if let Some(name) = token.strip_prefix(PERMISSION_PREFIX) {
            if !name.is_empty() {
                return Some(Authority::Permission(name.to_string()));
            }
        }
        None
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Authority::Role(name) => write!(f, "{ROLE_PREFIX}{name}"),
            Authority::Permission(name) => write!(f, "{PERMISSION_PREFIX}{name}"),
        }
    }
}

/// The effective authorities of one principal, materialized once at token
/// issuance. Set semantics: no ordering, duplicates collapse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthoritySet {
    entries: HashSet<Authority>,
}

impl AuthoritySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, authority: Authority) {
        self.entries.insert(authority);
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.entries.contains(&Authority::Role(name.to_string()))
    }

    pub fn has_permission(&self, name: &str) -> bool {
        self.entries
            .contains(&Authority::Permission(name.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Flat tokens for the `authorities` claim, sorted so issued tokens are
    /// deterministic for a given authority set.
    pub fn to_claims(&self) -> Vec<String> {
        let mut tokens: Vec<String> = self.entries.iter().map(|a| a.to_string()).collect();
        tokens.sort();
        tokens
    }

    /// Rebuild a set from claim tokens. Any malformed token poisons the whole
    /// claim: the caller must treat the credential as invalid rather than
    /// authorize on a partial set.
    pub fn from_claims<S: AsRef<str>>(tokens: &[S]) -> Result<Self, String> {
        let mut set = AuthoritySet::new();
        for token in tokens {
            let token = token.as_ref();
            match Authority::parse(token) {
                Some(authority) => set.insert(authority),
                None => return Err(format!("malformed authority token `{token}`")),
            }
        }
        Ok(set)
    }
}

impl FromIterator<Authority> for AuthoritySet {
    fn from_iter<I: IntoIterator<Item = Authority>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// One assigned role with the permission names it grants, as read from the
/// role/permission graph at login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGrants {
    pub role: String,
    pub permissions: Vec<String>,
}

/// Expand a user's role assignments into the flat authority set.
///
/// Pure function of the passed graph snapshot: one role authority per
/// assigned role plus one permission authority per permission reachable
/// through any role, deduplicated. Zero roles yield the empty set; such a
/// user can authenticate, but every protected operation will deny.
pub fn materialize(roles: &[RoleGrants]) -> AuthoritySet {
    let mut set = AuthoritySet::new();
    for grants in roles {
        set.insert(Authority::role(grants.role.clone()));
        for permission in &grants.permissions {
            set.insert(Authority::permission(permission.clone()));
        }
    }
    set
}
