use std::collections::HashSet;

/// The administrative super-role. Holders pass every requirement check
/// unconditionally; see [`crate::authz::evaluator::is_superuser`].
pub const SUPERUSER_ROLE: &str = "ADMIN";

/// Built-in permission names. These are seeded into the permissions table at
/// startup and referenced by the route-level requirement declarations.
pub mod permissions {
    pub const EMPLOYERS_VIEW: &str = "EMPLOYERS_VIEW";
    pub const EMPLOYERS_MANAGE: &str = "EMPLOYERS_MANAGE";
    pub const MEMBERS_VIEW: &str = "MEMBERS_VIEW";
    pub const MEMBERS_MANAGE: &str = "MEMBERS_MANAGE";
    pub const INSURERS_VIEW: &str = "INSURERS_VIEW";
    pub const INSURERS_MANAGE: &str = "INSURERS_MANAGE";
    pub const PROVIDERS_VIEW: &str = "PROVIDERS_VIEW";
    pub const PROVIDERS_MANAGE: &str = "PROVIDERS_MANAGE";
    pub const POLICIES_VIEW: &str = "POLICIES_VIEW";
    pub const POLICIES_MANAGE: &str = "POLICIES_MANAGE";
    pub const CLAIMS_VIEW: &str = "CLAIMS_VIEW";
    pub const CLAIMS_SUBMIT: &str = "CLAIMS_SUBMIT";
    pub const CLAIMS_APPROVE: &str = "CLAIMS_APPROVE";
    pub const PREAPPROVALS_VIEW: &str = "PREAPPROVALS_VIEW";
    pub const PREAPPROVALS_DECIDE: &str = "PREAPPROVALS_DECIDE";
    pub const VISITS_VIEW: &str = "VISITS_VIEW";
    pub const VISITS_MANAGE: &str = "VISITS_MANAGE";
    pub const FINANCE_VIEW: &str = "FINANCE_VIEW";
    pub const FINANCE_SETTLE: &str = "FINANCE_SETTLE";
    pub const USERS_VIEW: &str = "USERS_VIEW";
    pub const USERS_MANAGE: &str = "USERS_MANAGE";
    pub const ROLES_MANAGE: &str = "ROLES_MANAGE";

    pub const ALL: &[&str] = &[
        EMPLOYERS_VIEW,
        EMPLOYERS_MANAGE,
        MEMBERS_VIEW,
        MEMBERS_MANAGE,
        INSURERS_VIEW,
        INSURERS_MANAGE,
        PROVIDERS_VIEW,
        PROVIDERS_MANAGE,
        POLICIES_VIEW,
        POLICIES_MANAGE,
        CLAIMS_VIEW,
        CLAIMS_SUBMIT,
        CLAIMS_APPROVE,
        PREAPPROVALS_VIEW,
        PREAPPROVALS_DECIDE,
        VISITS_VIEW,
        VISITS_MANAGE,
        FINANCE_VIEW,
        FINANCE_SETTLE,
        USERS_VIEW,
        USERS_MANAGE,
        ROLES_MANAGE,
    ];
}

/// Built-in role names seeded at startup alongside [`SUPERUSER_ROLE`].
/// Operators may create further roles at runtime; these exist so a fresh
/// deployment has a usable division of duties.
pub mod roles {
    pub const CLAIMS_REVIEWER: &str = "CLAIMS_REVIEWER";
    pub const FINANCE_OFFICER: &str = "FINANCE_OFFICER";
    pub const ENROLLMENT_OFFICER: &str = "ENROLLMENT_OFFICER";
}

/// Snapshot of the role and permission names currently present in the
/// role/permission graph. The evaluator uses it to reject requirements that
/// name things which do not exist. An unknown name always denies, since
/// silently ignoring it would turn a typo into a privilege escalation.
///
/// Rebuilt after role/permission mutations; reads during request handling
/// see whichever snapshot was current when they started.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    roles: HashSet<String>,
    permissions: HashSet<String>,
}

impl Catalog {
    pub fn new(
        roles: impl IntoIterator<Item = String>,
        permissions: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            roles: roles.into_iter().collect(),
            permissions: permissions.into_iter().collect(),
        }
    }

    pub fn knows_role(&self, name: &str) -> bool {
        self.roles.contains(name)
    }

    pub fn knows_permission(&self, name: &str) -> bool {
        self.permissions.contains(name)
    }
}
