use crate::authz::authority::AuthoritySet;
use crate::authz::catalog::{Catalog, SUPERUSER_ROLE};
use crate::authz::requirement::Requirement;

/// Outcome of one requirement check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

/// Why a check denied. Callers surface all three identically (a generic
/// denial), but `UnknownName` and `EmptyRequirement` are configuration
/// errors and are logged and audited distinctly so they can be fixed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// Authenticated, but the required authority is not in the set.
    MissingAuthority,
    /// The requirement names a role or permission absent from the catalog.
    UnknownName(String),
    /// The requirement is blank or has no branches.
    EmptyRequirement,
}

impl Decision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// Label recorded by the audit sink.
    pub fn audit_label(&self) -> &'static str {
        match self {
            Decision::Allow => "ALLOW",
            Decision::Deny(DenyReason::MissingAuthority) => "DENY",
            Decision::Deny(DenyReason::UnknownName(_)) => "DENY_UNKNOWN_REQUIREMENT",
            Decision::Deny(DenyReason::EmptyRequirement) => "DENY_EMPTY_REQUIREMENT",
        }
    }
}

/// Explicit super-role check, kept out of the general matching path so the
/// bypass stays auditable and testable in isolation.
pub fn is_superuser(set: &AuthoritySet) -> bool {
    set.has_role(SUPERUSER_ROLE)
}

/// Decide one requirement against a materialized authority set.
///
/// Pure and stateless; safe to call concurrently. The super-role bypass is
/// evaluated first, before any name validation, so an administrator is never
/// blocked even by a requirement naming a permission that does not exist.
/// Everything else fails closed: blank requirements and unknown names deny.
pub fn authorize(set: &AuthoritySet, requirement: &Requirement, catalog: &Catalog) -> Decision {
    if is_superuser(set) {
        return Decision::Allow;
    }
    eval(set, requirement, catalog)
}

fn eval(set: &AuthoritySet, requirement: &Requirement, catalog: &Catalog) -> Decision {
    match requirement {
        Requirement::Permission(name) => {
            if name.trim().is_empty() {
                return Decision::Deny(DenyReason::EmptyRequirement);
            }
            if !catalog.knows_permission(name) {
                return Decision::Deny(DenyReason::UnknownName(name.clone()));
            }
            if set.has_permission(name) {
                Decision::Allow
            } else {
                Decision::Deny(DenyReason::MissingAuthority)
            }
        }
        Requirement::AnyRole(names) => {
            if names.is_empty() {
                return Decision::Deny(DenyReason::EmptyRequirement);
            }
            let mut unknown = Vec::new();
            let mut matched = false;
            for name in names {
                if name.trim().is_empty() || !catalog.knows_role(name) {
                    unknown.push(name.as_str());
                    continue;
                }
                if set.has_role(name) {
                    matched = true;
                }
            }
            if matched {
                // Misconfigured names never allow, but a sibling match does.
                // Surface them anyway so the requirement gets fixed.
                for name in &unknown {
                    tracing::warn!(
                        role = *name,
                        "requirement lists a role absent from the catalog"
                    );
                }
                return Decision::Allow;
            }
            // No listed role matched; a misconfigured name takes precedence
            // in the deny reason so it shows up in the logs.
            match unknown.first() {
                Some(name) => Decision::Deny(DenyReason::UnknownName(name.to_string())),
                None => Decision::Deny(DenyReason::MissingAuthority),
            }
        }
        Requirement::All(requirements) => {
            if requirements.is_empty() {
                return Decision::Deny(DenyReason::EmptyRequirement);
            }
            for requirement in requirements {
                match eval(set, requirement, catalog) {
                    Decision::Allow => continue,
                    deny => return deny,
                }
            }
            Decision::Allow
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::authority::{materialize, RoleGrants};
    use crate::authz::catalog::permissions;

    fn catalog() -> Catalog {
        Catalog::new(
            ["ADMIN", "CLAIMS_REVIEWER", "FINANCE_OFFICER"]
                .into_iter()
                .map(String::from),
            permissions::ALL.iter().map(|p| p.to_string()),
        )
    }

    fn reviewer_set() -> AuthoritySet {
        // User with role CLAIMS_REVIEWER holding permission CLAIMS_APPROVE only.
        materialize(&[RoleGrants {
            role: "CLAIMS_REVIEWER".to_string(),
            permissions: vec!["CLAIMS_APPROVE".to_string()],
        }])
    }

    fn admin_set() -> AuthoritySet {
        materialize(&[RoleGrants {
            role: "ADMIN".to_string(),
            permissions: vec![],
        }])
    }

    #[test]
    fn test_empty_authority_set_denies_everything() {
        let set = materialize(&[]);
        let catalog = catalog();

        for requirement in [
            Requirement::permission(permissions::CLAIMS_VIEW),
            Requirement::any_role(["CLAIMS_REVIEWER"]),
            Requirement::all([
                Requirement::permission(permissions::CLAIMS_VIEW),
                Requirement::any_role(["ADMIN"]),
            ]),
        ] {
            assert!(!authorize(&set, &requirement, &catalog).is_allow());
        }
    }

    #[test]
    fn test_held_permission_allows() {
        let decision = authorize(
            &reviewer_set(),
            &Requirement::permission("CLAIMS_APPROVE"),
            &catalog(),
        );
        assert_eq!(decision, Decision::Allow);
    }

    #[test]
    fn test_missing_permission_denies() {
        let decision = authorize(
            &reviewer_set(),
            &Requirement::permission("CLAIMS_SUBMIT"),
            &catalog(),
        );
        assert_eq!(decision, Decision::Deny(DenyReason::MissingAuthority));
    }

    #[test]
    fn test_missing_permission_denies_regardless_of_other_grants() {
        // Holding many unrelated permissions must not help.
        let set = materialize(&[RoleGrants {
            role: "ENROLLMENT_OFFICER".to_string(),
            permissions: permissions::ALL
                .iter()
                .filter(|p| **p != permissions::CLAIMS_APPROVE)
                .map(|p| p.to_string())
                .collect(),
        }]);
        let catalog = Catalog::new(
            ["ADMIN", "ENROLLMENT_OFFICER"].into_iter().map(String::from),
            permissions::ALL.iter().map(|p| p.to_string()),
        );

        let decision = authorize(&set, &Requirement::permission("CLAIMS_APPROVE"), &catalog);
        assert_eq!(decision, Decision::Deny(DenyReason::MissingAuthority));
    }

    #[test]
    fn test_role_disjunction_allows_on_role_match() {
        let decision = authorize(
            &reviewer_set(),
            &Requirement::any_role(["ADMIN", "CLAIMS_REVIEWER"]),
            &catalog(),
        );
        assert_eq!(decision, Decision::Allow);
    }

    #[test]
    fn test_role_disjunction_denies_without_match() {
        let decision = authorize(
            &reviewer_set(),
            &Requirement::any_role(["ADMIN", "FINANCE_OFFICER"]),
            &catalog(),
        );
        assert_eq!(decision, Decision::Deny(DenyReason::MissingAuthority));
    }

    #[test]
    fn test_superuser_bypass_allows_everything() {
        let set = admin_set();
        let catalog = catalog();

        assert!(authorize(&set, &Requirement::permission("CLAIMS_APPROVE"), &catalog).is_allow());
        // Including requirements the catalog has never heard of.
        assert!(authorize(
            &set,
            &Requirement::permission("NO_SUCH_PERMISSION"),
            &catalog
        )
        .is_allow());
        assert!(authorize(&set, &Requirement::any_role(["NO_SUCH_ROLE"]), &catalog).is_allow());
        // And degenerate requirements that would otherwise fail closed.
        assert!(authorize(&set, &Requirement::permission(""), &catalog).is_allow());
    }

    #[test]
    fn test_unknown_permission_name_denies() {
        let decision = authorize(
            &reviewer_set(),
            &Requirement::permission("CLAIMS_DELETE"),
            &catalog(),
        );
        assert_eq!(
            decision,
            Decision::Deny(DenyReason::UnknownName("CLAIMS_DELETE".to_string()))
        );
    }

    #[test]
    fn test_blank_permission_fails_closed() {
        for name in ["", "   "] {
            let decision = authorize(&reviewer_set(), &Requirement::permission(name), &catalog());
            assert_eq!(decision, Decision::Deny(DenyReason::EmptyRequirement));
        }
    }

    #[test]
    fn test_empty_role_list_fails_closed() {
        let decision = authorize(
            &reviewer_set(),
            &Requirement::AnyRole(Vec::new()),
            &catalog(),
        );
        assert_eq!(decision, Decision::Deny(DenyReason::EmptyRequirement));
    }

    #[test]
    fn test_empty_conjunction_fails_closed() {
        let decision = authorize(&reviewer_set(), &Requirement::All(Vec::new()), &catalog());
        assert_eq!(decision, Decision::Deny(DenyReason::EmptyRequirement));
    }

    #[test]
    fn test_unknown_role_in_disjunction_reported_when_nothing_matches() {
        let decision = authorize(
            &reviewer_set(),
            &Requirement::any_role(["AUDITOR", "FINANCE_OFFICER"]),
            &catalog(),
        );
        assert_eq!(
            decision,
            Decision::Deny(DenyReason::UnknownName("AUDITOR".to_string()))
        );

        // A genuine match still wins even when the list also carries a typo.
        let decision = authorize(
            &reviewer_set(),
            &Requirement::any_role(["AUDITOR", "CLAIMS_REVIEWER"]),
            &catalog(),
        );
        assert_eq!(decision, Decision::Allow);
    }

    #[test]
    fn test_role_disjunction_allows_despite_blank_and_unknown_siblings() {
        // Unknown and blank entries are logged, never fatal, when another
        // listed role is genuinely held.
        let decision = authorize(
            &reviewer_set(),
            &Requirement::any_role(["", "AUDITOR", "CLAIMS_REVIEWER", "TYPO_ROLE"]),
            &catalog(),
        );
        assert_eq!(decision, Decision::Allow);
    }

    #[test]
    fn test_conjunction_requires_every_branch() {
        let set = reviewer_set();
        let catalog = catalog();

        let both = Requirement::all([
            Requirement::permission("CLAIMS_APPROVE"),
            Requirement::any_role(["CLAIMS_REVIEWER"]),
        ]);
        assert_eq!(authorize(&set, &both, &catalog), Decision::Allow);

        let one_missing = Requirement::all([
            Requirement::permission("CLAIMS_APPROVE"),
            Requirement::permission("FINANCE_SETTLE"),
        ]);
        assert_eq!(
            authorize(&set, &one_missing, &catalog),
            Decision::Deny(DenyReason::MissingAuthority)
        );
    }

    #[test]
    fn test_conjunction_short_circuits_with_first_deny_reason() {
        let decision = authorize(
            &reviewer_set(),
            &Requirement::all([
                Requirement::permission("CLAIMS_DELETE"),
                Requirement::permission("CLAIMS_APPROVE"),
            ]),
            &catalog(),
        );
        assert_eq!(
            decision,
            Decision::Deny(DenyReason::UnknownName("CLAIMS_DELETE".to_string()))
        );
    }

    #[test]
    fn test_audit_labels() {
        assert_eq!(Decision::Allow.audit_label(), "ALLOW");
        assert_eq!(
            Decision::Deny(DenyReason::MissingAuthority).audit_label(),
            "DENY"
        );
        assert_eq!(
            Decision::Deny(DenyReason::UnknownName("X".into())).audit_label(),
            "DENY_UNKNOWN_REQUIREMENT"
        );
        assert_eq!(
            Decision::Deny(DenyReason::EmptyRequirement).audit_label(),
            "DENY_EMPTY_REQUIREMENT"
        );
    }
}
