use serde::{Deserialize, Serialize};

/// The authorization requirement attached to a protected operation, declared
/// at route-registration time and interpreted by the evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Requirement {
    /// The caller must hold this permission.
    Permission(String),
    /// The caller must hold at least one of these roles.
    AnyRole(Vec<String>),
    /// Every sub-requirement must hold.
    All(Vec<Requirement>),
}

impl Requirement {
    pub fn permission(name: impl Into<String>) -> Self {
        Requirement::Permission(name.into())
    }

    pub fn any_role<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Requirement::AnyRole(names.into_iter().map(Into::into).collect())
    }

    pub fn all(requirements: impl IntoIterator<Item = Requirement>) -> Self {
        Requirement::All(requirements.into_iter().collect())
    }
}
