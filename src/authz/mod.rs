//! Role-based authorization: authority materialization and request-time
//! permission checks.
//!
//! At login the user's role assignments are expanded once into a flat set of
//! authority tokens (`ROLE_<NAME>`, `PERMISSION_<NAME>`) which is embedded in
//! the issued access token. Every subsequent request is decided against that
//! snapshot alone; the role/permission graph is never consulted on the hot
//! path. Role or permission changes therefore take effect on the next login,
//! not retroactively on already-issued tokens. That staleness window is an
//! accepted trade-off, bounded by the configured token lifetime.
//!
//! All ambiguous checks fail closed: blank requirements, requirements naming
//! roles or permissions missing from the catalog, and malformed authority
//! tokens all deny. The one exception is the administrative super-role,
//! checked explicitly before anything else so a granular permission gap can
//! never lock out the administrator.

pub mod audit;
pub mod authority;
pub mod catalog;
pub mod evaluator;
pub mod requirement;

pub use audit::{AuditRecord, AuditSink, DbAuditSink};
pub use authority::{materialize, Authority, AuthoritySet, RoleGrants};
pub use catalog::Catalog;
pub use evaluator::{authorize, is_superuser, Decision, DenyReason};
pub use requirement::Requirement;
