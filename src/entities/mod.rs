pub mod audit_event;
pub mod benefit_package;
pub mod claim;
pub mod counter;
pub mod employer;
pub mod insurer;
pub mod member;
pub mod permission;
pub mod policy;
pub mod preapproval;
pub mod provider;
pub mod role;
pub mod role_permission;
pub mod settlement;
pub mod user;
pub mod user_role;
pub mod visit;

pub use audit_event::Entity as AuditEvent;
pub use benefit_package::Entity as BenefitPackage;
pub use claim::Entity as Claim;
pub use counter::Entity as Counter;
pub use employer::Entity as Employer;
pub use insurer::Entity as Insurer;
pub use member::Entity as Member;
pub use permission::Entity as Permission;
pub use policy::Entity as Policy;
pub use preapproval::Entity as Preapproval;
pub use provider::Entity as Provider;
pub use role::Entity as Role;
pub use role_permission::Entity as RolePermission;
pub use settlement::Entity as Settlement;
pub use user::Entity as User;
pub use user_role::Entity as UserRole;
pub use visit::Entity as Visit;
