use crate::authz::catalog::{self, permissions, Catalog, SUPERUSER_ROLE};
use crate::authz::RoleGrants;
use crate::entities;
use crate::errors::ClaimstoneError;
use crate::settings::Database as DbCfg;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, Database, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};

pub mod claim_status {
    pub const SUBMITTED: &str = "SUBMITTED";
    pub const APPROVED: &str = "APPROVED";
    pub const REJECTED: &str = "REJECTED";
    pub const SETTLED: &str = "SETTLED";
}

pub mod preapproval_status {
    pub const PENDING: &str = "PENDING";
    pub const GRANTED: &str = "GRANTED";
    pub const DENIED: &str = "DENIED";
}

pub mod policy_status {
    pub const ACTIVE: &str = "ACTIVE";
    pub const SUSPENDED: &str = "SUSPENDED";
    pub const EXPIRED: &str = "EXPIRED";
}

/// One page of query results. `per_page` is the effective page size after
/// clamping, which may be smaller than what the caller asked for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

pub const MAX_PAGE_SIZE: u64 = 100;

fn page_size(per_page: u64) -> u64 {
    per_page.clamp(1, MAX_PAGE_SIZE)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEmployer {
    pub name: String,
    pub registration_no: String,
    pub contact_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMember {
    pub employer_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInsurer {
    pub name: String,
    pub license_no: String,
    pub contact_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProvider {
    pub name: String,
    pub provider_type: String,
    pub contact_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBenefitPackage {
    pub name: String,
    pub annual_limit: i64,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPolicy {
    pub policy_no: String,
    pub employer_id: i64,
    pub insurer_id: i64,
    pub benefit_package_id: i64,
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewClaim {
    pub member_id: i64,
    pub provider_id: i64,
    pub policy_id: i64,
    pub amount: i64,
    pub incident_date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPreapproval {
    pub member_id: i64,
    pub provider_id: i64,
    pub requested_amount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVisit {
    pub member_id: i64,
    pub provider_id: i64,
    pub visit_date: String,
    pub diagnosis: Option<String>,
    pub claim_id: Option<i64>,
}

/// Connect and bring the schema up to date.
pub async fn init(cfg: &DbCfg) -> Result<DatabaseConnection, ClaimstoneError> {
    use migration::MigratorTrait;

    let db = Database::connect(&cfg.url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

// User management functions

pub async fn create_user(
    db: &DatabaseConnection,
    username: &str,
    password: &str,
    email: Option<String>,
) -> Result<entities::user::Model, ClaimstoneError> {
    use argon2::password_hash::{rand_core::OsRng, SaltString};
    use argon2::{Argon2, PasswordHasher};

    let created_at = Utc::now().timestamp();

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| ClaimstoneError::Other(format!("Password hashing failed: {}", e)))?
        .to_string();

    let user = entities::user::ActiveModel {
        username: Set(username.to_string()),
        password_hash: Set(password_hash),
        email: Set(email),
        enabled: Set(1),
        created_at: Set(created_at),
        ..Default::default()
    };

    Ok(user.insert(db).await?)
}

pub async fn get_user(
    db: &DatabaseConnection,
    id: i64,
) -> Result<Option<entities::user::Model>, ClaimstoneError> {
    Ok(entities::User::find_by_id(id).one(db).await?)
}

pub async fn get_user_by_username(
    db: &DatabaseConnection,
    username: &str,
) -> Result<Option<entities::user::Model>, ClaimstoneError> {
    use entities::user::{Column, Entity};

    Ok(Entity::find()
        .filter(Column::Username.eq(username))
        .one(db)
        .await?)
}

/// Password check for login. Disabled users cannot authenticate.
pub async fn verify_user_password(
    db: &DatabaseConnection,
    username: &str,
    password: &str,
) -> Result<Option<entities::user::Model>, ClaimstoneError> {
    use argon2::{Argon2, PasswordHash, PasswordVerifier};

    let user = match get_user_by_username(db, username).await? {
        Some(u) if u.enabled == 1 => u,
        _ => return Ok(None),
    };

    let parsed_hash = PasswordHash::new(&user.password_hash)
        .map_err(|e| ClaimstoneError::Other(format!("Invalid password hash: {}", e)))?;

    if Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
    {
        Ok(Some(user))
    } else {
        Ok(None)
    }
}

/// Users are soft-deactivated, never deleted, to preserve audit trails.
pub async fn set_user_enabled(
    db: &DatabaseConnection,
    id: i64,
    enabled: bool,
) -> Result<(), ClaimstoneError> {
    let user = get_user(db, id)
        .await?
        .ok_or_else(|| ClaimstoneError::NotFound(format!("user {id}")))?;

    let mut active: entities::user::ActiveModel = user.into();
    active.enabled = Set(if enabled { 1 } else { 0 });
    active.update(db).await?;
    Ok(())
}

pub async fn list_users(
    db: &DatabaseConnection,
    page: u64,
    per_page: u64,
) -> Result<Page<entities::user::Model>, ClaimstoneError> {
    use entities::user::{Column, Entity};

    let per_page = page_size(per_page);
    let paginator = Entity::find()
        .order_by_asc(Column::Id)
        .paginate(db, per_page);
    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(page).await?;
    Ok(Page {
        items,
        total,
        page,
        per_page,
    })
}

// Role / permission graph functions

pub async fn create_role(
    db: &DatabaseConnection,
    name: &str,
    description: Option<String>,
) -> Result<entities::role::Model, ClaimstoneError> {
    let role = entities::role::ActiveModel {
        name: Set(name.to_string()),
        description: Set(description),
        ..Default::default()
    };
    Ok(role.insert(db).await?)
}

pub async fn get_role_by_name(
    db: &DatabaseConnection,
    name: &str,
) -> Result<Option<entities::role::Model>, ClaimstoneError> {
    use entities::role::{Column, Entity};

    Ok(Entity::find().filter(Column::Name.eq(name)).one(db).await?)
}

pub async fn list_roles(
    db: &DatabaseConnection,
) -> Result<Vec<entities::role::Model>, ClaimstoneError> {
    use entities::role::{Column, Entity};

    Ok(Entity::find().order_by_asc(Column::Name).all(db).await?)
}

pub async fn create_permission(
    db: &DatabaseConnection,
    name: &str,
    description: Option<String>,
) -> Result<entities::permission::Model, ClaimstoneError> {
    let permission = entities::permission::ActiveModel {
        name: Set(name.to_string()),
        description: Set(description),
        ..Default::default()
    };
    Ok(permission.insert(db).await?)
}

pub async fn get_permission_by_name(
    db: &DatabaseConnection,
    name: &str,
) -> Result<Option<entities::permission::Model>, ClaimstoneError> {
    use entities::permission::{Column, Entity};

    Ok(Entity::find().filter(Column::Name.eq(name)).one(db).await?)
}

pub async fn list_permissions(
    db: &DatabaseConnection,
) -> Result<Vec<entities::permission::Model>, ClaimstoneError> {
    use entities::permission::{Column, Entity};

    Ok(Entity::find().order_by_asc(Column::Name).all(db).await?)
}

/// Assign a role to a user. Idempotent.
pub async fn assign_role(
    db: &DatabaseConnection,
    user_id: i64,
    role_id: i64,
) -> Result<(), ClaimstoneError> {
    use entities::user_role::{Column, Entity};

    let existing = Entity::find()
        .filter(Column::UserId.eq(user_id))
        .filter(Column::RoleId.eq(role_id))
        .one(db)
        .await?;
    if existing.is_some() {
        return Ok(());
    }

    // Composite-key insert; skip the post-insert fetch.
    let assignment = entities::user_role::ActiveModel {
        user_id: Set(user_id),
        role_id: Set(role_id),
    };
    Entity::insert(assignment).exec_without_returning(db).await?;
    Ok(())
}

pub async fn remove_role(
    db: &DatabaseConnection,
    user_id: i64,
    role_id: i64,
) -> Result<(), ClaimstoneError> {
    use entities::user_role::{Column, Entity};

    Entity::delete_many()
        .filter(Column::UserId.eq(user_id))
        .filter(Column::RoleId.eq(role_id))
        .exec(db)
        .await?;
    Ok(())
}

/// Grant a permission to a role. Idempotent.
pub async fn grant_permission(
    db: &DatabaseConnection,
    role_id: i64,
    permission_id: i64,
) -> Result<(), ClaimstoneError> {
    use entities::role_permission::{Column, Entity};

    let existing = Entity::find()
        .filter(Column::RoleId.eq(role_id))
        .filter(Column::PermissionId.eq(permission_id))
        .one(db)
        .await?;
    if existing.is_some() {
        return Ok(());
    }

    let grant = entities::role_permission::ActiveModel {
        role_id: Set(role_id),
        permission_id: Set(permission_id),
    };
    Entity::insert(grant).exec_without_returning(db).await?;
    Ok(())
}

pub async fn revoke_permission(
    db: &DatabaseConnection,
    role_id: i64,
    permission_id: i64,
) -> Result<(), ClaimstoneError> {
    use entities::role_permission::{Column, Entity};

    Entity::delete_many()
        .filter(Column::RoleId.eq(role_id))
        .filter(Column::PermissionId.eq(permission_id))
        .exec(db)
        .await?;
    Ok(())
}

/// Read one user's slice of the role/permission graph, as input for
/// authority materialization at login.
pub async fn user_role_graph(
    db: &DatabaseConnection,
    user_id: i64,
) -> Result<Vec<RoleGrants>, ClaimstoneError> {
    let role_ids: Vec<i64> = entities::UserRole::find()
        .filter(entities::user_role::Column::UserId.eq(user_id))
        .all(db)
        .await?
        .into_iter()
        .map(|row| row.role_id)
        .collect();

    if role_ids.is_empty() {
        return Ok(Vec::new());
    }

    let roles = entities::Role::find()
        .filter(entities::role::Column::Id.is_in(role_ids))
        .all(db)
        .await?;

    let mut graph = Vec::with_capacity(roles.len());
    for role in roles {
        let permission_ids: Vec<i64> = entities::RolePermission::find()
            .filter(entities::role_permission::Column::RoleId.eq(role.id))
            .all(db)
            .await?
            .into_iter()
            .map(|row| row.permission_id)
            .collect();

        let permissions = if permission_ids.is_empty() {
            Vec::new()
        } else {
            entities::Permission::find()
                .filter(entities::permission::Column::Id.is_in(permission_ids))
                .all(db)
                .await?
                .into_iter()
                .map(|p| p.name)
                .collect()
        };

        graph.push(RoleGrants {
            role: role.name,
            permissions,
        });
    }

    Ok(graph)
}

/// Snapshot of every role and permission name, consumed by the evaluator's
/// unknown-name check.
pub async fn rbac_catalog(db: &DatabaseConnection) -> Result<Catalog, ClaimstoneError> {
    let roles = entities::Role::find()
        .all(db)
        .await?
        .into_iter()
        .map(|r| r.name);
    let permissions = entities::Permission::find()
        .all(db)
        .await?
        .into_iter()
        .map(|p| p.name);
    Ok(Catalog::new(roles, permissions))
}

async fn ensure_permission(
    db: &DatabaseConnection,
    name: &str,
) -> Result<entities::permission::Model, ClaimstoneError> {
    match get_permission_by_name(db, name).await? {
        Some(p) => Ok(p),
        None => create_permission(db, name, None).await,
    }
}

async fn ensure_role(
    db: &DatabaseConnection,
    name: &str,
    description: &str,
    permission_names: &[&str],
) -> Result<entities::role::Model, ClaimstoneError> {
    let role = match get_role_by_name(db, name).await? {
        Some(r) => r,
        None => create_role(db, name, Some(description.to_string())).await?,
    };
    for permission_name in permission_names {
        let permission = ensure_permission(db, permission_name).await?;
        grant_permission(db, role.id, permission.id).await?;
    }
    Ok(role)
}

/// Seed the built-in permission catalog, the standard roles, and the
/// bootstrap admin user. Idempotent; safe to run on every startup.
pub async fn seed_rbac(
    db: &DatabaseConnection,
    admin_password: &str,
) -> Result<(), ClaimstoneError> {
    for name in permissions::ALL {
        ensure_permission(db, name).await?;
    }

    ensure_role(
        db,
        SUPERUSER_ROLE,
        "Administrative super-role; passes every check",
        permissions::ALL,
    )
    .await?;

    ensure_role(
        db,
        catalog::roles::CLAIMS_REVIEWER,
        "Reviews and decides submitted claims and pre-approvals",
        &[
            permissions::CLAIMS_VIEW,
            permissions::CLAIMS_APPROVE,
            permissions::PREAPPROVALS_VIEW,
            permissions::PREAPPROVALS_DECIDE,
            permissions::MEMBERS_VIEW,
            permissions::VISITS_VIEW,
        ],
    )
    .await?;

    ensure_role(
        db,
        catalog::roles::FINANCE_OFFICER,
        "Settles approved claims and views finance records",
        &[
            permissions::CLAIMS_VIEW,
            permissions::FINANCE_VIEW,
            permissions::FINANCE_SETTLE,
        ],
    )
    .await?;

    ensure_role(
        db,
        catalog::roles::ENROLLMENT_OFFICER,
        "Manages employers, members, policies and providers",
        &[
            permissions::EMPLOYERS_VIEW,
            permissions::EMPLOYERS_MANAGE,
            permissions::MEMBERS_VIEW,
            permissions::MEMBERS_MANAGE,
            permissions::INSURERS_VIEW,
            permissions::INSURERS_MANAGE,
            permissions::PROVIDERS_VIEW,
            permissions::PROVIDERS_MANAGE,
            permissions::POLICIES_VIEW,
            permissions::POLICIES_MANAGE,
            permissions::VISITS_VIEW,
            permissions::VISITS_MANAGE,
            permissions::CLAIMS_SUBMIT,
        ],
    )
    .await?;

    if get_user_by_username(db, "admin").await?.is_none() {
        let admin = create_user(db, "admin", admin_password, None).await?;
        let role = get_role_by_name(db, SUPERUSER_ROLE)
            .await?
            .ok_or_else(|| ClaimstoneError::Other("ADMIN role missing after seed".to_string()))?;
        assign_role(db, admin.id, role.id).await?;
        tracing::info!("Created bootstrap admin user (username: admin)");
    }

    Ok(())
}

// Number generators

/// Next value of a named per-year counter, formatted `<prefix>-<year>-<seq>`.
///
/// The increment is self-relative (`value = value + 1`), not a read-modify-
/// write of an absolute value. The row lock taken by the UPDATE serializes
/// concurrent callers, and the read-back inside the same transaction sees
/// this caller's own increment, so two claims can never share a number even
/// at read-committed isolation.
async fn next_number(
    db: &DatabaseConnection,
    kind: &str,
    prefix: &str,
) -> Result<String, ClaimstoneError> {
    use entities::counter::{Column, Entity};

    let year = Utc::now().format("%Y").to_string();
    let counter_name = format!("{kind}:{year}");

    let txn = db.begin().await?;
    let updated = Entity::update_many()
        .col_expr(Column::Value, Expr::col(Column::Value).add(1))
        .filter(Column::Name.eq(counter_name.clone()))
        .exec(&txn)
        .await?;
    let next = if updated.rows_affected == 0 {
        // First number of this kind and year.
        let counter = entities::counter::ActiveModel {
            name: Set(counter_name.clone()),
            value: Set(1),
        };
        counter.insert(&txn).await?;
        1
    } else {
        Entity::find()
            .filter(Column::Name.eq(counter_name.clone()))
            .one(&txn)
            .await?
            .map(|counter| counter.value)
            .ok_or_else(|| {
                ClaimstoneError::Other(format!("counter {counter_name} vanished mid-update"))
            })?
    };
    txn.commit().await?;

    Ok(format!("{prefix}-{year}-{next:06}"))
}

pub async fn next_claim_number(db: &DatabaseConnection) -> Result<String, ClaimstoneError> {
    next_number(db, "claim", "CLM").await
}

pub async fn next_member_number(db: &DatabaseConnection) -> Result<String, ClaimstoneError> {
    next_number(db, "member", "MBR").await
}

// Employer functions

pub async fn create_employer(
    db: &DatabaseConnection,
    input: NewEmployer,
) -> Result<entities::employer::Model, ClaimstoneError> {
    let employer = entities::employer::ActiveModel {
        name: Set(input.name),
        registration_no: Set(input.registration_no),
        contact_email: Set(input.contact_email),
        created_at: Set(Utc::now().timestamp()),
        ..Default::default()
    };
    Ok(employer.insert(db).await?)
}

pub async fn get_employer(
    db: &DatabaseConnection,
    id: i64,
) -> Result<Option<entities::employer::Model>, ClaimstoneError> {
    Ok(entities::Employer::find_by_id(id).one(db).await?)
}

pub async fn list_employers(
    db: &DatabaseConnection,
    name_query: Option<&str>,
    page: u64,
    per_page: u64,
) -> Result<Page<entities::employer::Model>, ClaimstoneError> {
    use entities::employer::{Column, Entity};

    let mut query = Entity::find().order_by_asc(Column::Id);
    if let Some(q) = name_query {
        if !q.is_empty() {
            query = query.filter(Column::Name.contains(q));
        }
    }

    let per_page = page_size(per_page);
    let paginator = query.paginate(db, per_page);
    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(page).await?;
    Ok(Page {
        items,
        total,
        page,
        per_page,
    })
}

// Member functions

pub async fn create_member(
    db: &DatabaseConnection,
    input: NewMember,
) -> Result<entities::member::Model, ClaimstoneError> {
    get_employer(db, input.employer_id)
        .await?
        .ok_or_else(|| ClaimstoneError::NotFound(format!("employer {}", input.employer_id)))?;

    let member_no = next_member_number(db).await?;
    let member = entities::member::ActiveModel {
        member_no: Set(member_no),
        employer_id: Set(input.employer_id),
        first_name: Set(input.first_name),
        last_name: Set(input.last_name),
        date_of_birth: Set(input.date_of_birth),
        active: Set(1),
        created_at: Set(Utc::now().timestamp()),
        ..Default::default()
    };
    Ok(member.insert(db).await?)
}

pub async fn get_member(
    db: &DatabaseConnection,
    id: i64,
) -> Result<Option<entities::member::Model>, ClaimstoneError> {
    Ok(entities::Member::find_by_id(id).one(db).await?)
}

/// Substring search across first and last name.
pub async fn list_members(
    db: &DatabaseConnection,
    name_query: Option<&str>,
    page: u64,
    per_page: u64,
) -> Result<Page<entities::member::Model>, ClaimstoneError> {
    use entities::member::{Column, Entity};

    let mut query = Entity::find().order_by_asc(Column::Id);
    if let Some(q) = name_query {
        if !q.is_empty() {
            query = query.filter(
                Condition::any()
                    .add(Column::FirstName.contains(q))
                    .add(Column::LastName.contains(q)),
            );
        }
    }

    let per_page = page_size(per_page);
    let paginator = query.paginate(db, per_page);
    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(page).await?;
    Ok(Page {
        items,
        total,
        page,
        per_page,
    })
}

/// Members are soft-deactivated, never deleted.
pub async fn set_member_active(
    db: &DatabaseConnection,
    id: i64,
    active: bool,
) -> Result<(), ClaimstoneError> {
    let member = get_member(db, id)
        .await?
        .ok_or_else(|| ClaimstoneError::NotFound(format!("member {id}")))?;

    let mut active_model: entities::member::ActiveModel = member.into();
    active_model.active = Set(if active { 1 } else { 0 });
    active_model.update(db).await?;
    Ok(())
}

// Insurer functions

pub async fn create_insurer(
    db: &DatabaseConnection,
    input: NewInsurer,
) -> Result<entities::insurer::Model, ClaimstoneError> {
    let insurer = entities::insurer::ActiveModel {
        name: Set(input.name),
        license_no: Set(input.license_no),
        contact_email: Set(input.contact_email),
        created_at: Set(Utc::now().timestamp()),
        ..Default::default()
    };
    Ok(insurer.insert(db).await?)
}

pub async fn get_insurer(
    db: &DatabaseConnection,
    id: i64,
) -> Result<Option<entities::insurer::Model>, ClaimstoneError> {
    Ok(entities::Insurer::find_by_id(id).one(db).await?)
}

pub async fn list_insurers(
    db: &DatabaseConnection,
    page: u64,
    per_page: u64,
) -> Result<Page<entities::insurer::Model>, ClaimstoneError> {
    use entities::insurer::{Column, Entity};

    let per_page = page_size(per_page);
    let paginator = Entity::find()
        .order_by_asc(Column::Id)
        .paginate(db, per_page);
    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(page).await?;
    Ok(Page {
        items,
        total,
        page,
        per_page,
    })
}

// Provider functions

pub async fn create_provider(
    db: &DatabaseConnection,
    input: NewProvider,
) -> Result<entities::provider::Model, ClaimstoneError> {
    let provider = entities::provider::ActiveModel {
        name: Set(input.name),
        provider_type: Set(input.provider_type),
        contact_email: Set(input.contact_email),
        created_at: Set(Utc::now().timestamp()),
        ..Default::default()
    };
    Ok(provider.insert(db).await?)
}

pub async fn get_provider(
    db: &DatabaseConnection,
    id: i64,
) -> Result<Option<entities::provider::Model>, ClaimstoneError> {
    Ok(entities::Provider::find_by_id(id).one(db).await?)
}

pub async fn list_providers(
    db: &DatabaseConnection,
    name_query: Option<&str>,
    page: u64,
    per_page: u64,
) -> Result<Page<entities::provider::Model>, ClaimstoneError> {
    use entities::provider::{Column, Entity};

    let mut query = Entity::find().order_by_asc(Column::Id);
    if let Some(q) = name_query {
        if !q.is_empty() {
            query = query.filter(Column::Name.contains(q));
        }
    }

    let per_page = page_size(per_page);
    let paginator = query.paginate(db, per_page);
    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(page).await?;
    Ok(Page {
        items,
        total,
        page,
        per_page,
    })
}

// Benefit package functions

pub async fn create_benefit_package(
    db: &DatabaseConnection,
    input: NewBenefitPackage,
) -> Result<entities::benefit_package::Model, ClaimstoneError> {
    let package = entities::benefit_package::ActiveModel {
        name: Set(input.name),
        annual_limit: Set(input.annual_limit),
        description: Set(input.description),
        ..Default::default()
    };
    Ok(package.insert(db).await?)
}

pub async fn get_benefit_package(
    db: &DatabaseConnection,
    id: i64,
) -> Result<Option<entities::benefit_package::Model>, ClaimstoneError> {
    Ok(entities::BenefitPackage::find_by_id(id).one(db).await?)
}

pub async fn list_benefit_packages(
    db: &DatabaseConnection,
) -> Result<Vec<entities::benefit_package::Model>, ClaimstoneError> {
    use entities::benefit_package::{Column, Entity};

    Ok(Entity::find().order_by_asc(Column::Name).all(db).await?)
}

// Policy functions

pub async fn create_policy(
    db: &DatabaseConnection,
    input: NewPolicy,
) -> Result<entities::policy::Model, ClaimstoneError> {
    get_employer(db, input.employer_id)
        .await?
        .ok_or_else(|| ClaimstoneError::NotFound(format!("employer {}", input.employer_id)))?;
    get_insurer(db, input.insurer_id)
        .await?
        .ok_or_else(|| ClaimstoneError::NotFound(format!("insurer {}", input.insurer_id)))?;
    get_benefit_package(db, input.benefit_package_id)
        .await?
        .ok_or_else(|| {
            ClaimstoneError::NotFound(format!("benefit package {}", input.benefit_package_id))
        })?;

    let policy = entities::policy::ActiveModel {
        policy_no: Set(input.policy_no),
        employer_id: Set(input.employer_id),
        insurer_id: Set(input.insurer_id),
        benefit_package_id: Set(input.benefit_package_id),
        start_date: Set(input.start_date),
        end_date: Set(input.end_date),
        status: Set(policy_status::ACTIVE.to_string()),
        created_at: Set(Utc::now().timestamp()),
        ..Default::default()
    };
    Ok(policy.insert(db).await?)
}

pub async fn get_policy(
    db: &DatabaseConnection,
    id: i64,
) -> Result<Option<entities::policy::Model>, ClaimstoneError> {
    Ok(entities::Policy::find_by_id(id).one(db).await?)
}

pub async fn list_policies(
    db: &DatabaseConnection,
    employer_id: Option<i64>,
    page: u64,
    per_page: u64,
) -> Result<Page<entities::policy::Model>, ClaimstoneError> {
    use entities::policy::{Column, Entity};

    let mut query = Entity::find().order_by_asc(Column::Id);
    if let Some(employer_id) = employer_id {
        query = query.filter(Column::EmployerId.eq(employer_id));
    }

    let per_page = page_size(per_page);
    let paginator = query.paginate(db, per_page);
    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(page).await?;
    Ok(Page {
        items,
        total,
        page,
        per_page,
    })
}

pub async fn set_policy_status(
    db: &DatabaseConnection,
    id: i64,
    status: &str,
) -> Result<entities::policy::Model, ClaimstoneError> {
    if ![
        policy_status::ACTIVE,
        policy_status::SUSPENDED,
        policy_status::EXPIRED,
    ]
    .contains(&status)
    {
        return Err(ClaimstoneError::BadRequest(format!(
            "invalid policy status `{status}`"
        )));
    }

    let policy = get_policy(db, id)
        .await?
        .ok_or_else(|| ClaimstoneError::NotFound(format!("policy {id}")))?;

    let mut active: entities::policy::ActiveModel = policy.into();
    active.status = Set(status.to_string());
    Ok(active.update(db).await?)
}

// Claim functions

pub async fn submit_claim(
    db: &DatabaseConnection,
    input: NewClaim,
) -> Result<entities::claim::Model, ClaimstoneError> {
    if input.amount <= 0 {
        return Err(ClaimstoneError::BadRequest(
            "claim amount must be positive".to_string(),
        ));
    }

    let member = get_member(db, input.member_id)
        .await?
        .ok_or_else(|| ClaimstoneError::NotFound(format!("member {}", input.member_id)))?;
    if member.active != 1 {
        return Err(ClaimstoneError::Conflict(format!(
            "member {} is inactive",
            member.member_no
        )));
    }
    get_provider(db, input.provider_id)
        .await?
        .ok_or_else(|| ClaimstoneError::NotFound(format!("provider {}", input.provider_id)))?;
    let policy = get_policy(db, input.policy_id)
        .await?
        .ok_or_else(|| ClaimstoneError::NotFound(format!("policy {}", input.policy_id)))?;
    if policy.status != policy_status::ACTIVE {
        return Err(ClaimstoneError::Conflict(format!(
            "policy {} is not active",
            policy.policy_no
        )));
    }

    let claim_no = next_claim_number(db).await?;
    let claim = entities::claim::ActiveModel {
        claim_no: Set(claim_no),
        member_id: Set(input.member_id),
        provider_id: Set(input.provider_id),
        policy_id: Set(input.policy_id),
        amount: Set(input.amount),
        status: Set(claim_status::SUBMITTED.to_string()),
        incident_date: Set(input.incident_date),
        submitted_at: Set(Utc::now().timestamp()),
        decided_at: Set(None),
        decided_by: Set(None),
        rejection_reason: Set(None),
        ..Default::default()
    };
    Ok(claim.insert(db).await?)
}

pub async fn get_claim(
    db: &DatabaseConnection,
    id: i64,
) -> Result<Option<entities::claim::Model>, ClaimstoneError> {
    Ok(entities::Claim::find_by_id(id).one(db).await?)
}

pub async fn list_claims(
    db: &DatabaseConnection,
    status: Option<&str>,
    member_id: Option<i64>,
    page: u64,
    per_page: u64,
) -> Result<Page<entities::claim::Model>, ClaimstoneError> {
    use entities::claim::{Column, Entity};

    let mut query = Entity::find().order_by_asc(Column::Id);
    if let Some(status) = status {
        query = query.filter(Column::Status.eq(status));
    }
    if let Some(member_id) = member_id {
        query = query.filter(Column::MemberId.eq(member_id));
    }

    let per_page = page_size(per_page);
    let paginator = query.paginate(db, per_page);
    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(page).await?;
    Ok(Page {
        items,
        total,
        page,
        per_page,
    })
}

async fn decide_claim(
    db: &DatabaseConnection,
    id: i64,
    new_status: &str,
    decided_by: &str,
    rejection_reason: Option<String>,
) -> Result<entities::claim::Model, ClaimstoneError> {
    let claim = get_claim(db, id)
        .await?
        .ok_or_else(|| ClaimstoneError::NotFound(format!("claim {id}")))?;

    if claim.status != claim_status::SUBMITTED {
        return Err(ClaimstoneError::Conflict(format!(
            "claim {} is {}, only submitted claims can be decided",
            claim.claim_no, claim.status
        )));
    }

    let mut active: entities::claim::ActiveModel = claim.into();
    active.status = Set(new_status.to_string());
    active.decided_at = Set(Some(Utc::now().timestamp()));
    active.decided_by = Set(Some(decided_by.to_string()));
    active.rejection_reason = Set(rejection_reason);
    Ok(active.update(db).await?)
}

pub async fn approve_claim(
    db: &DatabaseConnection,
    id: i64,
    decided_by: &str,
) -> Result<entities::claim::Model, ClaimstoneError> {
    decide_claim(db, id, claim_status::APPROVED, decided_by, None).await
}

pub async fn reject_claim(
    db: &DatabaseConnection,
    id: i64,
    decided_by: &str,
    reason: String,
) -> Result<entities::claim::Model, ClaimstoneError> {
    decide_claim(db, id, claim_status::REJECTED, decided_by, Some(reason)).await
}

// Pre-approval functions

pub async fn create_preapproval(
    db: &DatabaseConnection,
    input: NewPreapproval,
) -> Result<entities::preapproval::Model, ClaimstoneError> {
    if input.requested_amount <= 0 {
        return Err(ClaimstoneError::BadRequest(
            "requested amount must be positive".to_string(),
        ));
    }
    get_member(db, input.member_id)
        .await?
        .ok_or_else(|| ClaimstoneError::NotFound(format!("member {}", input.member_id)))?;
    get_provider(db, input.provider_id)
        .await?
        .ok_or_else(|| ClaimstoneError::NotFound(format!("provider {}", input.provider_id)))?;

    let preapproval = entities::preapproval::ActiveModel {
        member_id: Set(input.member_id),
        provider_id: Set(input.provider_id),
        requested_amount: Set(input.requested_amount),
        status: Set(preapproval_status::PENDING.to_string()),
        requested_at: Set(Utc::now().timestamp()),
        decided_at: Set(None),
        decided_by: Set(None),
        ..Default::default()
    };
    Ok(preapproval.insert(db).await?)
}

pub async fn list_preapprovals(
    db: &DatabaseConnection,
    status: Option<&str>,
    page: u64,
    per_page: u64,
) -> Result<Page<entities::preapproval::Model>, ClaimstoneError> {
    use entities::preapproval::{Column, Entity};

    let mut query = Entity::find().order_by_asc(Column::Id);
    if let Some(status) = status {
        query = query.filter(Column::Status.eq(status));
    }

    let per_page = page_size(per_page);
    let paginator = query.paginate(db, per_page);
    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(page).await?;
    Ok(Page {
        items,
        total,
        page,
        per_page,
    })
}

pub async fn decide_preapproval(
    db: &DatabaseConnection,
    id: i64,
    granted: bool,
    decided_by: &str,
) -> Result<entities::preapproval::Model, ClaimstoneError> {
    let preapproval = entities::Preapproval::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| ClaimstoneError::NotFound(format!("preapproval {id}")))?;

    if preapproval.status != preapproval_status::PENDING {
        return Err(ClaimstoneError::Conflict(format!(
            "preapproval {} already decided",
            id
        )));
    }

    let mut active: entities::preapproval::ActiveModel = preapproval.into();
    active.status = Set(if granted {
        preapproval_status::GRANTED.to_string()
    } else {
        preapproval_status::DENIED.to_string()
    });
    active.decided_at = Set(Some(Utc::now().timestamp()));
    active.decided_by = Set(Some(decided_by.to_string()));
    Ok(active.update(db).await?)
}

// Visit functions

pub async fn create_visit(
    db: &DatabaseConnection,
    input: NewVisit,
) -> Result<entities::visit::Model, ClaimstoneError> {
    get_member(db, input.member_id)
        .await?
        .ok_or_else(|| ClaimstoneError::NotFound(format!("member {}", input.member_id)))?;
    get_provider(db, input.provider_id)
        .await?
        .ok_or_else(|| ClaimstoneError::NotFound(format!("provider {}", input.provider_id)))?;
    if let Some(claim_id) = input.claim_id {
        get_claim(db, claim_id)
            .await?
            .ok_or_else(|| ClaimstoneError::NotFound(format!("claim {claim_id}")))?;
    }

    let visit = entities::visit::ActiveModel {
        member_id: Set(input.member_id),
        provider_id: Set(input.provider_id),
        visit_date: Set(input.visit_date),
        diagnosis: Set(input.diagnosis),
        claim_id: Set(input.claim_id),
        ..Default::default()
    };
    Ok(visit.insert(db).await?)
}

pub async fn list_visits(
    db: &DatabaseConnection,
    member_id: Option<i64>,
    page: u64,
    per_page: u64,
) -> Result<Page<entities::visit::Model>, ClaimstoneError> {
    use entities::visit::{Column, Entity};

    let mut query = Entity::find().order_by_asc(Column::Id);
    if let Some(member_id) = member_id {
        query = query.filter(Column::MemberId.eq(member_id));
    }

    let per_page = page_size(per_page);
    let paginator = query.paginate(db, per_page);
    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(page).await?;
    Ok(Page {
        items,
        total,
        page,
        per_page,
    })
}

// Settlement functions

/// Pay out an approved claim. Runs in a transaction: the settlement row and
/// the claim's SETTLED status commit together or not at all. The claim is
/// re-read under a row lock inside the transaction, so a concurrent settle
/// of the same claim waits here and then sees SETTLED, turning the second
/// attempt into a conflict instead of a unique-index violation. Early
/// returns roll the transaction back on drop.
pub async fn settle_claim(
    db: &DatabaseConnection,
    claim_id: i64,
    amount: i64,
    reference: &str,
) -> Result<entities::settlement::Model, ClaimstoneError> {
    let txn = db.begin().await?;

    let claim = entities::Claim::find_by_id(claim_id)
        .lock_exclusive()
        .one(&txn)
        .await?
        .ok_or_else(|| ClaimstoneError::NotFound(format!("claim {claim_id}")))?;

    if claim.status != claim_status::APPROVED {
        return Err(ClaimstoneError::Conflict(format!(
            "claim {} is {}, only approved claims can be settled",
            claim.claim_no, claim.status
        )));
    }
    if amount <= 0 || amount > claim.amount {
        return Err(ClaimstoneError::BadRequest(format!(
            "settlement amount must be positive and at most the approved amount ({})",
            claim.amount
        )));
    }

    let settlement = entities::settlement::ActiveModel {
        claim_id: Set(claim_id),
        amount: Set(amount),
        settled_at: Set(Utc::now().timestamp()),
        reference: Set(reference.to_string()),
        ..Default::default()
    };
    let settlement = settlement.insert(&txn).await?;

    let mut active: entities::claim::ActiveModel = claim.into();
    active.status = Set(claim_status::SETTLED.to_string());
    active.update(&txn).await?;

    txn.commit().await?;
    Ok(settlement)
}

pub async fn get_settlement_for_claim(
    db: &DatabaseConnection,
    claim_id: i64,
) -> Result<Option<entities::settlement::Model>, ClaimstoneError> {
    use entities::settlement::{Column, Entity};

    Ok(Entity::find()
        .filter(Column::ClaimId.eq(claim_id))
        .one(db)
        .await?)
}

pub async fn list_settlements(
    db: &DatabaseConnection,
    page: u64,
    per_page: u64,
) -> Result<Page<entities::settlement::Model>, ClaimstoneError> {
    use entities::settlement::{Column, Entity};

    let per_page = page_size(per_page);
    let paginator = Entity::find()
        .order_by_asc(Column::Id)
        .paginate(db, per_page);
    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(page).await?;
    Ok(Page {
        items,
        total,
        page,
        per_page,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::{authorize, materialize, Decision, Requirement};
    use migration::{Migrator, MigratorTrait};
    use tempfile::NamedTempFile;

    struct TestDb {
        connection: DatabaseConnection,
        _temp_file: NamedTempFile,
    }

    impl TestDb {
        async fn new() -> Self {
            let temp_file = NamedTempFile::new().expect("Failed to create temp file");
            let db_path = temp_file.path().to_str().expect("Invalid temp file path");
            let db_url = format!("sqlite://{}?mode=rwc", db_path);

            let connection = Database::connect(&db_url)
                .await
                .expect("Failed to connect to test database");

            Migrator::up(&connection, None)
                .await
                .expect("Failed to run migrations");

            Self {
                connection,
                _temp_file: temp_file,
            }
        }

        fn connection(&self) -> &DatabaseConnection {
            &self.connection
        }
    }

    async fn fixture_employer(db: &DatabaseConnection) -> entities::employer::Model {
        create_employer(
            db,
            NewEmployer {
                name: "Acme Logistics".to_string(),
                registration_no: "REG-100".to_string(),
                contact_email: None,
            },
        )
        .await
        .expect("Failed to create employer")
    }

    async fn fixture_claim(db: &DatabaseConnection) -> entities::claim::Model {
        let employer = fixture_employer(db).await;
        let member = create_member(
            db,
            NewMember {
                employer_id: employer.id,
                first_name: "Amina".to_string(),
                last_name: "Diallo".to_string(),
                date_of_birth: Some("1990-04-12".to_string()),
            },
        )
        .await
        .expect("Failed to create member");
        let provider = create_provider(
            db,
            NewProvider {
                name: "City Clinic".to_string(),
                provider_type: "CLINIC".to_string(),
                contact_email: None,
            },
        )
        .await
        .expect("Failed to create provider");
        let insurer = create_insurer(
            db,
            NewInsurer {
                name: "Crestline Assurance".to_string(),
                license_no: "LIC-9".to_string(),
                contact_email: None,
            },
        )
        .await
        .expect("Failed to create insurer");
        let package = create_benefit_package(
            db,
            NewBenefitPackage {
                name: "Standard".to_string(),
                annual_limit: 5_000_00,
                description: None,
            },
        )
        .await
        .expect("Failed to create benefit package");
        let policy = create_policy(
            db,
            NewPolicy {
                policy_no: "POL-1".to_string(),
                employer_id: employer.id,
                insurer_id: insurer.id,
                benefit_package_id: package.id,
                start_date: "2026-01-01".to_string(),
                end_date: "2026-12-31".to_string(),
            },
        )
        .await
        .expect("Failed to create policy");

        submit_claim(
            db,
            NewClaim {
                member_id: member.id,
                provider_id: provider.id,
                policy_id: policy.id,
                amount: 120_00,
                incident_date: "2026-03-05".to_string(),
            },
        )
        .await
        .expect("Failed to submit claim")
    }

    // ========================================================================
    // User Management Tests
    // ========================================================================

    #[tokio::test]
    async fn test_create_user() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let user = create_user(db, "testuser", "password123", None)
            .await
            .expect("Failed to create user");

        assert_eq!(user.username, "testuser");
        assert!(!user.password_hash.is_empty());
        // Verify it's Argon2 hash format
        assert!(user.password_hash.starts_with("$argon2"));
        assert_eq!(user.enabled, 1);
    }

    #[tokio::test]
    async fn test_verify_user_password() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let created = create_user(db, "testuser", "password123", None)
            .await
            .expect("Failed to create user");

        let verified = verify_user_password(db, "testuser", "password123")
            .await
            .expect("Failed to verify password")
            .expect("Verification failed");
        assert_eq!(verified.id, created.id);

        let wrong = verify_user_password(db, "testuser", "wrong")
            .await
            .expect("Failed to verify password");
        assert!(wrong.is_none());
    }

    #[tokio::test]
    async fn test_disabled_user_cannot_authenticate() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let user = create_user(db, "testuser", "password123", None)
            .await
            .expect("Failed to create user");
        set_user_enabled(db, user.id, false)
            .await
            .expect("Failed to disable user");

        let result = verify_user_password(db, "testuser", "password123")
            .await
            .expect("Failed to verify password");
        assert!(result.is_none());
    }

    // ========================================================================
    // Role / Permission Graph Tests
    // ========================================================================

    #[tokio::test]
    async fn test_role_graph_round_trip() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let user = create_user(db, "reviewer", "pw", None)
            .await
            .expect("Failed to create user");
        let role = create_role(db, "CLAIMS_REVIEWER", None)
            .await
            .expect("Failed to create role");
        let permission = create_permission(db, "CLAIMS_APPROVE", None)
            .await
            .expect("Failed to create permission");

        grant_permission(db, role.id, permission.id)
            .await
            .expect("Failed to grant permission");
        assign_role(db, user.id, role.id)
            .await
            .expect("Failed to assign role");

        let graph = user_role_graph(db, user.id)
            .await
            .expect("Failed to read graph");
        let set = materialize(&graph);
        assert!(set.has_role("CLAIMS_REVIEWER"));
        assert!(set.has_permission("CLAIMS_APPROVE"));

        // Revoke and re-materialize: the fresh snapshot no longer carries it.
        revoke_permission(db, role.id, permission.id)
            .await
            .expect("Failed to revoke permission");
        let graph = user_role_graph(db, user.id)
            .await
            .expect("Failed to read graph");
        let set = materialize(&graph);
        assert!(set.has_role("CLAIMS_REVIEWER"));
        assert!(!set.has_permission("CLAIMS_APPROVE"));
    }

    #[tokio::test]
    async fn test_user_with_no_roles_has_empty_graph() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let user = create_user(db, "lonely", "pw", None)
            .await
            .expect("Failed to create user");
        let graph = user_role_graph(db, user.id)
            .await
            .expect("Failed to read graph");
        assert!(graph.is_empty());
        assert!(materialize(&graph).is_empty());
    }

    #[tokio::test]
    async fn test_assign_and_grant_are_idempotent() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let user = create_user(db, "u", "pw", None).await.expect("user");
        let role = create_role(db, "R", None).await.expect("role");
        let permission = create_permission(db, "P", None).await.expect("permission");

        assign_role(db, user.id, role.id).await.expect("assign");
        assign_role(db, user.id, role.id).await.expect("re-assign");
        grant_permission(db, role.id, permission.id)
            .await
            .expect("grant");
        grant_permission(db, role.id, permission.id)
            .await
            .expect("re-grant");

        let graph = user_role_graph(db, user.id).await.expect("graph");
        assert_eq!(graph.len(), 1);
        assert_eq!(graph[0].permissions, vec!["P".to_string()]);
    }

    #[tokio::test]
    async fn test_seed_rbac_is_idempotent() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        seed_rbac(db, "bootstrap-pw").await.expect("first seed");
        seed_rbac(db, "bootstrap-pw").await.expect("second seed");

        let admin = get_user_by_username(db, "admin")
            .await
            .expect("query admin")
            .expect("admin exists");
        let graph = user_role_graph(db, admin.id).await.expect("graph");
        let set = materialize(&graph);
        assert!(set.has_role(SUPERUSER_ROLE));
        assert!(set.has_permission(permissions::CLAIMS_APPROVE));

        let catalog = rbac_catalog(db).await.expect("catalog");
        assert!(catalog.knows_role(catalog::roles::CLAIMS_REVIEWER));
        assert!(catalog.knows_permission(permissions::FINANCE_SETTLE));

        // Exactly one row per built-in permission despite the double seed.
        assert_eq!(
            list_permissions(db).await.expect("permissions").len(),
            permissions::ALL.len()
        );
    }

    #[tokio::test]
    async fn test_seeded_reviewer_authorizes_claims_approve() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        seed_rbac(db, "bootstrap-pw").await.expect("seed");

        let user = create_user(db, "reviewer", "pw", None).await.expect("user");
        let role = get_role_by_name(db, catalog::roles::CLAIMS_REVIEWER)
            .await
            .expect("query role")
            .expect("seeded role");
        assign_role(db, user.id, role.id).await.expect("assign");

        let set = materialize(&user_role_graph(db, user.id).await.expect("graph"));
        let catalog = rbac_catalog(db).await.expect("catalog");

        assert_eq!(
            authorize(
                &set,
                &Requirement::permission(permissions::CLAIMS_APPROVE),
                &catalog
            ),
            Decision::Allow
        );
        assert!(!authorize(
            &set,
            &Requirement::permission(permissions::FINANCE_SETTLE),
            &catalog
        )
        .is_allow());
    }

    // ========================================================================
    // Number Generator Tests
    // ========================================================================

    #[tokio::test]
    async fn test_number_generators_format_and_sequence() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let year = Utc::now().format("%Y").to_string();

        let first = next_claim_number(db).await.expect("first claim number");
        let second = next_claim_number(db).await.expect("second claim number");
        assert_eq!(first, format!("CLM-{year}-000001"));
        assert_eq!(second, format!("CLM-{year}-000002"));

        // Member numbers run on their own counter.
        let member = next_member_number(db).await.expect("member number");
        assert_eq!(member, format!("MBR-{year}-000001"));
    }

    #[tokio::test]
    async fn test_concurrent_claim_numbers_are_unique() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        // Warm the counter row so every task takes the increment path.
        next_claim_number(db).await.expect("first claim number");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let db = db.clone();
            handles.push(tokio::spawn(
                async move { next_claim_number(&db).await },
            ));
        }

        let mut numbers = Vec::new();
        for handle in handles {
            numbers.push(handle.await.expect("task panicked").expect("claim number"));
        }

        let mut unique = numbers.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), numbers.len(), "duplicate numbers: {numbers:?}");
    }

    // ========================================================================
    // Employer / Member Tests
    // ========================================================================

    #[tokio::test]
    async fn test_employer_search_and_pagination() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        for (i, name) in ["Acme Logistics", "Acme Mining", "Harbor Foods"]
            .iter()
            .enumerate()
        {
            create_employer(
                db,
                NewEmployer {
                    name: name.to_string(),
                    registration_no: format!("REG-{i}"),
                    contact_email: None,
                },
            )
            .await
            .expect("Failed to create employer");
        }

        let all = list_employers(db, None, 0, 10).await.expect("list");
        assert_eq!(all.total, 3);

        let acme = list_employers(db, Some("Acme"), 0, 10).await.expect("search");
        assert_eq!(acme.total, 2);

        let paged = list_employers(db, None, 1, 2).await.expect("page");
        assert_eq!(paged.total, 3);
        assert_eq!(paged.items.len(), 1);
    }

    #[tokio::test]
    async fn test_page_size_is_clamped() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        fixture_employer(db).await;

        // A zero page size would make fetch_page divide by zero.
        let floor = list_employers(db, None, 0, 0).await.expect("list");
        assert_eq!(floor.per_page, 1);
        assert_eq!(floor.items.len(), 1);

        // Oversized requests are capped rather than honored.
        let capped = list_employers(db, None, 0, u64::MAX).await.expect("list");
        assert_eq!(capped.per_page, MAX_PAGE_SIZE);
    }

    #[tokio::test]
    async fn test_member_gets_generated_number_and_name_search() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let employer = fixture_employer(db).await;
        let member = create_member(
            db,
            NewMember {
                employer_id: employer.id,
                first_name: "Amina".to_string(),
                last_name: "Diallo".to_string(),
                date_of_birth: None,
            },
        )
        .await
        .expect("Failed to create member");

        assert!(member.member_no.starts_with("MBR-"));
        assert_eq!(member.active, 1);

        let hits = list_members(db, Some("Dia"), 0, 10).await.expect("search");
        assert_eq!(hits.total, 1);
        let misses = list_members(db, Some("Okafor"), 0, 10).await.expect("search");
        assert_eq!(misses.total, 0);
    }

    #[tokio::test]
    async fn test_member_for_unknown_employer_rejected() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let result = create_member(
            db,
            NewMember {
                employer_id: 999,
                first_name: "A".to_string(),
                last_name: "B".to_string(),
                date_of_birth: None,
            },
        )
        .await;
        assert!(matches!(result, Err(ClaimstoneError::NotFound(_))));
    }

    // ========================================================================
    // Claim Lifecycle Tests
    // ========================================================================

    #[tokio::test]
    async fn test_claim_submit_approve_settle_flow() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let claim = fixture_claim(db).await;
        assert!(claim.claim_no.starts_with("CLM-"));
        assert_eq!(claim.status, claim_status::SUBMITTED);

        let approved = approve_claim(db, claim.id, "reviewer")
            .await
            .expect("Failed to approve claim");
        assert_eq!(approved.status, claim_status::APPROVED);
        assert_eq!(approved.decided_by.as_deref(), Some("reviewer"));
        assert!(approved.decided_at.is_some());

        let settlement = settle_claim(db, claim.id, 100_00, "PAY-77")
            .await
            .expect("Failed to settle claim");
        assert_eq!(settlement.amount, 100_00);

        let settled = get_claim(db, claim.id)
            .await
            .expect("query claim")
            .expect("claim exists");
        assert_eq!(settled.status, claim_status::SETTLED);

        let found = get_settlement_for_claim(db, claim.id)
            .await
            .expect("query settlement")
            .expect("settlement exists");
        assert_eq!(found.reference, "PAY-77");
    }

    #[tokio::test]
    async fn test_claim_cannot_be_decided_twice() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let claim = fixture_claim(db).await;
        approve_claim(db, claim.id, "reviewer")
            .await
            .expect("Failed to approve claim");

        let again = approve_claim(db, claim.id, "reviewer").await;
        assert!(matches!(again, Err(ClaimstoneError::Conflict(_))));

        let reject = reject_claim(db, claim.id, "reviewer", "late".to_string()).await;
        assert!(matches!(reject, Err(ClaimstoneError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_settle_requires_approved_claim() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let claim = fixture_claim(db).await;
        let result = settle_claim(db, claim.id, 100_00, "PAY-1").await;
        assert!(matches!(result, Err(ClaimstoneError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_settle_twice_conflicts() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let claim = fixture_claim(db).await;
        approve_claim(db, claim.id, "reviewer")
            .await
            .expect("Failed to approve claim");
        settle_claim(db, claim.id, 100_00, "PAY-1")
            .await
            .expect("Failed to settle claim");

        // The claim is SETTLED once the first settlement commits, so a second
        // attempt fails the status check rather than the unique index.
        let again = settle_claim(db, claim.id, 100_00, "PAY-2").await;
        assert!(matches!(again, Err(ClaimstoneError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_settlement_cannot_exceed_claim_amount() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let claim = fixture_claim(db).await;
        approve_claim(db, claim.id, "reviewer")
            .await
            .expect("Failed to approve claim");

        let result = settle_claim(db, claim.id, claim.amount + 1, "PAY-1").await;
        assert!(matches!(result, Err(ClaimstoneError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_rejected_claim_records_reason() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let claim = fixture_claim(db).await;
        let rejected = reject_claim(db, claim.id, "reviewer", "duplicate submission".to_string())
            .await
            .expect("Failed to reject claim");

        assert_eq!(rejected.status, claim_status::REJECTED);
        assert_eq!(
            rejected.rejection_reason.as_deref(),
            Some("duplicate submission")
        );
    }

    #[tokio::test]
    async fn test_claim_filters() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let claim = fixture_claim(db).await;
        approve_claim(db, claim.id, "reviewer")
            .await
            .expect("Failed to approve claim");

        let submitted = list_claims(db, Some(claim_status::SUBMITTED), None, 0, 10)
            .await
            .expect("list");
        assert_eq!(submitted.total, 0);

        let approved = list_claims(db, Some(claim_status::APPROVED), None, 0, 10)
            .await
            .expect("list");
        assert_eq!(approved.total, 1);

        let by_member = list_claims(db, None, Some(claim.member_id), 0, 10)
            .await
            .expect("list");
        assert_eq!(by_member.total, 1);
    }

    #[tokio::test]
    async fn test_inactive_member_cannot_submit_claim() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let claim = fixture_claim(db).await;
        set_member_active(db, claim.member_id, false)
            .await
            .expect("Failed to deactivate member");

        let result = submit_claim(
            db,
            NewClaim {
                member_id: claim.member_id,
                provider_id: claim.provider_id,
                policy_id: claim.policy_id,
                amount: 50_00,
                incident_date: "2026-03-06".to_string(),
            },
        )
        .await;
        assert!(matches!(result, Err(ClaimstoneError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_suspended_policy_blocks_claims() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let claim = fixture_claim(db).await;
        set_policy_status(db, claim.policy_id, policy_status::SUSPENDED)
            .await
            .expect("Failed to suspend policy");

        let result = submit_claim(
            db,
            NewClaim {
                member_id: claim.member_id,
                provider_id: claim.provider_id,
                policy_id: claim.policy_id,
                amount: 50_00,
                incident_date: "2026-03-06".to_string(),
            },
        )
        .await;
        assert!(matches!(result, Err(ClaimstoneError::Conflict(_))));
    }

    // ========================================================================
    // Pre-approval & Visit Tests
    // ========================================================================

    #[tokio::test]
    async fn test_preapproval_decision_flow() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let claim = fixture_claim(db).await;
        let preapproval = create_preapproval(
            db,
            NewPreapproval {
                member_id: claim.member_id,
                provider_id: claim.provider_id,
                requested_amount: 300_00,
            },
        )
        .await
        .expect("Failed to create preapproval");
        assert_eq!(preapproval.status, preapproval_status::PENDING);

        let granted = decide_preapproval(db, preapproval.id, true, "reviewer")
            .await
            .expect("Failed to decide preapproval");
        assert_eq!(granted.status, preapproval_status::GRANTED);

        let again = decide_preapproval(db, preapproval.id, false, "reviewer").await;
        assert!(matches!(again, Err(ClaimstoneError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_visit_links_to_claim() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let claim = fixture_claim(db).await;
        let visit = create_visit(
            db,
            NewVisit {
                member_id: claim.member_id,
                provider_id: claim.provider_id,
                visit_date: "2026-03-05".to_string(),
                diagnosis: Some("sprained ankle".to_string()),
                claim_id: Some(claim.id),
            },
        )
        .await
        .expect("Failed to create visit");
        assert_eq!(visit.claim_id, Some(claim.id));

        let visits = list_visits(db, Some(claim.member_id), 0, 10)
            .await
            .expect("list visits");
        assert_eq!(visits.total, 1);
    }
}
