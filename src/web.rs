//! HTTP surface. Every handler authenticates the bearer token itself, then
//! runs its requirement through the evaluator before touching storage. The
//! authorization check uses only the authority snapshot carried by the token;
//! the database is consulted for data, never for permission lookups.
use crate::authz::catalog::{permissions, roles, Catalog};
use crate::authz::{authorize, materialize, AuditRecord, AuditSink, DbAuditSink, Decision, DenyReason, Requirement};
use crate::errors::ClaimstoneError;
use crate::jwks::{JwksManager, VerifiedToken};
use crate::settings::Settings;
use crate::storage;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use miette::IntoDiagnostic;
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub db: DatabaseConnection,
    pub jwks: JwksManager,
    /// Snapshot of every known role and permission name, rebuilt after each
    /// RBAC mutation. Read on every authorization check.
    pub catalog: Arc<RwLock<Catalog>>,
    pub audit: Arc<dyn AuditSink>,
}

impl AppState {
    pub async fn build(
        settings: Settings,
        db: DatabaseConnection,
        jwks: JwksManager,
    ) -> Result<Self, ClaimstoneError> {
        let catalog = storage::rbac_catalog(&db).await?;
        Ok(Self {
            settings: Arc::new(settings),
            audit: Arc::new(DbAuditSink::new(db.clone())),
            db,
            jwks,
            catalog: Arc::new(RwLock::new(catalog)),
        })
    }
}

// API hardening headers
async fn security_headers(request: Request<Body>, next: Next) -> impl IntoResponse {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    // Responses carry tokens and personal data; nothing is cacheable.
    headers.insert(
        HeaderName::from_static("cache-control"),
        HeaderValue::from_static("no-store"),
    );

    response
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/login", post(login))
        .route("/.well-known/jwks.json", get(jwks_handler))
        .route("/me", get(me))
        .route("/employers", get(list_employers).post(create_employer))
        .route("/employers/{id}", get(get_employer))
        .route("/members", get(list_members).post(create_member))
        .route("/members/{id}", get(get_member))
        .route("/members/{id}/status", post(set_member_status))
        .route("/insurers", get(list_insurers).post(create_insurer))
        .route("/providers", get(list_providers).post(create_provider))
        .route(
            "/benefit-packages",
            get(list_benefit_packages).post(create_benefit_package),
        )
        .route("/policies", get(list_policies).post(create_policy))
        .route("/policies/{id}/status", post(set_policy_status))
        .route("/claims", get(list_claims).post(submit_claim))
        .route("/claims/review-queue", get(claims_review_queue))
        .route("/claims/{id}", get(get_claim))
        .route("/claims/{id}/approve", post(approve_claim))
        .route("/claims/{id}/reject", post(reject_claim))
        .route("/claims/{id}/settle", post(settle_claim))
        .route("/settlements", get(list_settlements))
        .route(
            "/preapprovals",
            get(list_preapprovals).post(create_preapproval),
        )
        .route("/preapprovals/{id}/decide", post(decide_preapproval))
        .route("/visits", get(list_visits).post(create_visit))
        .route("/users", get(list_users).post(create_user))
        .route("/users/{id}/enabled", post(set_user_enabled))
        .route("/users/{id}/roles", post(assign_user_role))
        .route("/users/{id}/roles/{role}", delete(remove_user_role))
        .route("/users/{id}/authorities", get(user_authorities))
        .route("/roles", get(list_roles).post(create_role))
        .route("/roles/{id}/permissions", post(grant_role_permission))
        .route(
            "/roles/{id}/permissions/{permission}",
            delete(revoke_role_permission),
        )
        .route("/permissions", get(list_permissions).post(create_permission))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

pub async fn serve(
    settings: Settings,
    db: DatabaseConnection,
    jwks: JwksManager,
) -> miette::Result<()> {
    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .into_diagnostic()?;

    let state = AppState::build(settings, db, jwks).await?;
    let app = router(state);

    tracing::info!(%addr, "claimstone listening");
    let listener = tokio::net::TcpListener::bind(addr).await.into_diagnostic()?;
    axum::serve(listener, app).await.into_diagnostic()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Authentication and authorization plumbing

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Bearer")],
        Json(json!({ "error": "authentication required" })),
    )
        .into_response()
}

/// Denial bodies are deliberately uniform; the reason lives in the audit
/// trail and the server log, not in the response.
fn forbidden() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({ "error": "access denied" })),
    )
        .into_response()
}

fn error_response(err: ClaimstoneError) -> Response {
    let (status, message) = match &err {
        ClaimstoneError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
        ClaimstoneError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
        ClaimstoneError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        _ => {
            tracing::error!(%err, "request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
        }
    };
    (status, Json(json!({ "error": message }))).into_response()
}

/// Verify the bearer token. Missing, malformed, expired, and unverifiable
/// tokens all get the same 401.
fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<VerifiedToken, Response> {
    let header_value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let token = match header_value.strip_prefix("Bearer ") {
        Some(t) if !t.is_empty() => t,
        _ => return Err(unauthorized()),
    };

    match state.jwks.verify_access_token(token) {
        Ok(verified) => Ok(verified),
        Err(err) => {
            tracing::debug!(%err, "token verification failed");
            Err(unauthorized())
        }
    }
}

fn actor_name(identity: &VerifiedToken) -> String {
    identity
        .username
        .clone()
        .unwrap_or_else(|| identity.subject.clone())
}

/// Evaluate one requirement against the caller's authority snapshot. Every
/// check is audited, allow or deny. An authenticated caller failing the check
/// gets 403; unknown requirement names also land here, logged loudly, because
/// they indicate a misconfigured route rather than a missing credential.
async fn require(
    state: &AppState,
    identity: &VerifiedToken,
    requirement: &Requirement,
    action: &str,
    entity_type: &str,
    entity_id: Option<String>,
) -> Result<(), Response> {
    let decision = {
        let catalog = state.catalog.read().await;
        authorize(&identity.authorities, requirement, &catalog)
    };

    let actor = actor_name(identity);
    state.audit.record(AuditRecord {
        actor: actor.clone(),
        action: action.to_string(),
        entity_type: entity_type.to_string(),
        entity_id,
        decision: decision.audit_label().to_string(),
        recorded_at: Utc::now().timestamp(),
    });

    match decision {
        Decision::Allow => Ok(()),
        Decision::Deny(reason) => {
            if let DenyReason::UnknownName(name) = &reason {
                tracing::warn!(
                    %actor,
                    action,
                    name = %name,
                    "authorization requirement names an unknown role or permission"
                );
            }
            Err(forbidden())
        }
    }
}

/// Reload the role/permission name snapshot after an RBAC mutation.
async fn refresh_catalog(state: &AppState) -> Result<(), Response> {
    match storage::rbac_catalog(&state.db).await {
        Ok(catalog) => {
            *state.catalog.write().await = catalog;
            Ok(())
        }
        Err(err) => Err(error_response(err)),
    }
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    q: Option<String>,
    status: Option<String>,
    member_id: Option<i64>,
    employer_id: Option<i64>,
    #[serde(default)]
    page: u64,
    #[serde(default = "default_per_page")]
    per_page: u64,
}

fn default_per_page() -> u64 {
    20
}

// ---------------------------------------------------------------------------
// Authentication endpoints

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

/// Password login. On success the user's role assignments are expanded into
/// authority tokens and frozen into the issued access token.
async fn login(State(state): State<AppState>, Json(body): Json<LoginRequest>) -> Response {
    let user = match storage::verify_user_password(&state.db, &body.username, &body.password).await
    {
        Ok(Some(user)) => user,
        Ok(None) => {
            state.audit.record(AuditRecord {
                actor: body.username.clone(),
                action: "login".to_string(),
                entity_type: "user".to_string(),
                entity_id: None,
                decision: "DENY".to_string(),
                recorded_at: Utc::now().timestamp(),
            });
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "invalid credentials" })),
            )
                .into_response();
        }
        Err(err) => return error_response(err),
    };

    let graph = match storage::user_role_graph(&state.db, user.id).await {
        Ok(graph) => graph,
        Err(err) => return error_response(err),
    };
    let authorities = materialize(&graph);

    let token = match state.jwks.issue_access_token(
        &state.settings.issuer(),
        &user.id.to_string(),
        &user.username,
        &authorities,
        state.settings.auth.token_ttl_secs,
    ) {
        Ok(token) => token,
        Err(err) => return error_response(err),
    };

    state.audit.record(AuditRecord {
        actor: user.username.clone(),
        action: "login".to_string(),
        entity_type: "user".to_string(),
        entity_id: Some(user.id.to_string()),
        decision: "ALLOW".to_string(),
        recorded_at: Utc::now().timestamp(),
    });

    Json(json!({
        "access_token": token,
        "token_type": "Bearer",
        "expires_in": state.settings.auth.token_ttl_secs,
        "authorities": authorities.to_claims(),
    }))
    .into_response()
}

async fn jwks_handler(State(state): State<AppState>) -> Response {
    Json(state.jwks.jwks_json()).into_response()
}

async fn me(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    Json(json!({
        "subject": identity.subject,
        "username": identity.username,
        "authorities": identity.authorities.to_claims(),
    }))
    .into_response()
}

// ---------------------------------------------------------------------------
// Employers

async fn list_employers(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::EMPLOYERS_VIEW),
        "employers.list",
        "employer",
        None,
    )
    .await
    {
        return resp;
    }
    match storage::list_employers(&state.db, query.q.as_deref(), query.page, query.per_page).await
    {
        Ok(page) => Json(page).into_response(),
        Err(err) => error_response(err),
    }
}

async fn create_employer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<storage::NewEmployer>,
) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::EMPLOYERS_MANAGE),
        "employers.create",
        "employer",
        None,
    )
    .await
    {
        return resp;
    }
    match storage::create_employer(&state.db, body).await {
        Ok(employer) => (StatusCode::CREATED, Json(employer)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn get_employer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::EMPLOYERS_VIEW),
        "employers.get",
        "employer",
        Some(id.to_string()),
    )
    .await
    {
        return resp;
    }
    match storage::get_employer(&state.db, id).await {
        Ok(Some(employer)) => Json(employer).into_response(),
        Ok(None) => error_response(ClaimstoneError::NotFound(format!("employer {id}"))),
        Err(err) => error_response(err),
    }
}

// ---------------------------------------------------------------------------
// Members

async fn list_members(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::MEMBERS_VIEW),
        "members.list",
        "member",
        None,
    )
    .await
    {
        return resp;
    }
    match storage::list_members(&state.db, query.q.as_deref(), query.page, query.per_page).await {
        Ok(page) => Json(page).into_response(),
        Err(err) => error_response(err),
    }
}

async fn create_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<storage::NewMember>,
) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::MEMBERS_MANAGE),
        "members.create",
        "member",
        None,
    )
    .await
    {
        return resp;
    }
    match storage::create_member(&state.db, body).await {
        Ok(member) => (StatusCode::CREATED, Json(member)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn get_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::MEMBERS_VIEW),
        "members.get",
        "member",
        Some(id.to_string()),
    )
    .await
    {
        return resp;
    }
    match storage::get_member(&state.db, id).await {
        Ok(Some(member)) => Json(member).into_response(),
        Ok(None) => error_response(ClaimstoneError::NotFound(format!("member {id}"))),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct MemberStatusRequest {
    active: bool,
}

async fn set_member_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<MemberStatusRequest>,
) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::MEMBERS_MANAGE),
        "members.set_status",
        "member",
        Some(id.to_string()),
    )
    .await
    {
        return resp;
    }
    match storage::set_member_active(&state.db, id, body.active).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

// ---------------------------------------------------------------------------
// Insurers / providers / benefit packages

async fn list_insurers(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::INSURERS_VIEW),
        "insurers.list",
        "insurer",
        None,
    )
    .await
    {
        return resp;
    }
    match storage::list_insurers(&state.db, query.page, query.per_page).await {
        Ok(page) => Json(page).into_response(),
        Err(err) => error_response(err),
    }
}

async fn create_insurer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<storage::NewInsurer>,
) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::INSURERS_MANAGE),
        "insurers.create",
        "insurer",
        None,
    )
    .await
    {
        return resp;
    }
    match storage::create_insurer(&state.db, body).await {
        Ok(insurer) => (StatusCode::CREATED, Json(insurer)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn list_providers(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::PROVIDERS_VIEW),
        "providers.list",
        "provider",
        None,
    )
    .await
    {
        return resp;
    }
    match storage::list_providers(&state.db, query.q.as_deref(), query.page, query.per_page).await
    {
        Ok(page) => Json(page).into_response(),
        Err(err) => error_response(err),
    }
}

async fn create_provider(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<storage::NewProvider>,
) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::PROVIDERS_MANAGE),
        "providers.create",
        "provider",
        None,
    )
    .await
    {
        return resp;
    }
    match storage::create_provider(&state.db, body).await {
        Ok(provider) => (StatusCode::CREATED, Json(provider)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn list_benefit_packages(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::POLICIES_VIEW),
        "benefit_packages.list",
        "benefit_package",
        None,
    )
    .await
    {
        return resp;
    }
    match storage::list_benefit_packages(&state.db).await {
        Ok(packages) => Json(packages).into_response(),
        Err(err) => error_response(err),
    }
}

async fn create_benefit_package(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<storage::NewBenefitPackage>,
) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::POLICIES_MANAGE),
        "benefit_packages.create",
        "benefit_package",
        None,
    )
    .await
    {
        return resp;
    }
    match storage::create_benefit_package(&state.db, body).await {
        Ok(package) => (StatusCode::CREATED, Json(package)).into_response(),
        Err(err) => error_response(err),
    }
}

// ---------------------------------------------------------------------------
// Policies

async fn list_policies(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::POLICIES_VIEW),
        "policies.list",
        "policy",
        None,
    )
    .await
    {
        return resp;
    }
    match storage::list_policies(&state.db, query.employer_id, query.page, query.per_page).await {
        Ok(page) => Json(page).into_response(),
        Err(err) => error_response(err),
    }
}

async fn create_policy(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<storage::NewPolicy>,
) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::POLICIES_MANAGE),
        "policies.create",
        "policy",
        None,
    )
    .await
    {
        return resp;
    }
    match storage::create_policy(&state.db, body).await {
        Ok(policy) => (StatusCode::CREATED, Json(policy)).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct PolicyStatusRequest {
    status: String,
}

async fn set_policy_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<PolicyStatusRequest>,
) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::POLICIES_MANAGE),
        "policies.set_status",
        "policy",
        Some(id.to_string()),
    )
    .await
    {
        return resp;
    }
    match storage::set_policy_status(&state.db, id, &body.status).await {
        Ok(policy) => Json(policy).into_response(),
        Err(err) => error_response(err),
    }
}

// ---------------------------------------------------------------------------
// Claims

async fn submit_claim(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<storage::NewClaim>,
) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::CLAIMS_SUBMIT),
        "claims.submit",
        "claim",
        None,
    )
    .await
    {
        return resp;
    }
    match storage::submit_claim(&state.db, body).await {
        Ok(claim) => (StatusCode::CREATED, Json(claim)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn list_claims(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::CLAIMS_VIEW),
        "claims.list",
        "claim",
        None,
    )
    .await
    {
        return resp;
    }
    match storage::list_claims(
        &state.db,
        query.status.as_deref(),
        query.member_id,
        query.page,
        query.per_page,
    )
    .await
    {
        Ok(page) => Json(page).into_response(),
        Err(err) => error_response(err),
    }
}

/// Work queue for the reviewing roles. Gated on role membership rather than a
/// permission: the queue is shaped for reviewers and finance, not for anyone
/// who merely holds view rights.
async fn claims_review_queue(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::any_role([roles::CLAIMS_REVIEWER, roles::FINANCE_OFFICER]),
        "claims.review_queue",
        "claim",
        None,
    )
    .await
    {
        return resp;
    }
    match storage::list_claims(
        &state.db,
        Some(storage::claim_status::SUBMITTED),
        None,
        query.page,
        query.per_page,
    )
    .await
    {
        Ok(page) => Json(page).into_response(),
        Err(err) => error_response(err),
    }
}

async fn get_claim(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::CLAIMS_VIEW),
        "claims.get",
        "claim",
        Some(id.to_string()),
    )
    .await
    {
        return resp;
    }
    match storage::get_claim(&state.db, id).await {
        Ok(Some(claim)) => Json(claim).into_response(),
        Ok(None) => error_response(ClaimstoneError::NotFound(format!("claim {id}"))),
        Err(err) => error_response(err),
    }
}

async fn approve_claim(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::CLAIMS_APPROVE),
        "claims.approve",
        "claim",
        Some(id.to_string()),
    )
    .await
    {
        return resp;
    }
    match storage::approve_claim(&state.db, id, &actor_name(&identity)).await {
        Ok(claim) => Json(claim).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct RejectClaimRequest {
    reason: String,
}

async fn reject_claim(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<RejectClaimRequest>,
) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::CLAIMS_APPROVE),
        "claims.reject",
        "claim",
        Some(id.to_string()),
    )
    .await
    {
        return resp;
    }
    match storage::reject_claim(&state.db, id, &actor_name(&identity), body.reason).await {
        Ok(claim) => Json(claim).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct SettleClaimRequest {
    amount: i64,
    reference: String,
}

/// Settlement needs both the payout right and claim visibility.
async fn settle_claim(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<SettleClaimRequest>,
) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::all([
            Requirement::permission(permissions::FINANCE_SETTLE),
            Requirement::permission(permissions::CLAIMS_VIEW),
        ]),
        "claims.settle",
        "claim",
        Some(id.to_string()),
    )
    .await
    {
        return resp;
    }
    match storage::settle_claim(&state.db, id, body.amount, &body.reference).await {
        Ok(settlement) => (StatusCode::CREATED, Json(settlement)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn list_settlements(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::FINANCE_VIEW),
        "settlements.list",
        "settlement",
        None,
    )
    .await
    {
        return resp;
    }
    match storage::list_settlements(&state.db, query.page, query.per_page).await {
        Ok(page) => Json(page).into_response(),
        Err(err) => error_response(err),
    }
}

// ---------------------------------------------------------------------------
// Pre-approvals

async fn create_preapproval(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<storage::NewPreapproval>,
) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::CLAIMS_SUBMIT),
        "preapprovals.create",
        "preapproval",
        None,
    )
    .await
    {
        return resp;
    }
    match storage::create_preapproval(&state.db, body).await {
        Ok(preapproval) => (StatusCode::CREATED, Json(preapproval)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn list_preapprovals(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::PREAPPROVALS_VIEW),
        "preapprovals.list",
        "preapproval",
        None,
    )
    .await
    {
        return resp;
    }
    match storage::list_preapprovals(
        &state.db,
        query.status.as_deref(),
        query.page,
        query.per_page,
    )
    .await
    {
        Ok(page) => Json(page).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct DecidePreapprovalRequest {
    granted: bool,
}

async fn decide_preapproval(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<DecidePreapprovalRequest>,
) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::PREAPPROVALS_DECIDE),
        "preapprovals.decide",
        "preapproval",
        Some(id.to_string()),
    )
    .await
    {
        return resp;
    }
    match storage::decide_preapproval(&state.db, id, body.granted, &actor_name(&identity)).await {
        Ok(preapproval) => Json(preapproval).into_response(),
        Err(err) => error_response(err),
    }
}

// ---------------------------------------------------------------------------
// Visits

async fn create_visit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<storage::NewVisit>,
) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::VISITS_MANAGE),
        "visits.create",
        "visit",
        None,
    )
    .await
    {
        return resp;
    }
    match storage::create_visit(&state.db, body).await {
        Ok(visit) => (StatusCode::CREATED, Json(visit)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn list_visits(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::VISITS_VIEW),
        "visits.list",
        "visit",
        None,
    )
    .await
    {
        return resp;
    }
    match storage::list_visits(&state.db, query.member_id, query.page, query.per_page).await {
        Ok(page) => Json(page).into_response(),
        Err(err) => error_response(err),
    }
}

// ---------------------------------------------------------------------------
// User administration

async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::USERS_VIEW),
        "users.list",
        "user",
        None,
    )
    .await
    {
        return resp;
    }
    match storage::list_users(&state.db, query.page, query.per_page).await {
        Ok(page) => {
            // Strip password hashes before serializing.
            let items: Vec<_> = page
                .items
                .into_iter()
                .map(|u| {
                    json!({
                        "id": u.id,
                        "username": u.username,
                        "email": u.email,
                        "enabled": u.enabled == 1,
                        "created_at": u.created_at,
                    })
                })
                .collect();
            Json(json!({
                "items": items,
                "total": page.total,
                "page": page.page,
                "per_page": page.per_page,
            }))
            .into_response()
        }
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct CreateUserRequest {
    username: String,
    password: String,
    email: Option<String>,
}

async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateUserRequest>,
) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::USERS_MANAGE),
        "users.create",
        "user",
        None,
    )
    .await
    {
        return resp;
    }
    match storage::create_user(&state.db, &body.username, &body.password, body.email).await {
        Ok(user) => (
            StatusCode::CREATED,
            Json(json!({ "id": user.id, "username": user.username })),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct UserEnabledRequest {
    enabled: bool,
}

async fn set_user_enabled(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<UserEnabledRequest>,
) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::USERS_MANAGE),
        "users.set_enabled",
        "user",
        Some(id.to_string()),
    )
    .await
    {
        return resp;
    }
    match storage::set_user_enabled(&state.db, id, body.enabled).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct AssignRoleRequest {
    role: String,
}

async fn assign_user_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<AssignRoleRequest>,
) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::USERS_MANAGE),
        "users.assign_role",
        "user",
        Some(id.to_string()),
    )
    .await
    {
        return resp;
    }

    let role = match storage::get_role_by_name(&state.db, &body.role).await {
        Ok(Some(role)) => role,
        Ok(None) => {
            return error_response(ClaimstoneError::NotFound(format!("role {}", body.role)))
        }
        Err(err) => return error_response(err),
    };
    match storage::assign_role(&state.db, id, role.id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

async fn remove_user_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, role_name)): Path<(i64, String)>,
) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::USERS_MANAGE),
        "users.remove_role",
        "user",
        Some(id.to_string()),
    )
    .await
    {
        return resp;
    }

    let role = match storage::get_role_by_name(&state.db, &role_name).await {
        Ok(Some(role)) => role,
        Ok(None) => {
            return error_response(ClaimstoneError::NotFound(format!("role {role_name}")))
        }
        Err(err) => return error_response(err),
    };
    match storage::remove_role(&state.db, id, role.id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

/// Preview of what a fresh login would grant this user right now. Existing
/// tokens keep their issuance-time snapshot regardless.
async fn user_authorities(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::USERS_VIEW),
        "users.authorities",
        "user",
        Some(id.to_string()),
    )
    .await
    {
        return resp;
    }
    match storage::user_role_graph(&state.db, id).await {
        Ok(graph) => Json(json!({ "authorities": materialize(&graph).to_claims() })).into_response(),
        Err(err) => error_response(err),
    }
}

// ---------------------------------------------------------------------------
// Role / permission administration

async fn list_roles(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::USERS_VIEW),
        "roles.list",
        "role",
        None,
    )
    .await
    {
        return resp;
    }
    match storage::list_roles(&state.db).await {
        Ok(roles) => Json(roles).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct CreateRoleRequest {
    name: String,
    description: Option<String>,
}

async fn create_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateRoleRequest>,
) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::ROLES_MANAGE),
        "roles.create",
        "role",
        None,
    )
    .await
    {
        return resp;
    }
    let role = match storage::create_role(&state.db, &body.name, body.description).await {
        Ok(role) => role,
        Err(err) => return error_response(err),
    };
    if let Err(resp) = refresh_catalog(&state).await {
        return resp;
    }
    (StatusCode::CREATED, Json(role)).into_response()
}

#[derive(Debug, Deserialize)]
struct GrantPermissionRequest {
    permission: String,
}

async fn grant_role_permission(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<GrantPermissionRequest>,
) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::ROLES_MANAGE),
        "roles.grant_permission",
        "role",
        Some(id.to_string()),
    )
    .await
    {
        return resp;
    }

    let permission = match storage::get_permission_by_name(&state.db, &body.permission).await {
        Ok(Some(permission)) => permission,
        Ok(None) => {
            return error_response(ClaimstoneError::NotFound(format!(
                "permission {}",
                body.permission
            )))
        }
        Err(err) => return error_response(err),
    };
    match storage::grant_permission(&state.db, id, permission.id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

async fn revoke_role_permission(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, permission_name)): Path<(i64, String)>,
) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::ROLES_MANAGE),
        "roles.revoke_permission",
        "role",
        Some(id.to_string()),
    )
    .await
    {
        return resp;
    }

    let permission = match storage::get_permission_by_name(&state.db, &permission_name).await {
        Ok(Some(permission)) => permission,
        Ok(None) => {
            return error_response(ClaimstoneError::NotFound(format!(
                "permission {permission_name}"
            )))
        }
        Err(err) => return error_response(err),
    };
    match storage::revoke_permission(&state.db, id, permission.id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

async fn list_permissions(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::USERS_VIEW),
        "permissions.list",
        "permission",
        None,
    )
    .await
    {
        return resp;
    }
    match storage::list_permissions(&state.db).await {
        Ok(permissions) => Json(permissions).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct CreatePermissionRequest {
    name: String,
    description: Option<String>,
}

async fn create_permission(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreatePermissionRequest>,
) -> Response {
    let identity = match authenticate(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(
        &state,
        &identity,
        &Requirement::permission(permissions::ROLES_MANAGE),
        "permissions.create",
        "permission",
        None,
    )
    .await
    {
        return resp;
    }
    let permission = match storage::create_permission(&state.db, &body.name, body.description).await
    {
        Ok(permission) => permission,
        Err(err) => return error_response(err),
    };
    if let Err(resp) = refresh_catalog(&state).await {
        return resp;
    }
    (StatusCode::CREATED, Json(permission)).into_response()
}
