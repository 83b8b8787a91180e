//! API server builder and router
//!
//! The HTTP shell is a thin layer over the core managers: request bodies are
//! validated at this boundary and every operation maps 1:1 onto a manager
//! call. When authentication is enabled, every route (except the health
//! check) requires a `Basic user:token` header validated against the token
//! store.

use std::sync::Arc;

use axum::extract::{Path, Query, Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{Json, Response};
use axum::routing::{delete, get};
use axum::Router;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::access::AccountAccessManager;
use crate::error::{HarbormasterError, HarbormasterResult};
use crate::registry::{Fleet, RepositoryName};
use crate::token::TokenManager;

/// Shared handle to the service's managers, used as the router state.
#[derive(Debug, Clone)]
pub struct Harbormaster {
    access: Arc<AccountAccessManager>,
    tokens: TokenManager,
    fleet: Fleet,
}

impl Harbormaster {
    /// The account access manager.
    pub fn access(&self) -> &AccountAccessManager {
        &self.access
    }

    /// The token manager.
    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// The registry fleet handle.
    pub fn fleet(&self) -> &Fleet {
        &self.fleet
    }
}

/// Builder for configuring and creating the admin API service.
#[derive(Debug)]
pub struct HarbormasterBuilder {
    store: Option<kvstore::Store>,
    fleet: Option<Fleet>,
    token_table: Option<String>,
    account_table: Option<String>,
    require_auth: bool,
}

impl Default for HarbormasterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HarbormasterBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            store: None,
            fleet: None,
            token_table: None,
            account_table: None,
            require_auth: false,
        }
    }

    /// Set the key-value store backend.
    pub fn store(mut self, store: kvstore::Store) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the registry fleet backend.
    pub fn fleet(mut self, fleet: Fleet) -> Self {
        self.fleet = Some(fleet);
        self
    }

    /// Set the table holding token records. Defaults to `tokens`.
    pub fn token_table(mut self, table: impl Into<String>) -> Self {
        self.token_table = Some(table.into());
        self
    }

    /// Set the table holding the granted-accounts ledger. Defaults to
    /// `accounts`.
    pub fn account_table(mut self, table: impl Into<String>) -> Self {
        self.account_table = Some(table.into());
        self
    }

    /// Require a valid bearer token on every route except the health check.
    pub fn require_auth(mut self, require_auth: bool) -> Self {
        self.require_auth = require_auth;
        self
    }

    /// Build the service router together with a handle to its managers.
    ///
    /// The handle is useful for bootstrapping (creating the first token)
    /// before the router starts serving.
    pub fn build_with_handle(self) -> (Router, Harbormaster) {
        let store = self.store.expect("store backend must be configured");
        let fleet = self.fleet.expect("registry fleet must be configured");

        let tokens = TokenManager::new(
            store.table(self.token_table.unwrap_or_else(|| "tokens".to_string())),
        );
        let access = Arc::new(AccountAccessManager::new(
            fleet.clone(),
            store.table(self.account_table.unwrap_or_else(|| "accounts".to_string())),
        ));

        let state = Harbormaster {
            access,
            tokens,
            fleet,
        };

        let mut router = Router::new()
            .route("/account", get(list_accounts).post(grant_access))
            .route("/account/{id}", delete(revoke_access))
            .route("/token", axum::routing::post(create_token))
            .route("/token/{token}", delete(delete_token))
            .route(
                "/repository",
                get(list_repositories).post(create_repository),
            )
            .route("/repository/{owner}/{name}", delete(delete_repository))
            .route("/repository/{owner}/{name}/image", get(list_images))
            .route(
                "/repository/{owner}/{name}/image/{tag}",
                delete(delete_image),
            );

        if self.require_auth {
            router = router.layer(axum::middleware::from_fn_with_state(
                state.clone(),
                require_token,
            ));
        }

        let router = router
            .route("/admin/health", get(health))
            .with_state(state.clone());

        (router, state)
    }

    /// Build the service router.
    ///
    /// Returns a Router that can be served with any tower-compatible server.
    pub fn build(self) -> Router {
        self.build_with_handle().0
    }
}

/// Token-gating middleware.
///
/// Credentials arrive as `Authorization: Basic base64(user:token)`; the
/// record's presence in the token store is the sole proof of validity. A
/// store failure is surfaced as a 5xx, never as a silent denial.
async fn require_token(
    State(state): State<Harbormaster>,
    request: Request,
    next: Next,
) -> Result<Response, HarbormasterError> {
    let credentials = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(parse_basic_auth)
        .ok_or(HarbormasterError::Unauthorized)?;

    let (user, token) = credentials;
    if state.tokens.authenticate(&user, &token).await? {
        Ok(next.run(request).await)
    } else {
        Err(HarbormasterError::Unauthorized)
    }
}

fn parse_basic_auth(value: &HeaderValue) -> Option<(String, String)> {
    let value = value.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, token) = decoded.split_once(':')?;
    Some((user.to_string(), token.to_string()))
}

#[derive(Debug, Deserialize)]
struct GrantAccessRequest {
    account: String,
}

#[derive(Debug, Serialize)]
struct ListAccountsResponse {
    accounts: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CreateTokenRequest {
    user: String,
}

#[derive(Debug, Serialize)]
struct CreateTokenResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct CreateRepositoryRequest {
    owner: String,
    name: String,
}

#[derive(Debug, Serialize)]
struct ListRepositoriesResponse {
    repositories: Vec<RepositoryName>,
}

#[derive(Debug, Deserialize)]
struct DeleteRepositoryParams {
    #[serde(default)]
    force: bool,
}

#[derive(Debug, Serialize)]
struct ListImagesResponse {
    images: Vec<String>,
}

/// List the accounts with fleet-wide access
async fn list_accounts(
    State(state): State<Harbormaster>,
) -> HarbormasterResult<Json<ListAccountsResponse>> {
    let accounts = state.access.accounts().await?;
    Ok(Json(ListAccountsResponse { accounts }))
}

/// Grant an account access to every repository
async fn grant_access(
    State(state): State<Harbormaster>,
    Json(request): Json<GrantAccessRequest>,
) -> HarbormasterResult<StatusCode> {
    state.access.grant_access(&request.account).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Revoke an account's access from every repository
async fn revoke_access(
    State(state): State<Harbormaster>,
    Path(id): Path<String>,
) -> HarbormasterResult<StatusCode> {
    state.access.revoke_access(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Create a token for a user
async fn create_token(
    State(state): State<Harbormaster>,
    Json(request): Json<CreateTokenRequest>,
) -> HarbormasterResult<(StatusCode, Json<CreateTokenResponse>)> {
    let token = state.tokens.create(&request.user).await?;
    Ok((StatusCode::CREATED, Json(CreateTokenResponse { token })))
}

/// Delete a token
async fn delete_token(
    State(state): State<Harbormaster>,
    Path(token): Path<String>,
) -> HarbormasterResult<StatusCode> {
    state.tokens.delete(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// List every repository in the fleet
async fn list_repositories(
    State(state): State<Harbormaster>,
) -> HarbormasterResult<Json<ListRepositoriesResponse>> {
    let repositories = state.fleet.repositories().await?;
    Ok(Json(ListRepositoriesResponse { repositories }))
}

/// Create a repository and seed its policy from the ledger
async fn create_repository(
    State(state): State<Harbormaster>,
    Json(request): Json<CreateRepositoryRequest>,
) -> HarbormasterResult<StatusCode> {
    let repository = RepositoryName::new(request.owner, request.name)?;

    state.fleet.create_repository(&repository).await?;

    // The repository is not ready until its policy reflects the ledger.
    state.access.seed_repository(&repository).await?;

    Ok(StatusCode::CREATED)
}

/// Delete a repository
async fn delete_repository(
    State(state): State<Harbormaster>,
    Path((owner, name)): Path<(String, String)>,
    Query(params): Query<DeleteRepositoryParams>,
) -> HarbormasterResult<StatusCode> {
    let repository = RepositoryName::new(owner, name)?;
    state
        .fleet
        .delete_repository(&repository, params.force)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// List the image tags in a repository
async fn list_images(
    State(state): State<Harbormaster>,
    Path((owner, name)): Path<(String, String)>,
) -> HarbormasterResult<Json<ListImagesResponse>> {
    let repository = RepositoryName::new(owner, name)?;
    let images = state.fleet.list_images(&repository).await?;
    Ok(Json(ListImagesResponse { images }))
}

/// Delete an image tag from a repository
async fn delete_image(
    State(state): State<Harbormaster>,
    Path((owner, name, tag)): Path<(String, String, String)>,
) -> HarbormasterResult<StatusCode> {
    let repository = RepositoryName::new(owner, name)?;
    state.fleet.delete_image(&repository, &tag).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Health check endpoint
///
/// Returns 200 OK to indicate the service is available
async fn health() -> StatusCode {
    StatusCode::OK
}
