//! API client for the Inspektor control plane REST API.
//!
//! This module provides the `ApiClient` struct for making authenticated
//! requests, and the `AuthSlot` every clone of the client reads its
//! `Auth-Token` header from.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::cookie::Jar;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::redirect::Policy;
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::Credential;
use crate::models::{
    AccessSession, AddRolesRequest, AppConfig, AuditLogConfig, CloudWatchConfig,
    CreateDatasourceRequest, CreateServiceAccountRequest, CreateSessionRequest,
    CreateTempCredentialRequest, CreateUserRequest, Datasource, DeleteDatasourceRequest,
    OauthProvider, ServiceAccount, TeamsConfig, TempCredential, User, ValidationError,
};

use super::error::{ApiError, ApiResult};

// ============================================================================
// Constants
// ============================================================================

/// Header the control plane reads the credential from.
pub const AUTH_HEADER: &str = "Auth-Token";

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

const OAUTH_PATH: &str = "/api/oauth";
const OAUTH_CALLBACK_PATH: &str = "/api/auth/callback";

// ============================================================================
// Auth slot
// ============================================================================

/// Shared holder of the outgoing `Auth-Token` header value.
///
/// Clones share the same slot, so attaching a credential once affects
/// every `ApiClient` built on it, including ones already handed to
/// concurrent tasks.
#[derive(Clone, Default)]
pub struct AuthSlot {
    header: Arc<RwLock<Option<HeaderValue>>>,
}

impl AuthSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the header value; `None` detaches it.
    pub fn attach(&self, token: Option<&str>) {
        let value = token.and_then(|t| match HeaderValue::from_str(t) {
            Ok(mut value) => {
                value.set_sensitive(true);
                Some(value)
            }
            Err(_) => {
                warn!("Credential is not a valid header value, requests go out unauthenticated");
                None
            }
        });
        *self.header.write().unwrap_or_else(PoisonError::into_inner) = value;
    }

    pub fn header(&self) -> Option<HeaderValue> {
        self.header
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_attached(&self) -> bool {
        self.header().is_some()
    }
}

// ============================================================================
// Wire types
// ============================================================================

/// Response envelope written by every control plane handler.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    msg: String,
    #[serde(rename = "succes", default)]
    success: bool,
    data: Option<T>,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

/// Where the SSO entry point sends the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SsoEntry {
    /// The control plane has no identity provider configured
    Disabled,
    /// Identity provider authorization page
    Redirect(Url),
}

// ============================================================================
// Client
// ============================================================================

/// API client for the control plane.
/// Clone is cheap - reqwest::Client, the cookie jar and the auth slot are all Arc-backed.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    /// Same jar, but redirects are surfaced instead of followed
    sso: Client,
    base_url: Url,
    jar: Arc<Jar>,
    auth: AuthSlot,
}

impl ApiClient {
    /// Create a new API client that authenticates from `auth`.
    pub fn new(base_url: &str, timeout: Duration, auth: AuthSlot) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid control plane URL: {}", base_url))?;
        let jar = Arc::new(Jar::default());

        let client = Client::builder()
            .timeout(timeout)
            .cookie_provider(Arc::clone(&jar))
            .build()
            .context("Failed to build HTTP client")?;
        let sso = Client::builder()
            .timeout(timeout)
            .cookie_provider(Arc::clone(&jar))
            .redirect(Policy::none())
            .build()
            .context("Failed to build SSO HTTP client")?;

        Ok(Self {
            client,
            sso,
            base_url,
            jar,
            auth,
        })
    }

    /// Cookie jar shared with the HTTP client; the SSO handoff cookie lands here.
    pub fn cookie_jar(&self) -> Arc<Jar> {
        Arc::clone(&self.jar)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn auth_slot(&self) -> &AuthSlot {
        &self.auth
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(value) = self.auth.header() {
            headers.insert(AUTH_HEADER, value);
        }
        headers
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> ApiResult<Option<reqwest::Response>> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Decode the envelope, turning `succes: false` into an error.
    fn open_envelope<T: DeserializeOwned>(body: &str, url: &str) -> ApiResult<Option<T>> {
        let envelope: Envelope<T> = serde_json::from_str(body).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse response from {}: {}", url, e))
        })?;
        if !envelope.success {
            return Err(ApiError::Rejected(envelope.msg));
        }
        Ok(envelope.data)
    }

    async fn execute<T, B>(&self, method: Method, path: &str, body: Option<&B>) -> ApiResult<Option<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = self.url(path);
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            debug!(method = %method, url = %url, "Sending request");
            let mut request = self
                .client
                .request(method.clone(), &url)
                .headers(self.auth_headers());
            if let Some(body) = body {
                request = request.json(body);
            }
            let response = request.send().await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    let text = response.text().await?;
                    return Self::open_envelope(&text, &url);
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(url = %url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
            }
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<Option<T>> {
        self.execute::<T, ()>(Method::GET, path, None).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<Option<T>> {
        self.execute(Method::POST, path, Some(body)).await
    }

    async fn post_ack<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiResult<()> {
        self.post::<IgnoredAny, B>(path, body).await.map(|_| ())
    }

    /// Interpret the answer of the SSO entry point. The control plane
    /// redirects when a provider is configured and otherwise answers with
    /// an empty provider record.
    fn sso_entry_from(status: StatusCode, location: Option<&str>, body: &str) -> ApiResult<SsoEntry> {
        let parse = |url: &str| {
            Url::parse(url).map_err(|e| {
                ApiError::InvalidResponse(format!("Invalid identity provider URL {}: {}", url, e))
            })
        };
        if status.is_redirection() {
            let location = location.ok_or_else(|| {
                ApiError::InvalidResponse("SSO redirect carried no location".to_string())
            })?;
            return parse(location).map(SsoEntry::Redirect);
        }
        if !status.is_success() {
            return Err(ApiError::from_status(status, body));
        }
        let provider: OauthProvider = Self::open_envelope(body, OAUTH_PATH)?.unwrap_or_default();
        if provider.is_disabled() {
            Ok(SsoEntry::Disabled)
        } else {
            parse(&provider.url).map(SsoEntry::Redirect)
        }
    }

    /// Build the callback request from what the identity provider redirected
    /// the browser to. Accepts the full URL, its query string, or the bare code.
    fn sso_callback_url(&self, redirected_to: &str) -> ApiResult<Url> {
        let input = redirected_to.trim();
        let pasted = match Url::parse(input) {
            Ok(url) => url,
            Err(_) => {
                let mut url = self.base_url.clone();
                if input.contains('=') {
                    url.set_query(Some(input.trim_start_matches('?')));
                } else {
                    url.set_query(None);
                    url.query_pairs_mut().append_pair("code", input);
                }
                url
            }
        };
        let code = pasted
            .query_pairs()
            .find(|(key, _)| key == "code")
            .map(|(_, value)| value.into_owned())
            .filter(|code| !code.is_empty())
            .ok_or(ValidationError::MissingAuthCode)?;

        let mut url = Url::parse(&self.url(OAUTH_CALLBACK_PATH)).map_err(|e| {
            ApiError::InvalidResponse(format!("Invalid callback URL: {}", e))
        })?;
        url.query_pairs_mut().append_pair("code", &code);
        Ok(url)
    }

    // ===== Authentication =====

    /// Exchange username and password for a credential
    pub async fn authenticate(&self, username: &str, password: &str) -> ApiResult<Credential> {
        let body = LoginRequest { username, password };
        let response: Option<LoginResponse> = self.post("/api/login", &body).await?;
        response
            .map(|r| Credential::new(r.token))
            .ok_or_else(|| ApiError::InvalidResponse("Login response carried no token".to_string()))
    }

    /// Ask the control plane where single sign-on starts.
    pub async fn sso_entry(&self) -> ApiResult<SsoEntry> {
        let url = self.url(OAUTH_PATH);
        debug!(url = %url, "Requesting SSO entry point");
        let response = self.sso.get(&url).headers(self.auth_headers()).send().await?;
        let status = response.status();
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();
        Self::sso_entry_from(status, location.as_deref(), &body)
    }

    /// Hand the identity provider's authorization code to the control plane.
    ///
    /// On success the control plane sets the short-lived handoff cookie,
    /// which lands in this client's jar. The redirect that follows is not
    /// taken.
    pub async fn complete_sso(&self, redirected_to: &str) -> ApiResult<()> {
        let url = self.sso_callback_url(redirected_to)?;
        debug!(path = OAUTH_CALLBACK_PATH, "Completing SSO");
        let response = self.sso.get(url).send().await?;
        let status = response.status();
        if status.is_success() || status.is_redirection() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status, &body))
    }

    /// Roles granted to the current principal
    pub async fn roles(&self) -> ApiResult<Vec<String>> {
        Ok(self.get("/api/roles").await?.unwrap_or_default())
    }

    // ===== Datasources =====

    pub async fn datasources(&self) -> ApiResult<Vec<Datasource>> {
        Ok(self.get("/api/datasource").await?.unwrap_or_default())
    }

    pub async fn create_datasource(&self, request: &CreateDatasourceRequest) -> ApiResult<()> {
        request.validate()?;
        self.post_ack("/api/datasource", request).await
    }

    pub async fn delete_datasource(&self, datasource_id: u64) -> ApiResult<()> {
        let body = DeleteDatasourceRequest { datasource_id };
        self.execute::<IgnoredAny, _>(Method::DELETE, "/api/datasource", Some(&body))
            .await
            .map(|_| ())
    }

    // ===== Users and roles =====

    pub async fn users(&self) -> ApiResult<Vec<User>> {
        Ok(self.get("/api/users").await?.unwrap_or_default())
    }

    pub async fn create_user(&self, request: &CreateUserRequest) -> ApiResult<()> {
        request.validate()?;
        self.post_ack("/api/user", request).await
    }

    pub async fn add_roles(&self, request: &AddRolesRequest) -> ApiResult<()> {
        request.validate()?;
        self.post_ack("/api/roles", request).await
    }

    // ===== Sessions =====

    pub async fn sessions(&self) -> ApiResult<Vec<AccessSession>> {
        Ok(self.get("/api/session").await?.unwrap_or_default())
    }

    pub async fn create_session(&self, request: &CreateSessionRequest) -> ApiResult<()> {
        self.post_ack("/api/session", request).await
    }

    pub async fn temp_credentials(&self) -> ApiResult<Vec<TempCredential>> {
        Ok(self.get("/api/session/temp").await?.unwrap_or_default())
    }

    pub async fn create_temp_credential(
        &self,
        request: &CreateTempCredentialRequest,
    ) -> ApiResult<()> {
        request.validate()?;
        self.post_ack("/api/session/temp", request).await
    }

    // ===== Admin =====

    pub async fn admin_config(&self) -> ApiResult<AppConfig> {
        Ok(self.get("/api/config").await?.unwrap_or_default())
    }

    /// Ask the control plane to pull the latest policy
    pub async fn refresh_policy(&self) -> ApiResult<()> {
        // The endpoint name is misspelled on the server side.
        self.post_ack("/api/policy/nofification", &serde_json::json!({}))
            .await
    }

    pub async fn configure_cloudwatch(&self, config: &CloudWatchConfig) -> ApiResult<()> {
        config.validate()?;
        self.post_ack("/api/configure/cloudwatch", config).await
    }

    pub async fn configure_teams(&self, config: &TeamsConfig) -> ApiResult<()> {
        config.validate()?;
        self.post_ack("/api/configure/teams", config).await
    }

    pub async fn configure_audit_log(&self, config: &AuditLogConfig) -> ApiResult<()> {
        config.validate()?;
        self.post_ack("/api/configure/auditlog", config).await
    }

    // ===== Service accounts =====

    pub async fn service_accounts(&self) -> ApiResult<Vec<ServiceAccount>> {
        Ok(self.get("/api/serviceaccount").await?.unwrap_or_default())
    }

    /// Create a service account. The response carries its token, which the
    /// control plane shows only once.
    pub async fn create_service_account(
        &self,
        request: &CreateServiceAccountRequest,
    ) -> ApiResult<Option<ServiceAccount>> {
        request.validate()?;
        self.post("/api/serviceaccount", request).await
    }
}
