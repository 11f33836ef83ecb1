use async_trait::async_trait;

use crate::auth::Credential;
use crate::models::{AccessSession, AppConfig, Datasource, TempCredential};

use super::{ApiClient, ApiResult};

/// The backend calls the session and access components depend on.
///
/// `ApiClient` is the production implementation; tests substitute fakes
/// that count calls or hold responses back.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn authenticate(&self, username: &str, password: &str) -> ApiResult<Credential>;

    async fn roles(&self) -> ApiResult<Vec<String>>;

    async fn admin_config(&self) -> ApiResult<AppConfig>;

    async fn datasources(&self) -> ApiResult<Vec<Datasource>>;

    async fn sessions(&self) -> ApiResult<Vec<AccessSession>>;

    async fn temp_credentials(&self) -> ApiResult<Vec<TempCredential>>;
}

#[async_trait]
impl ControlPlane for ApiClient {
    async fn authenticate(&self, username: &str, password: &str) -> ApiResult<Credential> {
        ApiClient::authenticate(self, username, password).await
    }

    async fn roles(&self) -> ApiResult<Vec<String>> {
        ApiClient::roles(self).await
    }

    async fn admin_config(&self) -> ApiResult<AppConfig> {
        ApiClient::admin_config(self).await
    }

    async fn datasources(&self) -> ApiResult<Vec<Datasource>> {
        ApiClient::datasources(self).await
    }

    async fn sessions(&self) -> ApiResult<Vec<AccessSession>> {
        ApiClient::sessions(self).await
    }

    async fn temp_credentials(&self) -> ApiResult<Vec<TempCredential>> {
        ApiClient::temp_credentials(self).await
    }
}
