//! Request payloads for the control plane's write endpoints.
//!
//! Each payload validates itself with the same rules the backend applies,
//! so obviously bad input fails before a round trip.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Datasource kinds the control plane can front with a sidecar.
pub const VALID_DATASOURCE_KINDS: &[&str] = &["postgres"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is a required field")]
    Required(&'static str),

    #[error("not a valid datasource type: {0}")]
    InvalidDatasourceKind(String),

    #[error("expected at least one role")]
    NoRoles,

    #[error("expiry minutes should be greater than zero")]
    ZeroExpiry,

    #[error("no authorization code in the callback URL")]
    MissingAuthCode,
}

fn require(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::Required(field))
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateDatasourceRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub roles: Vec<String>,
    #[serde(rename = "sidecarHostname")]
    pub sidecar_hostname: String,
}

impl CreateDatasourceRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !VALID_DATASOURCE_KINDS.contains(&self.kind.as_str()) {
            return Err(ValidationError::InvalidDatasourceKind(self.kind.clone()));
        }
        require(&self.name, "name")?;
        require(&self.sidecar_hostname, "sidecar hostname")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteDatasourceRequest {
    pub datasource_id: u64,
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    pub roles: Vec<String>,
}

impl CreateUserRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require(&self.username, "username")?;
        require(&self.password, "password")?;
        if self.roles.is_empty() {
            return Err(ValidationError::NoRoles);
        }
        Ok(())
    }
}

impl std::fmt::Debug for CreateUserRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreateUserRequest")
            .field("username", &self.username)
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub datasource_id: u64,
    #[serde(default)]
    pub passthrough: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTempCredentialRequest {
    pub datasource_id: u64,
    pub user_id: u64,
    pub roles: Vec<String>,
    pub expiry_minute: u32,
}

impl CreateTempCredentialRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.roles.is_empty() {
            return Err(ValidationError::NoRoles);
        }
        if self.expiry_minute == 0 {
            return Err(ValidationError::ZeroExpiry);
        }
        Ok(())
    }
}

/// Which kind of object a role assignment targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    #[serde(rename = "USER")]
    User,
    #[serde(rename = "DATA_SOURCE")]
    Datasource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddRolesRequest {
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    pub id: u64,
    pub roles: Vec<String>,
}

impl AddRolesRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.roles.is_empty() {
            return Err(ValidationError::NoRoles);
        }
        Ok(())
    }
}

/// Audit log shipping to CloudWatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudWatchConfig {
    pub region_name: String,
    pub log_group_name: String,
    pub log_stream_name: String,
}

impl CloudWatchConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require(&self.region_name, "region name")?;
        require(&self.log_group_name, "log group name")?;
        require(&self.log_stream_name, "log stream name")
    }
}

/// Audit logs written to the sidecar's stdout under a prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogConfig {
    pub log_prefix: String,
}

impl AuditLogConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require(&self.log_prefix, "log prefix")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateServiceAccountRequest {
    pub name: String,
    pub roles: Vec<String>,
}

impl CreateServiceAccountRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require(&self.name, "name")?;
        if self.roles.is_empty() {
            return Err(ValidationError::NoRoles);
        }
        Ok(())
    }
}

/// Microsoft Teams bot used for access requests.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamsConfig {
    pub app_id: String,
    pub app_token: String,
}

impl TeamsConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require(&self.app_id, "app id")?;
        require(&self.app_token, "app token")
    }
}

impl std::fmt::Debug for TeamsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeamsConfig")
            .field("app_id", &self.app_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn datasource_request() -> CreateDatasourceRequest {
        CreateDatasourceRequest {
            name: "orders".to_string(),
            kind: "postgres".to_string(),
            roles: vec!["dev".to_string()],
            sidecar_hostname: "orders-sidecar:5432".to_string(),
        }
    }

    #[test]
    fn test_datasource_request_validation() {
        assert_eq!(datasource_request().validate(), Ok(()));

        let mut bad_kind = datasource_request();
        bad_kind.kind = "mysql".to_string();
        assert_eq!(
            bad_kind.validate(),
            Err(ValidationError::InvalidDatasourceKind("mysql".to_string()))
        );

        let mut no_sidecar = datasource_request();
        no_sidecar.sidecar_hostname = "  ".to_string();
        assert_eq!(no_sidecar.validate(), Err(ValidationError::Required("sidecar hostname")));
    }

    #[test]
    fn test_datasource_request_wire_names() {
        let value = serde_json::to_value(datasource_request()).unwrap();
        assert_eq!(value["type"], "postgres");
        assert_eq!(value["sidecarHostname"], "orders-sidecar:5432");
    }

    #[test]
    fn test_user_request_validation() {
        let mut req = CreateUserRequest {
            username: "ada".to_string(),
            password: "pw".to_string(),
            roles: vec![],
        };
        assert_eq!(req.validate(), Err(ValidationError::NoRoles));
        req.roles.push("dev".to_string());
        assert_eq!(req.validate(), Ok(()));
        assert!(!format!("{:?}", req).contains("pw"));
    }

    #[test]
    fn test_temp_credential_request_validation() {
        let mut req = CreateTempCredentialRequest {
            datasource_id: 1,
            user_id: 2,
            roles: vec!["read".to_string()],
            expiry_minute: 0,
        };
        assert_eq!(req.validate(), Err(ValidationError::ZeroExpiry));
        req.expiry_minute = 15;
        assert_eq!(req.validate(), Ok(()));

        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["datasourceId"], 1);
        assert_eq!(value["expiryMinute"], 15);
    }

    #[test]
    fn test_audit_log_config() {
        let config = AuditLogConfig {
            log_prefix: String::new(),
        };
        assert_eq!(config.validate(), Err(ValidationError::Required("log prefix")));

        let config = AuditLogConfig {
            log_prefix: "inspektor-audit".to_string(),
        };
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(serde_json::to_value(&config).unwrap()["logPrefix"], "inspektor-audit");
    }

    #[test]
    fn test_service_account_request_validation() {
        let mut req = CreateServiceAccountRequest {
            name: "ci-runner".to_string(),
            roles: vec![],
        };
        assert_eq!(req.validate(), Err(ValidationError::NoRoles));
        req.roles.push("deploy".to_string());
        assert_eq!(req.validate(), Ok(()));
        req.name = " ".to_string();
        assert_eq!(req.validate(), Err(ValidationError::Required("name")));
    }

    #[test]
    fn test_add_roles_request_wire_kind() {
        let req = AddRolesRequest {
            kind: ObjectKind::Datasource,
            id: 4,
            roles: vec!["dev".to_string()],
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["type"], "DATA_SOURCE");
    }
}
