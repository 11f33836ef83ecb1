use serde::{Deserialize, Serialize};

use super::null_as_default;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(alias = "ID")]
    pub id: u64,
    #[serde(alias = "Name", alias = "username", default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(alias = "Roles", default, deserialize_with = "null_as_default")]
    pub roles: Vec<String>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|r| r == crate::privilege::ADMIN_ROLE)
    }

    pub fn roles_display(&self) -> String {
        if self.roles.is_empty() {
            "-".to_string()
        } else {
            self.roles.join(", ")
        }
    }
}

/// A non-human principal, as returned by `GET /api/serviceaccount`.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceAccount {
    #[serde(alias = "ID", default)]
    pub id: u64,
    #[serde(alias = "Name", default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(alias = "Roles", default, deserialize_with = "null_as_default")]
    pub roles: Vec<String>,
    /// Only present in the response that created the account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl std::fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("roles", &self.roles)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user() {
        let json = r#"{"ID": 2, "Name": "ada", "Roles": ["admin", "dev"]}"#;
        let user: User = serde_json::from_str(json).unwrap();
        assert_eq!(user.name, "ada");
        assert!(user.is_admin());
        assert_eq!(user.roles_display(), "admin, dev");
    }

    #[test]
    fn test_user_without_roles() {
        let user: User = serde_json::from_str(r#"{"id": 3, "name": "bob", "roles": null}"#).unwrap();
        assert!(!user.is_admin());
        assert_eq!(user.roles_display(), "-");
    }

    #[test]
    fn test_parse_service_accounts() {
        let json = r#"[{"ID": 3, "Name": "ci-runner", "Roles": null, "token": "x.y.z"}, {"id": 4, "name": "backup"}]"#;
        let accounts: Vec<ServiceAccount> = serde_json::from_str(json).unwrap();
        assert_eq!(accounts[0].name, "ci-runner");
        assert!(accounts[0].roles.is_empty());
        assert!(!format!("{:?}", accounts[0]).contains("x.y.z"));
        assert_eq!(accounts[1].token, None);
    }
}
