//! Plain-text rendering for command output.

use chrono::{DateTime, Local, Utc};
use inspektor_core::models::{AppConfig, Datasource, ServiceAccount, SessionAttachment, User};
use inspektor_core::{
    AccessView, GuardDecision, Navigation, PrivilegeMode, Route, SessionStatus, TokenStatus,
};

/// Format an instant in local time for display
pub fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

pub fn status_lines(status: &SessionStatus) -> Vec<String> {
    let mut lines = vec![format!("Control plane: {}", status.base_url)];
    match status.token {
        TokenStatus::Absent => lines.push("Not logged in".to_string()),
        TokenStatus::Expired => lines.push("Session expired; local state cleared".to_string()),
        TokenStatus::Malformed => {
            lines.push("Stored credential was unreadable; local state cleared".to_string())
        }
        TokenStatus::Valid { expires_at } => {
            if let Some(claims) = &status.claims {
                lines.push(format!("Logged in as {}", claims.username));
                if !claims.roles.is_empty() {
                    lines.push(format!("Roles: {}", claims.roles.join(", ")));
                }
            }
            lines.push(format!(
                "Expires: {} ({} min left)",
                local_time(expires_at),
                status.token.minutes_until_expiry()
            ));
        }
    }
    lines
}

/// Whether `requested` was admitted as asked or landed somewhere else.
pub fn navigation_line(requested: &str, decision: &GuardDecision) -> String {
    match &decision.navigation {
        Navigation::Admit(route) if *route == Route::from_path(requested) => {
            format!("{}: admitted", route)
        }
        other => format!("{}: redirected to {}", requested, other.route()),
    }
}

pub fn policy_line(config: Option<&AppConfig>) -> String {
    match config {
        None => "Policy refresh requested; revision is only visible in admin mode.".to_string(),
        Some(config) if config.policy_hash.is_empty() => {
            "Policy refresh requested; no revision reported yet.".to_string()
        }
        Some(config) => format!(
            "Policy refresh requested; current revision {} of {}.",
            config.policy_hash, config.policy_repo_url
        ),
    }
}

pub fn privilege_line(mode: &PrivilegeMode) -> String {
    match mode {
        PrivilegeMode::Standard => "Mode: standard".to_string(),
        PrivilegeMode::Admin(config) if config.is_empty() => "Mode: admin".to_string(),
        PrivilegeMode::Admin(config) => format!(
            "Mode: admin (policy {} @ {})",
            config.policy_repo_url, config.policy_hash
        ),
    }
}

fn access_cell(datasource: &Datasource) -> String {
    match &datasource.session_meta {
        None => "-".to_string(),
        Some(SessionAttachment::Standing(meta)) if meta.passthrough => "standing (passthrough)".to_string(),
        Some(SessionAttachment::Standing(meta)) => format!("standing as {}", meta.postgres_username),
        Some(SessionAttachment::Temporary(temp)) => match temp.expires_at() {
            Some(at) if temp.is_active() => format!("temporary until {}", local_time(at)),
            Some(_) => "temporary (expired)".to_string(),
            None => "temporary".to_string(),
        },
    }
}

pub fn datasource_table(datasources: &[Datasource]) -> Vec<String> {
    if datasources.is_empty() {
        return vec!["  (none)".to_string()];
    }
    let name_width = datasources
        .iter()
        .map(|d| d.name.len())
        .max()
        .unwrap_or(0)
        .max(4);
    datasources
        .iter()
        .map(|d| {
            format!(
                "  {:>4}  {:<width$}  {:<10}  {}",
                d.id,
                d.name,
                d.display_kind(),
                access_cell(d),
                width = name_width
            )
        })
        .collect()
}

pub fn access_lines(view: &AccessView) -> Vec<String> {
    let mut lines = vec![format!(
        "Datasources ({} accessible, updated {}):",
        view.accessible().count(),
        view.age_display()
    )];
    lines.extend(datasource_table(&view.datasources));
    lines.push(String::new());
    lines.push("Temporary credentials:".to_string());
    lines.extend(datasource_table(&view.temp_datasources));
    lines
}

pub fn user_table(users: &[User]) -> Vec<String> {
    if users.is_empty() {
        return vec!["  (none)".to_string()];
    }
    users
        .iter()
        .map(|u| {
            let marker = if u.is_admin() { "*" } else { " " };
            format!("  {:>4} {}{}  {}", u.id, marker, u.name, u.roles_display())
        })
        .collect()
}

pub fn service_account_table(accounts: &[ServiceAccount]) -> Vec<String> {
    if accounts.is_empty() {
        return vec!["  (none)".to_string()];
    }
    accounts
        .iter()
        .map(|a| {
            let roles = if a.roles.is_empty() {
                "-".to_string()
            } else {
                a.roles.join(", ")
            };
            format!("  {:>4}  {}  {}", a.id, a.name, roles)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use inspektor_core::models::SessionMeta;

    fn ds(id: u64, name: &str, session_meta: Option<SessionAttachment>) -> Datasource {
        Datasource {
            id,
            name: name.to_string(),
            kind: "postgres".to_string(),
            sidecar_hostname: None,
            roles: vec![],
            session_meta,
        }
    }

    #[test]
    fn test_datasource_table() {
        let meta = SessionMeta {
            postgres_username: "brave_turing".to_string(),
            ..SessionMeta::default()
        };
        let rows = datasource_table(&[
            ds(1, "analytics", Some(SessionAttachment::Standing(meta))),
            ds(2, "billing", None),
        ]);
        assert_eq!(rows.len(), 2);
        assert!(rows[0].contains("standing as brave_turing"));
        assert!(rows[1].trim_end().ends_with('-'));
    }

    #[test]
    fn test_empty_tables() {
        assert_eq!(datasource_table(&[]), vec!["  (none)"]);
        assert_eq!(user_table(&[]), vec!["  (none)"]);
    }

    #[test]
    fn test_status_lines_signed_out() {
        let status = SessionStatus {
            token: TokenStatus::Absent,
            claims: None,
            base_url: "http://localhost:3123".to_string(),
        };
        let lines = status_lines(&status);
        assert_eq!(lines[1], "Not logged in");
    }

    fn decision(navigation: Navigation) -> GuardDecision {
        GuardDecision {
            navigation,
            status: TokenStatus::Absent,
        }
    }

    #[test]
    fn test_navigation_line_normalizes_requested_path() {
        let admitted = decision(Navigation::Admit(Route::dashboard()));
        assert_eq!(navigation_line("/dashboard/", &admitted), "/dashboard: admitted");
        assert_eq!(navigation_line("/dashboard?tab=users", &admitted), "/dashboard: admitted");

        let home = decision(Navigation::Admit(Route::home()));
        assert_eq!(navigation_line("/dashboard", &home), "/dashboard: redirected to /");
        assert_eq!(navigation_line("/login", &admitted), "/login: redirected to /dashboard");
    }

    #[test]
    fn test_policy_line() {
        assert!(policy_line(None).contains("admin mode"));
        let config = AppConfig {
            policy_repo_url: "https://git.example.com/policies.git".to_string(),
            policy_hash: "3f9a2c1".to_string(),
        };
        assert!(policy_line(Some(&config)).contains("3f9a2c1"));
        assert!(policy_line(Some(&AppConfig::default())).contains("no revision"));
    }

    #[test]
    fn test_access_header_shows_age() {
        let mut view = AccessView::default();
        assert_eq!(access_lines(&view)[0], "Datasources (0 accessible, updated never):");

        view.refreshed_at = Some(chrono::Utc::now() - Duration::minutes(5));
        assert_eq!(access_lines(&view)[0], "Datasources (0 accessible, updated 5m ago):");
    }

    #[test]
    fn test_user_table_marks_admins() {
        let users = vec![User {
            id: 1,
            name: "root".to_string(),
            roles: vec!["admin".to_string()],
        }];
        assert_eq!(user_table(&users), vec!["     1 *root  admin"]);
    }
}
