//! Command handlers.

use std::io::{self, BufRead, Write};

use anyhow::{bail, Context, Result};
use inspektor_core::models::{
    AddRolesRequest, AuditLogConfig, CloudWatchConfig, CreateDatasourceRequest,
    CreateServiceAccountRequest, CreateSessionRequest, CreateTempCredentialRequest,
    CreateUserRequest, TeamsConfig,
};
use inspektor_core::{Config, Console, Credential, Navigation, RefreshOutcome, SsoEntry};
use tracing::{info, warn};

use crate::cli::{
    Commands, ConfigureCommand, DatasourceCommand, PolicyCommand, RolesCommand,
    ServiceAccountCommand, SessionCommand, TempCommand, UserCommand,
};
use crate::output;

pub async fn run(command: Commands, console: &Console, config: &mut Config) -> Result<()> {
    match command {
        Commands::Login { sso: true, .. } => sso_login(console).await,
        Commands::Login {
            username, password, ..
        } => login(console, config, username, password).await,
        Commands::Logout => {
            console.logout()?;
            println!("Logged out.");
            Ok(())
        }
        Commands::Status => {
            for line in output::status_lines(&console.status()) {
                println!("{}", line);
            }
            Ok(())
        }
        Commands::Open { path } => open(console, &path).await,
        Commands::Access { json } => access(console, json).await,
        Commands::Datasource(cmd) => datasource(console, cmd).await,
        Commands::User(cmd) => user(console, cmd).await,
        Commands::Session(cmd) => session(console, cmd).await,
        Commands::Temp(cmd) => temp(console, cmd).await,
        Commands::Policy(PolicyCommand::Refresh) => policy_refresh(console).await,
        Commands::Roles(RolesCommand::Add { target, id, roles }) => {
            require_session(console)?;
            let request = AddRolesRequest {
                kind: target.into(),
                id,
                roles,
            };
            console.client().add_roles(&request).await?;
            println!("Roles added.");
            Ok(())
        }
        Commands::ServiceAccount(cmd) => service_account(console, cmd).await,
        Commands::Configure(cmd) => configure(console, cmd).await,
    }
}

/// Read a line from stdin after printing `label`.
fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn read_password(password: Option<String>) -> Result<String> {
    match password {
        Some(password) => Ok(password),
        None => rpassword::prompt_password("Password: ").context("Failed to read password"),
    }
}

/// Run the dashboard route through the guard; fail unless it is admitted.
fn require_session(console: &Console) -> Result<()> {
    let decision = console.navigate("/dashboard")?;
    match decision.navigation {
        Navigation::Admit(route) if route.is_protected() => Ok(()),
        _ => bail!("Not logged in. Run `inspektor login` first."),
    }
}

async fn login(
    console: &Console,
    config: &mut Config,
    username: Option<String>,
    password: Option<String>,
) -> Result<()> {
    let username = match username.or_else(|| config.last_username.clone()) {
        Some(username) => username,
        None => prompt("Username: ")?,
    };
    if username.is_empty() {
        bail!("A username is required");
    }
    let password = read_password(password)?;

    let credential = console.login(&username, &password).await?;

    if config.last_username.as_deref() != Some(username.as_str()) {
        config.last_username = Some(username.clone());
        if let Err(e) = config.save() {
            warn!(error = %e, "Failed to save config");
        }
    }

    print_logged_in(&credential, &username);
    Ok(())
}

fn print_logged_in(credential: &Credential, fallback: &str) {
    match credential.claims() {
        Ok(claims) => println!(
            "Logged in as {} until {}.",
            claims.username,
            output::local_time(claims.expires_at)
        ),
        Err(_) => println!("Logged in as {}.", fallback),
    }
}

async fn sso_login(console: &Console) -> Result<()> {
    let url = match console.sso_entry().await? {
        SsoEntry::Disabled => bail!("Single sign-on is not configured on this control plane"),
        SsoEntry::Redirect(url) => url,
    };
    println!("Open this URL in a browser and sign in:");
    println!();
    println!("  {}", url);
    println!();
    let redirected_to = prompt("Paste the URL you were redirected to: ")?;
    if redirected_to.is_empty() {
        bail!("No redirect URL given");
    }

    let credential = console.complete_sso(&redirected_to).await?;
    print_logged_in(&credential, "SSO user");
    Ok(())
}

/// Pull the latest policy, then re-evaluate privileges so the reported
/// revision comes from a fresh admin check.
async fn policy_refresh(console: &Console) -> Result<()> {
    require_session(console)?;
    console.client().refresh_policy().await?;
    let mode = console.evaluate_privileges().await?;
    let config = if mode.is_admin() {
        console.refresh_config().await?
    } else {
        None
    };
    println!("{}", output::policy_line(config.as_ref()));
    Ok(())
}

async fn open(console: &Console, path: &str) -> Result<()> {
    let decision = console.navigate(path)?;
    println!("{}", output::navigation_line(path, &decision));

    if !decision.navigation.route().is_protected() {
        return Ok(());
    }

    let init = console.initialize().await;
    match init.privilege {
        Ok(mode) => println!("{}", output::privilege_line(&mode)),
        Err(e) => println!("Could not determine privileges: {}", e),
    }
    match init.access {
        Ok(_) => {
            for line in output::access_lines(&console.access()) {
                println!("{}", line);
            }
        }
        Err(e) => println!("Could not load access: {}", e),
    }
    Ok(())
}

async fn access(console: &Console, json: bool) -> Result<()> {
    require_session(console)?;
    if let RefreshOutcome::Superseded = console.refresh_access().await? {
        info!("Access refresh superseded");
    }
    let view = console.access();
    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        for line in output::access_lines(&view) {
            println!("{}", line);
        }
    }
    Ok(())
}

async fn datasource(console: &Console, command: DatasourceCommand) -> Result<()> {
    require_session(console)?;
    let client = console.client();
    match command {
        DatasourceCommand::List => {
            for line in output::datasource_table(&client.datasources().await?) {
                println!("{}", line);
            }
        }
        DatasourceCommand::Add {
            name,
            kind,
            sidecar_hostname,
            roles,
        } => {
            let request = CreateDatasourceRequest {
                name,
                kind,
                roles,
                sidecar_hostname,
            };
            client.create_datasource(&request).await?;
            println!("Datasource {} created.", request.name);
        }
        DatasourceCommand::Delete { id } => {
            client.delete_datasource(id).await?;
            println!("Datasource {} deleted.", id);
        }
    }
    Ok(())
}

async fn user(console: &Console, command: UserCommand) -> Result<()> {
    require_session(console)?;
    let client = console.client();
    match command {
        UserCommand::List => {
            for line in output::user_table(&client.users().await?) {
                println!("{}", line);
            }
        }
        UserCommand::Add {
            username,
            password,
            roles,
        } => {
            let request = CreateUserRequest {
                username,
                password: read_password(password)?,
                roles,
            };
            client.create_user(&request).await?;
            println!("User {} created.", request.username);
        }
    }
    Ok(())
}

async fn session(console: &Console, command: SessionCommand) -> Result<()> {
    require_session(console)?;
    match command {
        SessionCommand::Create {
            datasource_id,
            passthrough,
        } => {
            let request = CreateSessionRequest {
                datasource_id,
                passthrough,
            };
            console.client().create_session(&request).await?;
            println!("Session created on datasource {}.", datasource_id);
        }
    }
    Ok(())
}

async fn temp(console: &Console, command: TempCommand) -> Result<()> {
    require_session(console)?;
    match command {
        TempCommand::List => {
            console.refresh_access().await?;
            for line in output::datasource_table(&console.access().temp_datasources) {
                println!("{}", line);
            }
        }
        TempCommand::Create(args) => {
            let request = CreateTempCredentialRequest {
                datasource_id: args.datasource_id,
                user_id: args.user_id,
                roles: args.roles,
                expiry_minute: args.minutes,
            };
            console.client().create_temp_credential(&request).await?;
            println!(
                "Temporary credential issued for {} minutes.",
                request.expiry_minute
            );
        }
    }
    Ok(())
}

async fn service_account(console: &Console, command: ServiceAccountCommand) -> Result<()> {
    require_session(console)?;
    let client = console.client();
    match command {
        ServiceAccountCommand::List => {
            for line in output::service_account_table(&client.service_accounts().await?) {
                println!("{}", line);
            }
        }
        ServiceAccountCommand::Add { name, roles } => {
            let request = CreateServiceAccountRequest { name, roles };
            let created = client.create_service_account(&request).await?;
            println!("Service account {} created.", request.name);
            if let Some(token) = created.and_then(|account| account.token) {
                println!("Token (shown once): {}", token);
            }
        }
    }
    Ok(())
}

async fn configure(console: &Console, command: ConfigureCommand) -> Result<()> {
    require_session(console)?;
    let client = console.client();
    match command {
        ConfigureCommand::Cloudwatch {
            region,
            log_group,
            log_stream,
        } => {
            let config = CloudWatchConfig {
                region_name: region,
                log_group_name: log_group,
                log_stream_name: log_stream,
            };
            client.configure_cloudwatch(&config).await?;
            println!("CloudWatch logging configured.");
        }
        ConfigureCommand::AuditLog { log_prefix } => {
            client
                .configure_audit_log(&AuditLogConfig { log_prefix })
                .await?;
            println!("Audit logging to stdout configured.");
        }
        ConfigureCommand::Teams { app_id, app_token } => {
            client
                .configure_teams(&TeamsConfig { app_id, app_token })
                .await?;
            println!("Teams notifications configured.");
        }
    }
    Ok(())
}
