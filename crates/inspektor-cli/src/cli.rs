//! CLI command definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use inspektor_core::models::ObjectKind;

#[derive(Parser)]
#[command(name = "inspektor")]
#[command(about = "Console for the Inspektor access control plane", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Control plane URL (overrides the config file)
    #[arg(long, env = "INSPEKTOR_BASE_URL", global = true)]
    pub base_url: Option<String>,

    /// Treat this token as the SSO handoff cookie
    #[arg(long, global = true)]
    pub handoff: Option<String>,

    /// Keep the credential in memory for this run only
    #[arg(long, global = true)]
    pub ephemeral: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in with username and password, or through the identity provider
    Login {
        #[arg(short, long, env = "INSPEKTOR_USERNAME")]
        username: Option<String>,

        /// Prompted for when omitted
        #[arg(long, env = "INSPEKTOR_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Single sign-on: open the printed URL, then paste the URL the
        /// identity provider redirected to
        #[arg(long)]
        sso: bool,
    },

    /// Forget the stored credential and all local session state
    Logout,

    /// Show the current session
    Status,

    /// Run a route through the navigation guard
    ///
    /// Examples:
    ///   inspektor open /dashboard
    ///   inspektor --handoff "$TOKEN" open /
    Open {
        #[arg(default_value = "/dashboard")]
        path: String,
    },

    /// Show the datasources you can reach
    Access {
        /// Print the reconciled view as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage datasources
    #[command(subcommand)]
    Datasource(DatasourceCommand),

    /// Manage users
    #[command(subcommand)]
    User(UserCommand),

    /// Manage standing sessions
    #[command(subcommand)]
    Session(SessionCommand),

    /// Manage temporary credentials
    #[command(subcommand)]
    Temp(TempCommand),

    /// Policy repository actions
    #[command(subcommand)]
    Policy(PolicyCommand),

    /// Role assignment
    #[command(subcommand)]
    Roles(RolesCommand),

    /// Manage service accounts
    #[command(subcommand)]
    ServiceAccount(ServiceAccountCommand),

    /// Admin integrations
    #[command(subcommand)]
    Configure(ConfigureCommand),
}

#[derive(Subcommand)]
pub enum DatasourceCommand {
    List,

    Add {
        name: String,

        /// Provider kind
        #[arg(long = "type", default_value = "postgres")]
        kind: String,

        /// Sidecar address the datasource is reached through
        #[arg(long)]
        sidecar_hostname: String,

        /// Roles allowed to use the datasource (can be repeated)
        #[arg(short, long = "role", required = true)]
        roles: Vec<String>,
    },

    Delete {
        id: u64,
    },
}

#[derive(Subcommand)]
pub enum UserCommand {
    List,

    Add {
        username: String,

        /// Prompted for when omitted
        #[arg(long)]
        password: Option<String>,

        #[arg(short, long = "role")]
        roles: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum ServiceAccountCommand {
    List,

    Add {
        name: String,

        #[arg(short, long = "role", required = true)]
        roles: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum SessionCommand {
    /// Create a standing session on a datasource
    Create {
        datasource_id: u64,

        /// Use the control plane's passthrough credentials
        #[arg(long)]
        passthrough: bool,
    },
}

#[derive(Subcommand)]
pub enum TempCommand {
    List,

    /// Issue a temporary credential to a user
    Create(TempCreateArgs),
}

#[derive(Args)]
pub struct TempCreateArgs {
    #[arg(long)]
    pub datasource_id: u64,

    #[arg(long)]
    pub user_id: u64,

    #[arg(short, long = "role", required = true)]
    pub roles: Vec<String>,

    /// Lifetime in minutes
    #[arg(long, default_value_t = 60)]
    pub minutes: u32,
}

#[derive(Subcommand)]
pub enum PolicyCommand {
    /// Ask the control plane to pull the latest policy, then show the
    /// policy revision it reports
    Refresh,
}

#[derive(Subcommand)]
pub enum RolesCommand {
    /// Add roles to a user or datasource
    Add {
        #[arg(value_enum)]
        target: RoleTarget,

        id: u64,

        #[arg(required = true)]
        roles: Vec<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum RoleTarget {
    User,
    Datasource,
}

impl From<RoleTarget> for ObjectKind {
    fn from(target: RoleTarget) -> Self {
        match target {
            RoleTarget::User => ObjectKind::User,
            RoleTarget::Datasource => ObjectKind::Datasource,
        }
    }
}

#[derive(Subcommand)]
pub enum ConfigureCommand {
    /// Ship audit logs to CloudWatch
    Cloudwatch {
        #[arg(long)]
        region: String,

        #[arg(long)]
        log_group: String,

        #[arg(long)]
        log_stream: String,
    },

    /// Write audit logs to the sidecar's stdout
    AuditLog {
        #[arg(long)]
        log_prefix: String,
    },

    /// Send approval requests to Microsoft Teams
    Teams {
        #[arg(long)]
        app_id: String,

        #[arg(long, env = "INSPEKTOR_TEAMS_TOKEN", hide_env_values = true)]
        app_token: String,
    },
}
