//! Command-line interface

use anyhow::{anyhow, bail, Context as _, Result};
use clap::{Args, Parser, Subcommand};
use std::sync::Arc;
use strongbox::api::InviteCode;
use strongbox::dispatch::{ProgressEvent, ProgressFn};
use strongbox::set::{determine_credential, parse_set_args, set_credentials, AddressFlags};
use strongbox::{
    Client, Credential, CredentialValue, Envelope, InviteState, PartialPathExp, SocketDispatcher,
};
use strongbox_core::daemon::{check_socket, DaemonStatus};
use strongbox_core::{AddressDefaults, Config, Paths};
use tracing::debug;

#[derive(Parser)]
#[command(name = "strongbox")]
#[command(about = "Client for the strongbox secrets registry")]
#[command(version)]
#[command(after_help = r#"PATH EXPRESSIONS:
    Credentials live at /org/project/environment/service/identity/instance.
    Any segment after the project may be * to mean "any".

    strongbox set DATABASE_URL=postgres://...       address from flags and defaults
    strongbox set dev/web/API_KEY abc123            relative to --org/--project
    strongbox set /acme/api/prod/web/TOKEN xyz      absolute path

DEFAULTS:
    ~/.config/strongbox/config.yaml, then .strongbox.yaml in the working
    directory or a parent, then STRONGBOX_ORG, STRONGBOX_PROJECT,
    STRONGBOX_ENVIRONMENT, STRONGBOX_SERVICE, STRONGBOX_INSTANCE."#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set a credential: <NAME|PATH> <VALUE> or <NAME|PATH>=<VALUE>
    Set {
        args: Vec<String>,
        #[command(flatten)]
        address: AddressArgs,
    },

    /// Unset a credential, keeping its history
    Unset {
        /// Credential name or path
        name_or_path: String,
        #[command(flatten)]
        address: AddressArgs,
    },

    /// List credentials under a path prefix (defaults to org/project)
    Ls {
        /// Path prefix: /acme/api/prod is absolute, prod/web is relative to --org/--project
        path: Option<String>,
        /// Organization
        #[arg(short, long)]
        org: Option<String>,
        /// Project
        #[arg(short, long)]
        project: Option<String>,
        /// Show values
        #[arg(long)]
        values: bool,
    },

    /// Organization commands
    Orgs {
        #[command(subcommand)]
        command: OrgsCommand,
    },

    /// Org invite commands
    Invites {
        #[command(subcommand)]
        command: InvitesCommand,
    },

    /// Check whether the daemon is reachable
    Status,
}

#[derive(Subcommand)]
pub enum OrgsCommand {
    /// List the orgs you belong to
    List,
}

#[derive(Subcommand)]
pub enum InvitesCommand {
    /// List invites for an org
    List {
        #[arg(short, long)]
        org: Option<String>,
        /// Only show invites in these states (sent, accepted, associated, approved)
        #[arg(long = "state", value_delimiter = ',')]
        states: Vec<InviteState>,
    },

    /// Invite an email address to an org
    Send {
        email: String,
        #[arg(short, long)]
        org: Option<String>,
        /// Teams to join once approved
        #[arg(long = "team", default_value = "member")]
        teams: Vec<String>,
    },

    /// Accept an invite with the code from the invite email
    Accept {
        email: String,
        code: String,
        #[arg(short, long)]
        org: Option<String>,
    },

    /// Approve an accepted invite
    Approve {
        email: String,
        #[arg(short, long)]
        org: Option<String>,
    },
}

/// Addressing flags shared by set and unset
#[derive(Args, Debug, Clone, Default)]
pub struct AddressArgs {
    /// Org the credential belongs to
    #[arg(short, long)]
    org: Option<String>,
    /// Project the credential belongs to
    #[arg(short, long)]
    project: Option<String>,
    /// Environment(s); repeat or comma-separate for several
    #[arg(short, long, value_delimiter = ',')]
    environment: Vec<String>,
    /// Service(s)
    #[arg(short, long, value_delimiter = ',')]
    service: Vec<String>,
    /// Identity(s)
    #[arg(short = 'u', long, value_delimiter = ',')]
    identity: Vec<String>,
    /// Instance(s)
    #[arg(short, long, value_delimiter = ',')]
    instance: Vec<String>,
}

impl From<AddressArgs> for AddressFlags {
    fn from(args: AddressArgs) -> Self {
        Self {
            org: args.org,
            project: args.project,
            environment: args.environment,
            service: args.service,
            identity: args.identity,
            instance: args.instance,
        }
    }
}

/// Resolved configuration plus a way to reach the registry
struct Context {
    paths: Paths,
    config: Config,
}

impl Context {
    fn load() -> Result<Self> {
        let paths = Paths::new();
        let cwd = std::env::current_dir().context("Failed to read working directory")?;
        let config = Config::resolve(&paths, &cwd)?;
        Ok(Self { paths, config })
    }

    /// Client over the daemon socket; nothing is dialed until a request
    fn client(&self) -> Client {
        Client::new(Arc::new(SocketDispatcher::from_config(&self.config, &self.paths)))
    }

    fn org<'a>(&'a self, flag: &'a Option<String>) -> Result<&'a str> {
        flag.as_deref()
            .or(self.config.defaults.org.as_deref())
            .ok_or_else(|| anyhow!("--org is required"))
    }
}

pub async fn run(command: Commands) -> Result<()> {
    let ctx = Context::load()?;
    match command {
        Commands::Set { args, address } => cmd_set(&ctx, &args, address).await,
        Commands::Unset {
            name_or_path,
            address,
        } => cmd_unset(&ctx, &name_or_path, address).await,
        Commands::Ls {
            path,
            org,
            project,
            values,
        } => {
            let pattern = ls_pattern(
                path.as_deref(),
                org.as_deref(),
                project.as_deref(),
                &ctx.config.defaults,
            )?;
            cmd_ls(&ctx, &pattern, values).await
        }
        Commands::Orgs {
            command: OrgsCommand::List,
        } => cmd_orgs_list(&ctx).await,
        Commands::Invites { command } => match command {
            InvitesCommand::List { org, states } => cmd_invites_list(&ctx, &org, &states).await,
            InvitesCommand::Send { email, org, teams } => {
                cmd_invites_send(&ctx, &email, &org, &teams).await
            }
            InvitesCommand::Accept { email, code, org } => {
                cmd_invites_accept(&ctx, &email, &code, &org).await
            }
            InvitesCommand::Approve { email, org } => cmd_invites_approve(&ctx, &email, &org).await,
        },
        Commands::Status => cmd_status(&ctx),
    }
}

fn print_progress(event: &ProgressEvent) {
    eprintln!("  {}", event.message);
}

fn progress() -> Arc<ProgressFn> {
    Arc::new(print_progress)
}

fn credential_path(credential: &Envelope<Credential>) -> String {
    format!("{}/{}", credential.body.pathexp(), credential.body.name())
}

/// Store a credential value
async fn cmd_set(ctx: &Context, args: &[String], address: AddressArgs) -> Result<()> {
    let (name_or_path, value) = parse_set_args(args)?;
    let target = determine_credential(&name_or_path, &address.into(), &ctx.config.defaults)?;
    debug!(count = target.pathexps.len(), "Resolved path expressions");

    let stored = set_credentials(&ctx.client(), &target, CredentialValue::string(value), progress())
        .await
        .context("Could not set credential.")?;

    println!();
    for credential in &stored {
        println!(
            "Credential {} has been set at {}",
            credential.body.name(),
            credential_path(credential)
        );
    }
    Ok(())
}

/// Withdraw a credential value
async fn cmd_unset(ctx: &Context, name_or_path: &str, address: AddressArgs) -> Result<()> {
    let target = determine_credential(name_or_path, &address.into(), &ctx.config.defaults)?;

    let stored = set_credentials(&ctx.client(), &target, CredentialValue::Unset, progress())
        .await
        .context("Could not unset credential.")?;

    println!();
    for credential in &stored {
        println!(
            "Credential {} has been unset at {}",
            credential.body.name(),
            credential_path(credential)
        );
    }
    Ok(())
}

/// List credentials under a prefix
/// The search prefix for `ls`
///
/// A leading `/` starts at the org. Anything else starts at the environment,
/// as with `set`, taking org and project from the flags or the defaults.
fn ls_pattern(
    path: Option<&str>,
    org: Option<&str>,
    project: Option<&str>,
    defaults: &AddressDefaults,
) -> Result<PartialPathExp> {
    if let Some(absolute) = path.filter(|p| p.starts_with('/')) {
        return Ok(PartialPathExp::parse(absolute)?);
    }

    let org = org.or(defaults.org.as_deref());
    let project = project.or(defaults.project.as_deref());
    let text = match (org, project, path) {
        (None, _, _) => bail!("--org is required"),
        (Some(org), Some(project), Some(rest)) => format!("/{}/{}/{}", org, project, rest),
        (Some(org), Some(project), None) => format!("/{}/{}", org, project),
        (Some(org), None, None) => format!("/{}", org),
        (Some(_), None, Some(_)) => bail!("--project is required"),
    };
    Ok(PartialPathExp::parse(&text)?)
}

async fn cmd_ls(ctx: &Context, pattern: &PartialPathExp, values: bool) -> Result<()> {
    let found = ctx.client().credentials().search(pattern).await?;
    if found.is_empty() {
        println!("No credentials found under {}", pattern);
        return Ok(());
    }

    for credential in &found {
        let shown = match (values, credential.body.value()) {
            (true, Some(value)) => value.to_string(),
            _ => credential.body.state().as_str().to_string(),
        };
        println!("  {}  {}", credential_path(credential), shown);
    }
    Ok(())
}

async fn cmd_orgs_list(ctx: &Context) -> Result<()> {
    let orgs = ctx.client().orgs().list().await?;
    if orgs.is_empty() {
        println!("You are not a member of any org");
        return Ok(());
    }
    for org in &orgs {
        println!("  {}", org.body.name);
    }
    Ok(())
}

async fn lookup_org(client: &Client, name: &str) -> Result<strongbox::Identifier> {
    let org = client
        .orgs()
        .get_by_name(name)
        .await?
        .ok_or_else(|| anyhow!("Org not found"))?;
    Ok(org.id)
}

async fn cmd_invites_list(ctx: &Context, org: &Option<String>, states: &[InviteState]) -> Result<()> {
    let client = ctx.client();
    let org_id = lookup_org(&client, ctx.org(org)?).await?;
    let invites = client.invites().list(&org_id, states).await?;

    if invites.is_empty() {
        println!("No invites found");
        return Ok(());
    }
    for invite in &invites {
        println!(
            "  {:<32} {:<10} {}",
            invite.body.email(),
            invite.body.state(),
            invite.body.created().format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

async fn cmd_invites_send(ctx: &Context, email: &str, org: &Option<String>, teams: &[String]) -> Result<()> {
    let client = ctx.client();
    let org_name = ctx.org(org)?;
    let org_id = lookup_org(&client, org_name).await?;
    let me = client.session().whoami().await?;

    let mut team_ids = Vec::with_capacity(teams.len());
    for team in teams {
        let mut found = client.teams().get_by_name(&org_id, team).await?;
        if found.len() != 1 {
            bail!("Team {} not found", team);
        }
        team_ids.push(found.remove(0).id);
    }

    client
        .invites()
        .send(email, org_id, me.id, team_ids)
        .await
        .context("Could not send invite.")?;
    println!("Invite sent to {} for {}", email, org_name);
    Ok(())
}

async fn cmd_invites_accept(ctx: &Context, email: &str, code: &str, org: &Option<String>) -> Result<()> {
    let client = ctx.client();
    let code = InviteCode {
        org: ctx.org(org)?.to_string(),
        email: email.to_string(),
        code: code.to_string(),
    };

    client.invites().accept(&code).await.context("Could not accept invite.")?;
    let invite = client
        .invites()
        .associate(&code)
        .await
        .context("Could not associate invite.")?;

    println!(
        "Invite to {} accepted; waiting for an org admin to approve it ({})",
        code.org,
        invite.body.state()
    );
    Ok(())
}

async fn cmd_invites_approve(ctx: &Context, email: &str, org: &Option<String>) -> Result<()> {
    let client = ctx.client();
    let org_id = lookup_org(&client, ctx.org(org)?).await?;

    let invites = client
        .invites()
        .list(&org_id, &[InviteState::Associated])
        .await?;
    let invite = invites
        .iter()
        .find(|i| i.body.email().eq_ignore_ascii_case(email))
        .ok_or_else(|| anyhow!("No accepted invite found for {}", email))?;

    client
        .invites()
        .approve(&invite.id, progress().as_ref())
        .await
        .context("Could not approve invite.")?;
    println!("Invite for {} approved", email);
    Ok(())
}

fn cmd_status(ctx: &Context) -> Result<()> {
    let socket = ctx.config.socket_path(&ctx.paths);
    let status = check_socket(&socket);
    println!("daemon: {} ({})", status.as_str(), socket.display());
    if status != DaemonStatus::Running {
        bail!("the daemon is not running");
    }
    Ok(())
}
