use crate::demo::{run_demo, DemoArgs};
use crate::infra::{open_store, parse_role};
use crate::server;
use clap::{Args, Parser, Subcommand};
use estate_moderation::config::{AppConfig, StoreKind};
use estate_moderation::error::AppError;
use estate_moderation::moderation::store::UserDirectory;
use estate_moderation::moderation::{
    ModerationService, Role, TokenAuthority, UserAccount, UserId,
};

#[derive(Parser, Debug)]
#[command(
    name = "estate-moderation",
    about = "Run and operate the marketplace support-case and moderation service",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Relabel mis-classified admin threads in the configured store
    Reclassify,
    /// Manage marketplace accounts in the configured store
    User {
        #[command(subcommand)]
        command: UserCommand,
    },
    /// Mint bearer tokens for local testing
    Token {
        #[command(subcommand)]
        command: TokenCommand,
    },
    /// Walk through a support case and a report against an in-memory store
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    /// Create or update an account
    Add(UserAddArgs),
}

#[derive(Subcommand, Debug)]
enum TokenCommand {
    /// Issue a signed session token
    Issue(TokenIssueArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug)]
struct UserAddArgs {
    /// Account identifier
    #[arg(long)]
    id: String,
    /// Name shown to administrators in the report queue
    #[arg(long)]
    name: String,
    /// Grant the admin role
    #[arg(long)]
    admin: bool,
}

#[derive(Args, Debug)]
struct TokenIssueArgs {
    /// Subject of the token
    #[arg(long)]
    user_id: String,
    /// Role claim carried by the token (user or admin)
    #[arg(long, value_parser = parse_role, default_value = "user")]
    role: Role,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Reclassify => run_reclassify(),
        Command::User {
            command: UserCommand::Add(args),
        } => run_user_add(args),
        Command::Token {
            command: TokenCommand::Issue(args),
        } => run_token_issue(args),
        Command::Demo(args) => run_demo(args),
    }
}

fn run_reclassify() -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let store = open_store(&config.store)?;
    let service = ModerationService::new(store, config.moderation_settings());

    let summary = service.run_corrector()?;
    println!(
        "Reclassified {} message(s): {} report marker(s), {} admin thread(s), {} reopened",
        summary.total(),
        summary.marker_corrections,
        summary.admin_thread_corrections,
        summary.reopened
    );
    Ok(())
}

fn run_user_add(args: UserAddArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    if config.store.kind == StoreKind::Memory {
        println!("STORE_KIND=memory: the account will not outlive this command");
    }
    let store = open_store(&config.store)?;
    let role = if args.admin { Role::Admin } else { Role::User };

    store.upsert_user(UserAccount::new(args.id.trim(), args.name.trim(), role))?;
    println!("Stored {} account {}", role.label(), args.id.trim());
    Ok(())
}

fn run_token_issue(args: TokenIssueArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let tokens = TokenAuthority::from_secret(
        config.auth.token_secret.as_bytes(),
        config.auth.token_ttl_minutes,
    );

    let token = tokens.issue(&UserId::new(args.user_id.trim()), args.role)?;
    println!("{token}");
    Ok(())
}
