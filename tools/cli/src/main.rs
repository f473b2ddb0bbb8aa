//! drivekit CLI - Google Drive folder, file and sharing automation.
//!
//! The first run walks the user through the OAuth2 consent flow and caches
//! the resulting token; later runs reuse and refresh it silently.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use drivekit_auth::{
    ClientConfig, ConsentCodeProvider, ConsoleCodeProvider, CredentialManager,
    StaticCodeProvider, TokenStore,
};
use drivekit_storage::{
    folder_id_from_link, DriveClient, DriveFile, GranteeType, PermissionGrant, Role,
    DOCUMENT_MIME_TYPE, SPREADSHEET_MIME_TYPE,
};

#[derive(Parser)]
#[command(name = "drivekit")]
#[command(about = "drivekit - Google Drive automation")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// OAuth2 client credentials file.
    #[arg(long, env = "DRIVEKIT_CREDENTIALS", default_value = "credentials.json")]
    credentials: PathBuf,

    /// Cached token file.
    #[arg(long, env = "DRIVEKIT_TOKEN", default_value = "token.json")]
    token: PathBuf,

    /// OAuth2 scope to request (repeatable). Changing scopes requires a new login.
    #[arg(long = "scope")]
    scopes: Vec<String>,

    /// Authorization code, instead of prompting for it.
    #[arg(long, env = "DRIVEKIT_AUTH_CODE")]
    code: Option<String>,

    /// Open the consent page in the default browser.
    #[arg(long)]
    open_browser: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the cached credential.
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },

    #[command(flatten)]
    Drive(DriveCommand),
}

#[derive(Subcommand)]
enum DriveCommand {
    /// Create a folder.
    Mkdir {
        /// Folder name.
        name: String,

        /// Parent folder ID.
        #[arg(short, long, default_value = "root")]
        parent: String,
    },

    /// Rename a folder.
    Rename {
        /// Folder ID.
        id: String,

        /// New name.
        name: String,
    },

    /// Create an empty file.
    Touch {
        /// File name.
        name: String,

        /// Parent folder ID.
        #[arg(short, long, default_value = "root")]
        parent: String,

        /// Google file kind.
        #[arg(short, long, value_enum, conflicts_with = "mime")]
        kind: Option<FileKind>,

        /// Explicit MIME type.
        #[arg(short, long)]
        mime: Option<String>,
    },

    /// List files in a folder (trashed files excluded).
    Ls {
        /// Folder ID or folder link.
        folder: String,
    },

    /// Print a folder's web link.
    Link {
        /// Folder ID.
        id: String,
    },

    /// Share a file or folder.
    Share {
        /// File or folder ID.
        id: String,

        /// Grantee email.
        #[arg(short, long)]
        email: String,

        /// Access level.
        #[arg(short, long, value_enum, default_value = "writer")]
        role: RoleArg,

        /// Grantee kind.
        #[arg(short = 't', long = "type", value_enum, default_value = "user")]
        grantee: GranteeArg,
    },

    /// List who has access to a file or folder.
    Permissions {
        /// File or folder ID.
        id: String,
    },
}

#[derive(Subcommand)]
enum AuthAction {
    /// Run the consent flow and replace the cached token.
    Login,
    /// Show the cached token's state.
    Status,
    /// Delete the cached token.
    Logout,
}

#[derive(Clone, Copy, ValueEnum)]
enum FileKind {
    Doc,
    Sheet,
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    Reader,
    Commenter,
    Writer,
    Organizer,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Reader => Role::Reader,
            RoleArg::Commenter => Role::Commenter,
            RoleArg::Writer => Role::Writer,
            RoleArg::Organizer => Role::Organizer,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum GranteeArg {
    User,
    Group,
}

impl From<GranteeArg> for GranteeType {
    fn from(grantee: GranteeArg) -> Self {
        match grantee {
            GranteeArg::User => GranteeType::User,
            GranteeArg::Group => GranteeType::Group,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let token_path = cli.token.clone();
    if let Err(err) = run(cli).await {
        if needs_reauthorization(&err) {
            eprintln!(
                "The stored authorization is no longer valid. Run `drivekit auth login` (or delete {}) and try again.",
                token_path.display()
            );
        }
        return Err(err);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let provider: Arc<dyn ConsentCodeProvider> = match &cli.code {
        Some(code) => Arc::new(StaticCodeProvider::new(code.clone())),
        None => Arc::new(ConsoleCodeProvider::new().with_browser(cli.open_browser)),
    };
    let manager = CredentialManager::new(TokenStore::new(&cli.token), provider);

    match cli.command {
        Commands::Auth { action } => match action {
            AuthAction::Login => {
                let config = load_config(&cli.credentials, &cli.scopes)?;
                cmd_login(&manager, &config).await
            }
            AuthAction::Status => cmd_status(&manager).await,
            AuthAction::Logout => cmd_logout(&manager).await,
        },
        Commands::Drive(command) => {
            let config = load_config(&cli.credentials, &cli.scopes)?;
            let drive = connect(&manager, &config).await?;
            run_drive_command(&drive, command).await
        }
    }
}

fn load_config(path: &Path, scopes: &[String]) -> Result<ClientConfig> {
    ClientConfig::from_file(path, scopes).context("Unable to load client credentials")
}

/// Whether any cause in the chain can only be fixed by authorizing again.
fn needs_reauthorization(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<drivekit_common::Error>()
            .is_some_and(drivekit_common::Error::requires_reauthorization)
    })
}

/// Build the Drive client, authorizing first if needed.
async fn connect(manager: &CredentialManager, config: &ClientConfig) -> Result<DriveClient> {
    let transport = manager
        .get_transport(config)
        .await
        .context("Cannot create the Google Drive service")?;
    Ok(DriveClient::new(transport))
}

async fn run_drive_command(drive: &DriveClient, command: DriveCommand) -> Result<()> {
    match command {
        DriveCommand::Mkdir { name, parent } => cmd_mkdir(drive, &name, &parent).await,
        DriveCommand::Rename { id, name } => cmd_rename(drive, &id, &name).await,
        DriveCommand::Touch {
            name,
            parent,
            kind,
            mime,
        } => cmd_touch(drive, &name, &parent, kind, mime).await,
        DriveCommand::Ls { folder } => cmd_ls(drive, &folder).await,
        DriveCommand::Link { id } => cmd_link(drive, &id).await,
        DriveCommand::Share {
            id,
            email,
            role,
            grantee,
        } => cmd_share(drive, &id, &email, role, grantee).await,
        DriveCommand::Permissions { id } => cmd_permissions(drive, &id).await,
    }
}

/// Force a fresh consent flow.
async fn cmd_login(manager: &CredentialManager, config: &ClientConfig) -> Result<()> {
    manager
        .login(config)
        .await
        .context("Unable to retrieve token from web")?;

    println!("Authorized. Token saved to {}", manager.store().path().display());
    Ok(())
}

/// Show the cached credential without printing secrets.
async fn cmd_status(manager: &CredentialManager) -> Result<()> {
    let record = match manager.store().load() {
        Ok(record) => record,
        Err(e) => {
            println!("Not authorized: {}", e);
            return Ok(());
        }
    };

    println!("Token file: {}", manager.store().path().display());
    println!("  Type: {}", record.token_type);
    match record.expiry {
        Some(expiry) => println!("  Expires: {}", expiry),
        None => println!("  Expires: never"),
    }
    println!(
        "  Refresh token: {}",
        if record.can_refresh() { "present" } else { "absent" }
    );
    Ok(())
}

/// Delete the cached credential.
async fn cmd_logout(manager: &CredentialManager) -> Result<()> {
    manager.logout().await.context("Unable to remove token file")?;
    println!("Removed {}", manager.store().path().display());
    Ok(())
}

/// Create a folder.
async fn cmd_mkdir(drive: &DriveClient, name: &str, parent: &str) -> Result<()> {
    info!("Creating folder {} under {}", name, parent);

    let folder = drive
        .create_folder(name, parent)
        .await
        .context("Could not create folder")?;

    println!("Created folder: {} ({})", folder.name, folder.id);
    if let Some(link) = &folder.web_view_link {
        println!("  Link: {}", link);
    }
    Ok(())
}

/// Rename a folder.
async fn cmd_rename(drive: &DriveClient, id: &str, name: &str) -> Result<()> {
    let folder = drive
        .rename_folder(id, name)
        .await
        .context("Could not rename folder")?;

    println!("Renamed folder: {} ({})", folder.name, folder.id);
    Ok(())
}

/// Create an empty file.
async fn cmd_touch(
    drive: &DriveClient,
    name: &str,
    parent: &str,
    kind: Option<FileKind>,
    mime: Option<String>,
) -> Result<()> {
    let mime = match (kind, mime) {
        (Some(FileKind::Doc), _) => DOCUMENT_MIME_TYPE.to_string(),
        (Some(FileKind::Sheet), _) => SPREADSHEET_MIME_TYPE.to_string(),
        (None, Some(mime)) => mime,
        (None, None) => anyhow::bail!("Specify --kind or --mime"),
    };

    let file = drive
        .create_file(name, &mime, parent)
        .await
        .context("Could not create file")?;

    println!("Created file '{}' ({})", file.name, file.id);
    Ok(())
}

/// List a folder.
async fn cmd_ls(drive: &DriveClient, folder: &str) -> Result<()> {
    let folder_id = if folder.contains('/') {
        folder_id_from_link(folder)
            .with_context(|| format!("Cannot find a folder ID in {}", folder))?
    } else {
        folder
    };

    let files = drive
        .list_files(folder_id)
        .await
        .context("Could not list folder")?;

    if files.is_empty() {
        println!("Folder is empty.");
    } else {
        for file in &files {
            print_file(file);
        }
    }
    Ok(())
}

fn print_file(file: &DriveFile) {
    let marker = if file.is_folder() { "[DIR] " } else { "[FILE]" };
    println!("  {} {}  {}  {}", marker, file.name, file.mime_type, file.id);
}

/// Print a folder link.
async fn cmd_link(drive: &DriveClient, id: &str) -> Result<()> {
    let link = drive
        .folder_link(id)
        .await
        .context("Could not get folder link")?;

    println!("{}", link);
    Ok(())
}

/// Share a file or folder.
async fn cmd_share(
    drive: &DriveClient,
    id: &str,
    email: &str,
    role: RoleArg,
    grantee: GranteeArg,
) -> Result<()> {
    let grant = PermissionGrant {
        grantee_type: grantee.into(),
        role: role.into(),
        email_address: Some(email.to_string()),
    };

    let permission = drive
        .grant_permission(id, &grant)
        .await
        .context("Error while creating permission for file")?;

    println!("Granted {} to {} ({})", permission.role, email, permission.id);
    Ok(())
}

/// List permissions.
async fn cmd_permissions(drive: &DriveClient, id: &str) -> Result<()> {
    let permissions = drive
        .list_permissions(id)
        .await
        .context("Error while getting permission list")?;

    println!("Users having access to {}:", id);
    for permission in permissions {
        println!(
            "  {:<10} {:<8} {}",
            permission.role,
            permission.grantee_type,
            permission
                .email_address
                .or(permission.display_name)
                .unwrap_or_else(|| permission.id.clone())
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_share() {
        let cli = Cli::try_parse_from([
            "drivekit", "share", "f1", "--email", "a@example.com", "--role", "reader",
        ])
        .unwrap();

        match cli.command {
            Commands::Drive(DriveCommand::Share {
                id, email, role, ..
            }) => {
                assert_eq!(id, "f1");
                assert_eq!(email, "a@example.com");
                assert_eq!(Role::from(role), Role::Reader);
            }
            _ => panic!("expected share"),
        }
    }

    #[test]
    fn test_needs_reauthorization_looks_through_context() {
        let expired = anyhow::Error::from(drivekit_common::Error::AuthExpired("revoked".into()))
            .context("Could not list folder");
        assert!(needs_reauthorization(&expired));

        let offline = anyhow::Error::from(drivekit_common::Error::Network("refused".into()))
            .context("Could not list folder");
        assert!(!needs_reauthorization(&offline));
    }

    #[tokio::test]
    async fn test_auth_commands_without_client_credentials() {
        let temp = tempfile::TempDir::new().unwrap();
        let credentials = temp.path().join("missing-credentials.json");
        let credentials = credentials.to_str().unwrap();
        let token = temp.path().join("token.json");
        let token = token.to_str().unwrap();

        for action in ["status", "logout"] {
            let cli = Cli::try_parse_from([
                "drivekit", "--credentials", credentials, "--token", token, "auth", action,
            ])
            .unwrap();
            run(cli).await.unwrap();
        }

        let cli = Cli::try_parse_from([
            "drivekit", "--credentials", credentials, "--token", token, "auth", "login",
        ])
        .unwrap();
        assert!(run(cli).await.is_err());
    }

    #[test]
    fn test_touch_kind_conflicts_with_mime() {
        let result = Cli::try_parse_from([
            "drivekit", "touch", "x", "--kind", "doc", "--mime", "text/plain",
        ]);
        assert!(result.is_err());
    }
}
