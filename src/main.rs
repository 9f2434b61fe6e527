use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::fs::File;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, Level};
use tracing_subscriber::{fmt, EnvFilter};

use easysftp::config::{AppConfig, ConfigManager};
use easysftp::sftp_logic::parser::parse_listing;
use easysftp::sftp_logic::path_utils::{base_name, parent_path};
use easysftp::sftp_logic::transfer::{transfer, TransferOutcome};
use easysftp::sftp_logic::tree::{DirTree, NodeId, TreeNode};
use easysftp::sftp_logic::{BackendKind, Connection, SameBackendMode, Transport};

#[derive(Debug, Parser)]
#[command(
    name = "easysftp",
    version,
    about = "Browse and move files between this machine and an SFTP host"
)]
struct Cli {
    /// Host alias from hosts.toml or ~/.ssh/config
    #[arg(long, global = true)]
    host: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print a directory tree, listing `depth` levels
    Tree {
        backend: BackendKind,
        path: Option<String>,
        #[arg(long)]
        depth: Option<usize>,
        /// Emit the rows as JSON
        #[arg(long)]
        json: bool,
    },

    /// List one directory
    Ls { backend: BackendKind, path: String },

    /// Drop SRC into DEST_DIR, as a drag-and-drop would.
    ///
    /// Endpoints are written `local:/path` or `remote:/path`.
    Transfer {
        src: Endpoint,
        dest_dir: Endpoint,
        /// Move instead of copy when both ends are on the same backend
        #[arg(long = "move")]
        move_entry: bool,
    },

    /// Recursively copy REMOTE to LOCAL
    Download { remote: String, local: String },

    /// Recursively copy LOCAL to REMOTE
    Upload { local: String, remote: String },

    /// Show where configuration is read from
    ConfigPath,
}

impl Command {
    fn needs_remote(&self) -> bool {
        match self {
            Command::Tree { backend, .. } | Command::Ls { backend, .. } => {
                *backend == BackendKind::Remote
            }
            Command::Transfer { src, dest_dir, .. } => {
                src.backend == BackendKind::Remote || dest_dir.backend == BackendKind::Remote
            }
            Command::Download { .. } | Command::Upload { .. } => true,
            Command::ConfigPath => false,
        }
    }
}

#[derive(Debug, Clone)]
struct Endpoint {
    backend: BackendKind,
    path: String,
}

impl FromStr for Endpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (backend, path) = s
            .split_once(':')
            .ok_or_else(|| format!("expected local:/path or remote:/path, got '{}'", s))?;
        if path.is_empty() {
            return Err(format!("missing path in '{}'", s));
        }
        Ok(Self {
            backend: backend.parse()?,
            path: path.to_string(),
        })
    }
}

fn init_logging(log_dir: &Path) -> Result<()> {
    if !log_dir.exists() {
        std::fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    let log_file = log_dir.join(format!(
        "easysftp_{}.log",
        Local::now().format("%Y%m%d_%H%M%S")
    ));
    let file = File::create(&log_file).context("Failed to create log file")?;

    fmt()
        .with_max_level(Level::DEBUG)
        .with_env_filter(EnvFilter::from_default_env().add_directive("easysftp=debug".parse()?))
        .with_ansi(false)
        .with_writer(file)
        .init();
    Ok(())
}

async fn open_connection(
    manager: &ConfigManager,
    config: &AppConfig,
    alias: Option<&str>,
    needs_remote: bool,
) -> Result<Connection> {
    if !needs_remote {
        return Ok(Connection::local_only().with_conflict_policy(config.conflict_policy));
    }

    let alias = alias
        .or(config.default_host.as_deref())
        .context("No host given: pass --host ALIAS or set default_host")?;
    let host = manager
        .find_host(alias, Path::new(&config.ssh_file_config))?
        .with_context(|| format!("Unknown host '{}'", alias))?;
    let settings = host.connection_settings(config.connect_timeout(), config.operation_timeout())?;

    let connection = Connection::new(settings).with_conflict_policy(config.conflict_policy);
    connection
        .connect()
        .await
        .with_context(|| format!("Failed to connect to '{}'", alias))?;
    Ok(connection)
}

/// Load the node at `path` the way a pane would: list its parent and pick the child
async fn locate(
    connection: &Connection,
    backend: BackendKind,
    path: &str,
    expand_directory: bool,
) -> Result<(DirTree, NodeId)> {
    let name = base_name(path);
    if name.is_empty() || name == "~" || name == "." {
        let mut tree = DirTree::new(backend, path);
        let root = tree.root();
        if expand_directory {
            tree.expand(root, connection).await?;
        }
        return Ok((tree, root));
    }

    let mut tree = DirTree::new(backend, parent_path(path));
    let root = tree.root();
    tree.expand(root, connection).await?;
    let id = tree
        .find_child(root, name)
        .with_context(|| format!("{}:{} does not exist", backend, path))?;
    if expand_directory && tree.node(id).is_some_and(TreeNode::is_directory) {
        tree.expand(id, connection).await?;
    }
    Ok((tree, id))
}

async fn run(
    command: Command,
    connection: &Connection,
    manager: &ConfigManager,
    config: &AppConfig,
) -> Result<()> {
    match command {
        Command::Tree {
            backend,
            path,
            depth,
            json,
        } => {
            let root_path = path.unwrap_or_else(|| match backend {
                BackendKind::Local => config.local_root.clone(),
                BackendKind::Remote => config.remote_root.clone(),
            });
            let mut tree = DirTree::new(backend, root_path);
            let root = tree.root();
            tree.populate(root, depth.unwrap_or(config.eager_depth), connection)
                .await?;

            let rows = tree.visible_rows();
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                println!("{}", tree.root_path());
                for row in rows {
                    let marker = if row.is_dir { "/" } else { "" };
                    println!(
                        "{}{}{}  {}",
                        "  ".repeat(row.depth + 1),
                        row.name,
                        marker,
                        row.size
                    );
                }
            }
        }
        Command::Ls { backend, path } => {
            let lines = connection.list_directory(&path, backend).await?;
            for entry in parse_listing(&lines) {
                println!(
                    "{:<11} {:>6} {:<12} {:<8} {}",
                    entry.permissions,
                    entry.size,
                    entry.modified,
                    entry.file_type(),
                    entry.name
                );
            }
        }
        Command::Transfer {
            src,
            dest_dir,
            move_entry,
        } => {
            let (src_tree, src_id) = locate(connection, src.backend, &src.path, false).await?;
            let (dst_tree, dst_id) =
                locate(connection, dest_dir.backend, &dest_dir.path, true).await?;
            let payload = src_tree
                .drag_payload(src_id)
                .with_context(|| format!("{} cannot be transferred", src.path))?;
            let target = dst_tree
                .drop_target(dst_id)
                .with_context(|| format!("{} cannot receive a drop", dest_dir.path))?;

            let mode = if move_entry {
                SameBackendMode::Move
            } else {
                SameBackendMode::Copy
            };
            let outcome = transfer(connection, &payload, &target, mode).await?;
            if let TransferOutcome::Completed { destination, .. } = &outcome {
                info!("Transfer finished at {}", destination);
            }
            let (action, stats) = outcome.into_result()?;
            println!(
                "{} {} -> {} ({} copied, {} skipped)",
                action.label(),
                payload.path,
                target.path,
                stats.files_copied,
                stats.files_skipped
            );
        }
        Command::Download { remote, local } => {
            let stats = connection.download(&remote, &local).await?;
            println!(
                "Downloaded {}: {} files, {} skipped, {} bytes",
                remote, stats.files_copied, stats.files_skipped, stats.bytes
            );
        }
        Command::Upload { local, remote } => {
            let stats = connection.upload(&local, &remote).await?;
            println!(
                "Uploaded {}: {} files, {} skipped, {} bytes",
                local, stats.files_copied, stats.files_skipped, stats.bytes
            );
        }
        Command::ConfigPath => {
            println!("config: {}", manager.get_config_path().display());
            println!("hosts:  {}", manager.get_hosts_path().display());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let manager = ConfigManager::new()?;
    init_logging(&manager.get_config_dir().join("logs"))?;
    debug!("Starting easysftp");

    let config = manager.load_config()?;

    let connection = open_connection(
        &manager,
        &config,
        cli.host.as_deref(),
        cli.command.needs_remote(),
    )
    .await?;

    let result = run(cli.command, &connection, &manager, &config).await;

    if let Err(e) = connection.disconnect().await {
        tracing::warn!("Disconnect failed: {}", e);
    }
    result
}
