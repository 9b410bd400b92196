//! rootfs command line
//!
//! Drives a filesystem view the same way a wire-protocol layer would, for
//! checking an elevation setup on a device.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use rootfs::config::{default_config_path, Config};
use rootfs::{FileNode, FileSystemView, SessionContext};
use tracing_subscriber::EnvFilter;

/// Browse and modify a filesystem through an elevation shell.
#[derive(Parser, Debug)]
#[command(name = "rootfs")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List a directory
    Ls {
        /// Directory to list (defaults to the configured home)
        path: Option<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show metadata for a path
    Stat {
        /// Path to inspect
        path: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Write a file's content to stdout
    Cat {
        /// File to read
        path: String,

        /// Requested start offset (not honoured by the elevation shell)
        #[arg(long, default_value = "0")]
        offset: u64,
    },

    /// Create a directory
    Mkdir {
        /// Directory to create
        path: String,
    },

    /// Remove a file or directory recursively
    Rm {
        /// Path to remove
        path: String,
    },

    /// Rename or move a path
    Mv {
        /// Existing path
        source: String,

        /// New path
        destination: String,
    },

    /// Inspect or create the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Subcommands for configuration management.
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long, short)]
        force: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = Config::load(&config_path)?;
    config.apply_env_overrides();

    // Initialize tracing; RUST_LOG wins over the configured level
    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.to_lowercase()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    tracing::debug!("Using config file: {:?}", config_path);

    if let Commands::Config(cmd) = &cli.command {
        return run_config_command(cmd, &config, &config_path);
    }

    config.validate()?;
    let view = FileSystemView::from_config(&config, SessionContext::local())?;

    match cli.command {
        Commands::Ls { path, json } => {
            let dir = view.resolve(path.as_deref().unwrap_or(view.home()))?;
            if !dir.exists() {
                anyhow::bail!("{}: no such file or directory", dir.absolute_path());
            }
            let children = view.list(&dir);
            if json {
                let attrs: Vec<_> = children.iter().map(FileNode::attributes).collect();
                println!("{}", serde_json::to_string_pretty(&attrs)?);
            } else {
                print_listing(&children);
            }
        }
        Commands::Stat { path, json } => {
            let node = view.resolve(&path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&node.attributes())?);
            } else {
                print_stat(&node);
            }
        }
        Commands::Cat { path, offset } => {
            let node = view.resolve(&path)?;
            let mut stream = node
                .create_input_stream(offset)
                .with_context(|| format!("Failed to read {}", node.absolute_path()))?;
            let mut stdout = io::stdout().lock();
            io::copy(&mut stream, &mut stdout)?;
            stdout.flush()?;
        }
        Commands::Mkdir { path } => {
            let node = view.resolve(&path)?;
            if !node.mkdir() {
                anyhow::bail!("Failed to create directory {}", node.absolute_path());
            }
        }
        Commands::Rm { path } => {
            let node = view.resolve(&path)?;
            if !node.delete() {
                anyhow::bail!("Failed to remove {}", node.absolute_path());
            }
        }
        Commands::Mv {
            source,
            destination,
        } => {
            let from = view.resolve(&source)?;
            let to = view.resolve(&destination)?;
            if !from.move_to(&to) {
                anyhow::bail!(
                    "Failed to move {} to {}",
                    from.absolute_path(),
                    to.absolute_path()
                );
            }
        }
        Commands::Config(_) => unreachable!("handled above"),
    }

    Ok(())
}

fn run_config_command(
    cmd: &ConfigCommands,
    config: &Config,
    config_path: &Path,
) -> anyhow::Result<()> {
    match cmd {
        ConfigCommands::Show => {
            print!("{}", config.to_toml()?);
        }
        ConfigCommands::Init { force } => {
            if config_path.exists() && !force {
                anyhow::bail!(
                    "Config file already exists: {} (use --force to overwrite)",
                    config_path.display()
                );
            }
            Config::default().save(config_path)?;
            println!("Wrote default configuration to {}", config_path.display());
        }
    }
    Ok(())
}

fn print_listing(children: &[FileNode]) {
    if children.is_empty() {
        println!("(empty)");
        return;
    }
    for child in children {
        println!(
            "{} {:>12} {}",
            type_char(child),
            child.size(),
            child.name()
        );
    }
}

fn print_stat(node: &FileNode) {
    let attrs = node.attributes();
    println!("  Path:     {}", attrs.path);
    println!("  Exists:   {}", attrs.exists);
    if !attrs.exists {
        return;
    }
    println!("  Type:     {:?}", attrs.kind);
    println!("  Size:     {}", attrs.size);
    println!("  Mode:     {:o}", attrs.mode);
    println!("  Modified: {}", attrs.modified);
    if let Some(target) = attrs.symlink_target {
        println!("  Target:   {}", target);
    }
}

fn type_char(node: &FileNode) -> char {
    if node.is_directory() {
        'd'
    } else if node.is_file() {
        '-'
    } else {
        '?'
    }
}
