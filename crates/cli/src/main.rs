use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "kitty", about = "Import shared household expenses from CSV.")]
struct Cli {
    /// SQLite database (default: kitty.db in the platform data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Import settings TOML (default: import.toml in the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the household this database tracks.
    Init {
        name: String,
    },
    /// Manage household members.
    Members {
        #[command(subcommand)]
        command: MembersCommands,
    },
    /// Validate a file and show what an import would do.
    Preview {
        /// Transactions CSV
        file: PathBuf,
        /// Optional per-member splits CSV
        #[arg(long)]
        splits: Option<PathBuf>,
        /// Member doing the import (default: first member linked to a user)
        #[arg(long = "as")]
        as_member: Option<String>,
        /// Write rows with errors or warnings to this CSV
        #[arg(long)]
        issues_out: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Validate and commit a file.
    Import {
        file: PathBuf,
        #[arg(long)]
        splits: Option<PathBuf>,
        #[arg(long = "as")]
        as_member: Option<String>,
        /// Write rows the database rejected to this CSV
        #[arg(long)]
        failed_out: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum MembersCommands {
    /// Add a member. `--owner` lets them run imports.
    Add {
        name: String,
        #[arg(long)]
        owner: bool,
    },
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kitty=info,kitty_import=info,warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let dirs = directories::ProjectDirs::from("com", "kitty", "Kitty");
    let db_path = match cli.db {
        Some(path) => path,
        None => dirs
            .as_ref()
            .map(|d| d.data_dir().join("kitty.db"))
            .context("No data directory on this platform; pass --db")?,
    };
    let default_config = dirs.as_ref().map(|d| d.config_dir().join("import.toml"));
    let config = commands::load_config(cli.config.as_deref(), default_config.as_deref())?;
    let pool = commands::open_db(&db_path).await?;
    let today = chrono::Local::now().date_naive();

    match cli.command {
        Commands::Init { name } => {
            let id = commands::init(&pool, &name).await?;
            println!("Created household '{name}' ({id})");
        }
        Commands::Members { command } => match command {
            MembersCommands::Add { name, owner } => {
                let member = commands::add_member(&pool, &name, owner).await?;
                println!("Added {} ({})", member.display_name, member.id);
            }
            MembersCommands::List => {
                for member in commands::list_members(&pool).await? {
                    let owner = if member.user_id.is_some() { " (owner)" } else { "" };
                    println!("{}{owner}", member.display_name);
                }
            }
        },
        Commands::Preview {
            file,
            splits,
            as_member,
            issues_out,
            json,
        } => {
            let session = commands::Session::load(&pool, as_member.as_deref()).await?;
            let preview = commands::build_preview(&session, &config, today, &file, splits.as_deref())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&preview)?);
            } else {
                commands::print_preview(&preview);
            }
            if let Some(path) = issues_out {
                let count = commands::write_issues(&path, &preview)?;
                eprintln!("Wrote {count} rows to {}", path.display());
            }
        }
        Commands::Import {
            file,
            splits,
            as_member,
            failed_out,
            json,
        } => {
            let session = commands::Session::load(&pool, as_member.as_deref()).await?;
            let run = commands::run_import(&pool, &session, &config, today, &file, splits.as_deref()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&run)?);
            } else {
                commands::print_preview(&run.preview);
                commands::print_result(&run.result);
            }
            if let Some(path) = failed_out {
                commands::write_failures(&path, &run)?;
                eprintln!("Wrote {} failed rows to {}", run.result.failed_rows.len(), path.display());
            }
        }
    }

    Ok(())
}
