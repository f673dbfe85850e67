use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use slitlamp_labeler::labels::{LabelStore, all_user_statistics, merge_statistics};
use slitlamp_labeler::{CredentialStore, LabelerConfig, Role, RouteStrategy, run_preprocessing};

#[derive(Parser)]
#[command(name = "slitlamp")]
#[command(version)]
#[command(about = "Preprocess, administer and report on slit-lamp labeling data", long_about = None)]
struct Cli {
    /// JSON configuration file (built-in defaults when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Join the sources, compute linkage flags and write the join cache
    Preprocess {
        /// Cache file to write (configured cache path when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Label statistics across all users
    Stats {
        /// Print JSON instead of a text summary
        #[arg(long)]
        json: bool,
    },

    /// Provision the user store with the default admin account
    Init,

    /// Add an account to the user store
    CreateUser {
        username: String,
        password: String,

        #[arg(short, long, value_enum, default_value_t = RoleArg::Labeler)]
        role: RoleArg,

        /// Order the user walks through the images
        #[arg(long, value_enum, default_value_t = RouteArg::Forward)]
        route: RouteArg,
    },

    /// Write one user's labels as CSV
    Export {
        username: String,
        output: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    Admin,
    Labeler,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Admin => Self::Admin,
            RoleArg::Labeler => Self::Labeler,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum RouteArg {
    Forward,
    Backward,
    #[value(name = "middle_out", alias = "middle-out")]
    MiddleOut,
    Random,
}

impl From<RouteArg> for RouteStrategy {
    fn from(route: RouteArg) -> Self {
        match route {
            RouteArg::Forward => Self::Forward,
            RouteArg::Backward => Self::Backward,
            RouteArg::MiddleOut => Self::MiddleOut,
            RouteArg::Random => Self::Random,
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => LabelerConfig::from_file(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => LabelerConfig::default(),
    };

    match cli.command {
        Commands::Preprocess { output } => {
            let Some(output) = output.or_else(|| config.cache_path.clone()) else {
                bail!("no output given and no cache path configured");
            };
            let summary = run_preprocessing(&config, &output).context("preprocessing failed")?;
            print!("{}", summary.to_text());
        }
        Commands::Stats { json } => {
            let users = all_user_statistics(&config.labels_dir)?;
            let (overall, detailed) = merge_statistics(&users);
            if json {
                let report = serde_json::json!({
                    "users": users,
                    "overall": overall,
                    "detailed": detailed,
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for user in &users {
                    println!(
                        "{}: {} labels, {} edited, {} in review (last modified {})",
                        user.username,
                        user.statistics.total,
                        user.statistics.edited,
                        user.review_queue,
                        user.last_modified
                    );
                }
                println!("Total: {} labels from {} users", overall.total, users.len());
                for (condition, count) in &overall.by_condition {
                    println!("  {condition}: {count}");
                }
            }
        }
        Commands::Init => {
            let store = CredentialStore::open(&config.users_file)?;
            std::fs::create_dir_all(&config.labels_dir)?;
            info!(
                "User store at {} has {} accounts",
                store.path().display(),
                store.list_users().len()
            );
        }
        Commands::CreateUser {
            username,
            password,
            role,
            route,
        } => {
            let mut store = CredentialStore::open(&config.users_file)?;
            store.create_user(&username, &password, role.into(), route.into())?;
        }
        Commands::Export { username, output } => {
            let store = LabelStore::open(&config.labels_dir, &username)?;
            let rows = store.export_csv(&output)?;
            info!("Exported {rows} labels of {username} to {}", output.display());
        }
    }
    Ok(())
}
