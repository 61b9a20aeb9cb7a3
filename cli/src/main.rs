mod commands;
mod config;
mod remote_client;
mod server;
mod tls;

use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::{
    DailyFields, ExerciseFields, MealFields, cmd_calendar, cmd_daily_set, cmd_daily_show,
    cmd_exercise_add, cmd_exercise_delete, cmd_exercise_update, cmd_log_show, cmd_login,
    cmd_logout, cmd_meal_add, cmd_meal_delete, cmd_meal_update, cmd_whoami,
};
use crate::config::Config;
use crate::tls::TlsConfig;
use fitlog_core::backend::Backend;

#[derive(Parser)]
#[command(
    name = "fitlog",
    version,
    about = "A local-first workout and diet log",
    long_about = "A local-first workout and diet log.\n\n\
        Logs are kept in a JSON file on this device. After `fitlog login` they\n\
        are also saved to a sync server, which is read first and falls back to\n\
        the local copy when unreachable."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show everything logged for a date
    Log {
        #[command(subcommand)]
        command: LogCommands,
    },
    /// Log, edit or remove exercises
    Exercise {
        #[command(subcommand)]
        command: ExerciseCommands,
    },
    /// Log, edit or remove meals
    Meal {
        #[command(subcommand)]
        command: MealCommands,
    },
    /// Goals, water, steps, weight, meal notes and macros for a day
    Daily {
        #[command(subcommand)]
        command: DailyCommands,
    },
    /// Show a month with workout and diet days marked
    Calendar {
        /// Month to show (YYYY-MM, default: current month)
        #[arg(long)]
        month: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Sign in to a sync server
    Login {
        /// Server URL (e.g. https://192.168.1.20:8080)
        server: String,
        /// Your user id on that server
        user_id: String,
        /// API key printed by `fitlog serve`
        #[arg(long)]
        api_key: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Sign out; logs stay on this device only
    Logout {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the signed-in account
    Whoami {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the sync server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
        /// Enable TLS (HTTPS). Generates a self-signed certificate on first use.
        #[arg(long)]
        tls: bool,
        /// Path to TLS certificate file (PEM). Implies --tls.
        #[arg(long, value_name = "PATH")]
        tls_cert: Option<PathBuf>,
        /// Path to TLS private key file (PEM). Implies --tls.
        #[arg(long, value_name = "PATH")]
        tls_key: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum LogCommands {
    /// Show exercises, meals and daily fields (defaults to today)
    Show {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ExerciseCommands {
    /// Log an exercise
    Add {
        /// Exercise name
        name: String,
        #[command(flatten)]
        fields: ExerciseFields,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change an exercise; unspecified fields keep their value
    Update {
        /// Exercise ID
        id: String,
        /// New name
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        fields: ExerciseFields,
        /// Date the exercise is logged on (default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove an exercise
    Delete {
        /// Exercise ID
        id: String,
        /// Date the exercise is logged on (default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum MealCommands {
    /// Log a meal
    Add {
        /// Meal name
        name: String,
        #[command(flatten)]
        fields: MealFields,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change a meal; unspecified fields keep their value
    Update {
        /// Meal ID
        id: String,
        /// New name
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        fields: MealFields,
        /// Date the meal is logged on (default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a meal
    Delete {
        /// Meal ID
        id: String,
        /// Date the meal is logged on (default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum DailyCommands {
    /// Set daily fields
    Set {
        #[command(flatten)]
        fields: DailyFields,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show daily fields
    Show {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let default_level = if matches!(cli.command, Commands::Serve { .. }) {
        "info"
    } else {
        "warn"
    };
    init_tracing(default_level);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;

    match cli.command {
        Commands::Log { command } => match command {
            LogCommands::Show { date, json } => cmd_log_show(&config, date, json).await,
        },
        Commands::Exercise { command } => match command {
            ExerciseCommands::Add {
                name,
                fields,
                date,
                json,
            } => cmd_exercise_add(&config, name, fields, date, json).await,
            ExerciseCommands::Update {
                id,
                name,
                fields,
                date,
                json,
            } => cmd_exercise_update(&config, &id, name, fields, date, json).await,
            ExerciseCommands::Delete { id, date, json } => {
                cmd_exercise_delete(&config, &id, date, json).await
            }
        },
        Commands::Meal { command } => match command {
            MealCommands::Add {
                name,
                fields,
                date,
                json,
            } => cmd_meal_add(&config, name, fields, date, json).await,
            MealCommands::Update {
                id,
                name,
                fields,
                date,
                json,
            } => cmd_meal_update(&config, &id, name, fields, date, json).await,
            MealCommands::Delete { id, date, json } => {
                cmd_meal_delete(&config, &id, date, json).await
            }
        },
        Commands::Daily { command } => match command {
            DailyCommands::Set { fields, date, json } => {
                cmd_daily_set(&config, fields, date, json).await
            }
            DailyCommands::Show { date, json } => cmd_daily_show(&config, date, json).await,
        },
        Commands::Calendar { month, json } => cmd_calendar(&config, month.as_deref(), json).await,
        Commands::Login {
            server,
            user_id,
            api_key,
            json,
        } => cmd_login(&config, &server, &user_id, api_key, json),
        Commands::Logout { json } => cmd_logout(&config, json),
        Commands::Whoami { json } => cmd_whoami(&config, json),
        Commands::Serve {
            port,
            bind,
            no_auth,
            tls,
            tls_cert,
            tls_key,
        } => {
            let api_key = if no_auth {
                None
            } else {
                Some(config.load_or_create_api_key()?.0)
            };
            let tls_config = if tls || tls_cert.is_some() || tls_key.is_some() {
                Some(TlsConfig::resolve(&config.tls_dir(), tls_cert, tls_key)?)
            } else {
                None
            };
            let backend = Backend::open(&config.backend_path)?;
            server::start_server(backend, port, &bind, api_key, tls_config).await
        }
    }
}
