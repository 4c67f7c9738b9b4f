//! pair-admin - Manage posting times and user accounts

use std::io::Read;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use libpairpost::content::FilesystemContent;
use libpairpost::logging::{LogFormat, LoggingConfig};
use libpairpost::{Config, PairpostError, Result, ScheduleEntry, ScheduleStore, UserStore};

#[derive(Parser, Debug)]
#[command(name = "pair-admin")]
#[command(version)]
#[command(about = "Manage pairpost posting times and user accounts")]
#[command(long_about = "\
pair-admin - Manage pairpost posting times and user accounts

USAGE:
    pair-admin schedule list
    pair-admin schedule add 09:30
    pair-admin schedule remove 09:30

    pair-admin users list --format json
    pair-admin users add alice --stdin < token.txt
    PAIRPOST_ACCESS_TOKEN=... pair-admin users add alice
    pair-admin users remove alice

Changes take effect the next time pair-send starts.

EXIT CODES:
    0 - Success
    1 - Runtime error
    2 - Configuration error
    3 - Invalid input
")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "PATH", env = "PAIRPOST_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Daily posting times
    Schedule {
        #[command(subcommand)]
        action: ScheduleAction,
    },

    /// Posting accounts
    Users {
        #[command(subcommand)]
        action: UsersAction,
    },
}

#[derive(Subcommand, Debug)]
enum ScheduleAction {
    /// List posting times
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Add a posting time (HH:MM, local time)
    Add { time: String },

    /// Remove a posting time
    Remove { time: String },
}

#[derive(Subcommand, Debug)]
enum UsersAction {
    /// List users (tokens are never shown)
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Add a user, or replace the token of an existing one
    ///
    /// Prefer --stdin or PAIRPOST_ACCESS_TOKEN: a token given as an argument
    /// ends up in shell history and process listings.
    Add {
        username: String,

        /// Threads access token
        #[arg(env = "PAIRPOST_ACCESS_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Read the access token from stdin (for automation)
        #[arg(long)]
        stdin: bool,
    },

    /// Remove a user
    Remove { username: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    LoggingConfig::new(LogFormat::Text, level).init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Schedule { action } => {
            let mut store = ScheduleStore::load(config.schedule_file())?;
            match action {
                ScheduleAction::List { format } => cmd_schedule_list(&store, format),
                ScheduleAction::Add { time } => cmd_schedule_add(&mut store, &time),
                ScheduleAction::Remove { time } => cmd_schedule_remove(&mut store, &time),
            }
        }
        Commands::Users { action } => {
            let mut store = UserStore::load(config.users_file())?;
            match action {
                UsersAction::List { format } => {
                    let content = FilesystemContent::new(config.content_root(), config.replies_root());
                    cmd_users_list(&store, &content, format)
                }
                UsersAction::Add {
                    username,
                    token,
                    stdin,
                } => {
                    let token = read_token(token, stdin)?;
                    cmd_users_add(&mut store, &username, &token)
                }
                UsersAction::Remove { username } => cmd_users_remove(&mut store, &username),
            }
        }
    }
}

fn cmd_schedule_list(store: &ScheduleStore, format: OutputFormat) -> Result<()> {
    let times: Vec<String> = store.entries().iter().map(ToString::to_string).collect();

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({ "schedule": times }))?,
        OutputFormat::Text => {
            if times.is_empty() {
                eprintln!("No posting times scheduled");
            }
            for time in times {
                println!("{}", time);
            }
        }
    }
    Ok(())
}

fn cmd_schedule_add(store: &mut ScheduleStore, time: &str) -> Result<()> {
    let entry: ScheduleEntry = time.parse()?;
    if store.add(entry)? {
        println!("Added {}", entry);
    } else {
        println!("{} is already scheduled", entry);
    }
    Ok(())
}

fn cmd_schedule_remove(store: &mut ScheduleStore, time: &str) -> Result<()> {
    let entry: ScheduleEntry = time.parse()?;
    if !store.remove(entry)? {
        return Err(PairpostError::InvalidArgument(format!(
            "{} is not scheduled",
            entry
        )));
    }
    println!("Removed {}", entry);
    Ok(())
}

fn cmd_users_list(store: &UserStore, content: &FilesystemContent, format: OutputFormat) -> Result<()> {
    let users = store.users(content);

    match format {
        OutputFormat::Json => {
            let json: Vec<serde_json::Value> = users
                .iter()
                .map(|u| {
                    serde_json::json!({
                        "username": u.username,
                        "has_reply_folder": u.has_reply_capability,
                    })
                })
                .collect();
            print_json(&serde_json::Value::Array(json))?;
        }
        OutputFormat::Text => {
            if users.is_empty() {
                eprintln!("No users configured");
            }
            for user in users {
                let reply = if user.has_reply_capability { "reply" } else { "-" };
                println!("{} | {}", user.username, reply);
            }
        }
    }
    Ok(())
}

/// Resolve the access token from stdin, the environment or the argument
fn read_token(token: Option<String>, use_stdin: bool) -> Result<String> {
    if use_stdin {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .map_err(|e| PairpostError::Runtime(format!("cannot read token from stdin: {}", e)))?;
        return Ok(buffer);
    }

    token.ok_or_else(|| {
        PairpostError::InvalidArgument(
            "No access token given. Use --stdin or set PAIRPOST_ACCESS_TOKEN".to_string(),
        )
    })
}

fn cmd_users_add(store: &mut UserStore, username: &str, token: &str) -> Result<()> {
    let added = store.add(username, token)?;
    store.save()?;
    if added {
        println!("Added user {}", username);
    } else {
        println!("Updated token for {}", username);
    }
    Ok(())
}

fn cmd_users_remove(store: &mut UserStore, username: &str) -> Result<()> {
    if !store.remove(username) {
        return Err(PairpostError::InvalidArgument(format!(
            "No user named '{}'",
            username
        )));
    }
    store.save()?;
    println!("Removed user {}", username);
    Ok(())
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| PairpostError::Runtime(format!("cannot render output: {}", e)))?;
    println!("{}", json);
    Ok(())
}
