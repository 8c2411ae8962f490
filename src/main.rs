//! CLI entry point for the kinozal tool.

use anyhow::{Context, Result, bail};
use clap::Parser;
use kinozal_core::config::users_file_from_env;
use kinozal_core::{AllowList, Config, SearchResult, Tracker, TransmissionRemote};
use tracing::{debug, info, warn};

mod cli;

use cli::{Args, Command, UsersAction};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    if let Command::Users { action } = &args.command {
        return manage_users(action);
    }

    let config = Config::from_env().context("loading configuration from the environment")?;

    // Dropping the command future on Ctrl-C cancels the in-flight request.
    tokio::select! {
        result = run(args.command, config) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted; abandoning in-flight request");
            bail!("interrupted")
        }
    }
}

async fn run(command: Command, config: Config) -> Result<()> {
    let users_file = config.users_file.clone();
    let admin_id = config.admin_id;
    let tracker = Tracker::new(config)?;

    match command {
        Command::Login => {
            let session = tracker.login().await?;
            info!(cookies = ?session.cookie_names(), "session saved");
        }
        Command::Search { query, user, limit } => {
            let query = query.join(" ");
            let results = if let Some(user_id) = user {
                let allow_list = AllowList::load(&users_file)?;
                if !allow_list.is_allowed(user_id, admin_id) {
                    bail!("user {user_id} is not on the allow-list");
                }
                tracker.search_as(user_id, &query).await?
            } else {
                tracker.search(&query).await?
            };
            print_results(&results, usize::from(limit));
        }
        Command::Download {
            id,
            submit,
            remote,
            remote_args,
        } => {
            if let Some(download_dir) = submit {
                let submitter = TransmissionRemote::new(remote).with_connection_args(remote_args);
                let submission = tracker
                    .fetch_and_submit(&id, &download_dir, &submitter)
                    .await?;
                println!(
                    "submitted {} ({} bytes) into {}",
                    submission.torrent_id,
                    submission.bytes,
                    download_dir.display()
                );
            } else {
                let outcome = tracker.download(&id).await?;
                println!("{}", outcome.path.display());
            }
        }
        Command::Users { action } => manage_users(&action)?,
    }

    Ok(())
}

fn manage_users(action: &UsersAction) -> Result<()> {
    let path = users_file_from_env();
    let mut allow_list = AllowList::load(&path)
        .with_context(|| format!("loading allow-list {}", path.display()))?;

    match action {
        UsersAction::Add { id } => {
            if allow_list.add(*id)? {
                println!("user {id} added");
            } else {
                println!("user {id} is already allowed");
            }
        }
        UsersAction::Remove { id } => {
            if allow_list.remove(*id)? {
                println!("user {id} removed");
            } else {
                println!("user {id} was not allowed");
            }
        }
        UsersAction::List => {
            if allow_list.list().is_empty() {
                println!("no allowed users");
            }
            for id in allow_list.list() {
                println!("{id}");
            }
        }
    }
    Ok(())
}

fn print_results(results: &[SearchResult], limit: usize) {
    if results.is_empty() {
        println!("nothing found");
        return;
    }
    for result in results.iter().take(limit) {
        println!(
            "{:>9}  {:>5}  {:>10}  {}",
            result.id, result.seeders, result.size, result.title
        );
    }
    if results.len() > limit {
        info!(shown = limit, total = results.len(), "more results available");
    }
}
