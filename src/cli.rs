//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Search and fetch torrents from Kinozal.
///
/// Credentials and paths come from the environment (`KZ_USER`, `KZ_PASS`,
/// `KZ_ADDR`, `KZ_COOKIE_FILE`, ...).
#[derive(Parser, Debug)]
#[command(name = "kinozal")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Log in and persist the session cookies
    Login,

    /// Search the catalog
    Search {
        /// Free-text query
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Search on behalf of this user id (applies the allow-list and cooldown)
        #[arg(short, long)]
        user: Option<i64>,

        /// Show at most this many results (1-100)
        #[arg(short, long, default_value_t = 20, value_parser = clap::value_parser!(u16).range(1..=100))]
        limit: u16,
    },

    /// Download a torrent file by listing id
    Download {
        /// Listing id from search results
        id: String,

        /// Hand the file to transmission-remote, downloading into this directory
        #[arg(long, value_name = "DIR")]
        submit: Option<PathBuf>,

        /// Remote client program used with --submit
        #[arg(long, default_value = "transmission-remote", requires = "submit")]
        remote: String,

        /// Extra argument for the remote client, placed before --add (repeatable)
        #[arg(long = "remote-arg", value_name = "ARG", allow_hyphen_values = true, requires = "submit")]
        remote_args: Vec<String>,
    },

    /// Manage the user allow-list
    Users {
        #[command(subcommand)]
        action: UsersAction,
    },
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum UsersAction {
    /// Allow a user id
    Add {
        /// User id (positive integer)
        id: i64,
    },
    /// Remove a user id
    Remove {
        /// User id (positive integer)
        id: i64,
    },
    /// List allowed user ids
    List,
}
