//! grit CLI - minimal git plumbing and clone.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// grit - minimal content-addressed version control
#[derive(Parser, Debug)]
#[command(name = "grit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize a repository in the current directory
    Init,

    /// Compute a blob id, optionally writing the object
    HashObject {
        /// Write the object into the store
        #[arg(short = 'w')]
        write: bool,
        /// File to hash
        path: PathBuf,
    },

    /// Print the payload of an object
    CatFile {
        /// Pretty-print the object content
        #[arg(short = 'p')]
        pretty: bool,
        /// Object id
        sha: String,
    },

    /// List the entries of a tree object
    LsTree {
        /// Print entry names only
        #[arg(long)]
        name_only: bool,
        /// Tree id
        sha: String,
    },

    /// Write the current directory as a tree object
    WriteTree,

    /// Create a commit object from a tree
    CommitTree {
        /// Tree id
        tree: String,
        /// Parent commit id
        #[arg(short = 'p')]
        parent: Option<String>,
        /// Commit message
        #[arg(short = 'm')]
        message: String,
    },

    /// Clone a remote repository over smart HTTP
    Clone {
        /// Repository URL
        url: String,
        /// Destination directory
        dir: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("grit={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cwd = PathBuf::from(".");
    let result = match cli.command {
        Commands::Init => commands::init(&cwd),
        Commands::HashObject { write, path } => commands::hash_object(&cwd, &path, write),
        Commands::CatFile { pretty, sha } => {
            if !pretty {
                eprintln!("Error: cat-file requires -p");
                std::process::exit(1);
            }
            commands::cat_file(&cwd, &sha)
        }
        Commands::LsTree { name_only, sha } => commands::ls_tree(&cwd, &sha, name_only),
        Commands::WriteTree => commands::write_tree(&cwd),
        Commands::CommitTree {
            tree,
            parent,
            message,
        } => commands::commit_tree(&cwd, &tree, parent.as_deref(), &message),
        Commands::Clone { url, dir } => commands::clone(&url, &dir),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
