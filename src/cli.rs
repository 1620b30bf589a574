use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    version = env!("CARGO_PKG_VERSION"),
    about = "expando - prefix-triggered text macros",
    long_about = "expando replaces typed triggers such as /sig with stored text, \
                  and offers a searchable list of triggers on a global hotkey."
)]
pub struct Expando {
    #[clap(long, short, global = true, help = "Log at debug level")]
    pub verbose: bool,

    #[clap(subcommand)]
    pub commands: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add a new expansion
    #[clap(group(ArgGroup::new("source").required(true).args(["body", "file"])))]
    Add {
        #[clap(long, short, help = "Trigger, including the prefix (e.g. /sig)")]
        trigger: String,

        #[clap(long, short, help = "Text the trigger expands to")]
        body: Option<String>,

        #[clap(long, short, help = "Read the expansion text from a file")]
        file: Option<PathBuf>,
    },
    /// Remove an expansion by trigger
    Remove {
        #[clap(long, short, help = "Trigger of the expansion to remove")]
        trigger: String,
    },
    /// Rename an expansion and/or change its text
    #[clap(group(ArgGroup::new("source").args(["body", "file"])))]
    Edit {
        #[clap(long, short, help = "Trigger of the expansion to edit")]
        trigger: String,

        #[clap(long, short, help = "New trigger")]
        new_trigger: Option<String>,

        #[clap(long, short, help = "New expansion text")]
        body: Option<String>,

        #[clap(long, short, help = "Read the new expansion text from a file")]
        file: Option<PathBuf>,
    },
    /// List all expansions with a preview of each
    List,
    /// Show the triggers the suggestion list would offer for FILTER
    Match { filter: String },
    /// Start the expansion daemon
    Start {
        #[clap(long, short = 'F', help = "Stay in the foreground")]
        foreground: bool,
    },
    /// Stop the expansion daemon
    Stop,
    /// Check whether the daemon is running
    Status,
    /// Show file locations and active settings
    Config,
    // Runs the daemon body in the current process
    #[clap(hide = true)]
    DaemonWorker,
}
