//! CLI command definitions
//!
//! Defines the clap commands for the scenario CLI.

use clap::Subcommand;
use std::path::PathBuf;

use crate::driver::BrowserKind;

#[derive(Subcommand)]
pub enum Commands {
    /// Create an empty scenario file
    New {
        /// Path of the scenario file (.wts)
        file: PathBuf,

        /// Scenario name (default: file name)
        #[arg(long)]
        name: Option<String>,

        /// Page to open before the first node runs
        #[arg(long)]
        url: Option<String>,

        /// Browser to run the scenario in
        #[arg(long, value_enum)]
        browser: Option<BrowserKind>,
    },

    /// Add a node to a scenario
    Add {
        /// Path of the scenario file
        file: PathBuf,

        /// Node type to create (see 'nodes')
        node_type: String,

        /// Parent node id (default: the root)
        #[arg(long)]
        parent: Option<u64>,

        /// Position among the parent's children (default: last)
        #[arg(long)]
        index: Option<usize>,

        /// Initial property value, e.g. --set description="Log in" --set action.url=https://example.com
        /// Values are parsed as JSON and fall back to plain strings.
        #[arg(long = "set", short = 's')]
        properties: Vec<String>,
    },

    /// Change a property of a node
    Set {
        /// Path of the scenario file
        file: PathBuf,

        /// Node id (as printed by 'show')
        node: u64,

        /// Property name, dotted for nested fields (e.g. action.locator.value)
        property: String,

        /// New value, parsed as JSON with a plain string fallback
        value: String,
    },

    /// Remove a node and everything below it
    #[command(alias = "rm")]
    Remove {
        /// Path of the scenario file
        file: PathBuf,

        /// Node id (as printed by 'show')
        node: u64,
    },

    /// Print the node tree of a scenario
    Show {
        /// Path of the scenario file
        file: PathBuf,
    },

    /// List the node types that can be added
    Nodes,

    /// Run a scenario with the dry-run driver
    Run {
        /// Path of the scenario file
        file: PathBuf,

        /// Override the scenario's browser
        #[arg(long, value_enum)]
        browser: Option<BrowserKind>,

        /// Directory for run folders (default: from config)
        #[arg(long)]
        results_dir: Option<PathBuf>,
    },

    /// Print a saved result record
    Result {
        /// Path of a result.json file
        file: PathBuf,
    },
}
