use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gitform")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Declarative GitLab configuration", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Manifest declaring the desired resources
    #[arg(long, global = true, env = "GITFORM_MANIFEST")]
    pub manifest: Option<PathBuf>,

    /// State file tracking managed resources
    #[arg(long, global = true, env = "GITFORM_STATE")]
    pub state: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show what apply would change
    Plan(TargetArgs),

    /// Make GitLab match the manifest
    Apply(ApplyArgs),

    /// Delete every tracked resource
    Destroy(DestroyArgs),

    /// Start tracking an existing GitLab entity
    Import {
        /// Address in the manifest (kind.name)
        address: String,

        /// GitLab identity, e.g. `42:7` for a project membership
        identity: String,
    },

    /// Re-read tracked resources and update the state file
    Refresh(TargetArgs),

    /// Show tracked state
    Show {
        /// Address to show in detail (kind.name)
        address: Option<String>,
    },

    /// List the resource kinds that can be managed
    Kinds,

    /// Look up an unmanaged GitLab object and print it as JSON
    #[command(subcommand)]
    Lookup(LookupKind),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser)]
pub struct TargetArgs {
    /// Only this kind or address (e.g. "group_variable" or "group_variable.deploy_env")
    pub target: Option<String>,
}

#[derive(Parser)]
pub struct ApplyArgs {
    /// Only this kind or address
    pub target: Option<String>,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Show what would change without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Number of resources reconciled in parallel
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

#[derive(Parser)]
pub struct DestroyArgs {
    /// Only this kind or address
    pub target: Option<String>,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Subcommand)]
pub enum LookupKind {
    /// A group by id or full path
    Group { id: String },

    /// A project by id or `namespace/path`
    Project { id: String },

    /// A branch and its head commit
    Branch {
        /// Project id or `namespace/path`
        project: String,
        name: String,
    },

    /// Members of a group
    GroupMembers {
        /// Group id or full path
        group: String,

        /// Only members with this access level (e.g. "developer")
        #[arg(long)]
        access_level: Option<String>,
    },
}
