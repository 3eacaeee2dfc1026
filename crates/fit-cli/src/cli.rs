use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "git-fit",
    about = "Large-file tracking for git through a content-addressed side store",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Run as if started in this directory
    #[arg(short = 'C', global = true, value_name = "PATH")]
    pub directory: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show changes to fit items in the working tree
    Status(StatusArgs),
    /// Record working-tree changes in .fit and stage it
    Save(PathArgs),
    /// Discard working-tree changes to fit items
    Restore(RestoreArgs),
    /// Fill empty placeholders with their content
    Get(TransferArgs),
    /// Upload the objects of committed items
    Put(PutArgs),
    /// Three-way merge of .fit files (called by git)
    MergeDriver(MergeDriverArgs),
    /// Git hook entry points (called by git)
    Hook(HookArgs),
    /// Explain the Conflict Resolution Form
    MergeHelp,
}

#[derive(Args)]
pub struct PathArgs {
    pub paths: Vec<String>,
}

#[derive(Args)]
pub struct StatusArgs {
    /// Explain the status symbols
    #[arg(short, long)]
    pub legend: bool,
    /// Also list unchanged items
    #[arg(short, long)]
    pub all: bool,
    pub paths: Vec<String>,
}

#[derive(Args)]
pub struct RestoreArgs {
    #[arg(short, long)]
    pub quiet: bool,
    pub paths: Vec<String>,
}

#[derive(Args)]
pub struct TransferArgs {
    /// Show what would be transferred, in totals
    #[arg(short, long, conflicts_with = "list")]
    pub summary: bool,
    /// Show what would be transferred, item by item
    #[arg(short, long)]
    pub list: bool,
    #[arg(short, long)]
    pub quiet: bool,
    pub paths: Vec<String>,
}

#[derive(Args)]
pub struct PutArgs {
    #[arg(short, long, conflicts_with = "list")]
    pub summary: bool,
    #[arg(short, long)]
    pub list: bool,
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct MergeDriverArgs {
    pub common: PathBuf,
    pub mine: PathBuf,
    pub other: PathBuf,
}

#[derive(Args)]
pub struct HookArgs {
    #[command(subcommand)]
    pub hook: Hook,
}

#[derive(Subcommand)]
pub enum Hook {
    PreCommit,
    PostCommit,
    PostCheckout {
        old: String,
        new: String,
        /// 1 for a branch checkout, 0 for a file checkout
        flag: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_directory_after_subcommand() {
        let args = ["git-fit", "status", "-C", "/tmp/repo", "--all", "art"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.directory, Some(PathBuf::from("/tmp/repo")));
        match cli.command {
            Command::Status(args) => {
                assert!(args.all);
                assert_eq!(args.paths, vec!["art".to_string()]);
            }
            _ => panic!("expected status"),
        }
    }

    #[test]
    fn summary_and_list_are_exclusive() {
        assert!(Cli::try_parse_from(["git-fit", "get", "--summary", "--list"]).is_err());
    }

    #[test]
    fn parses_post_checkout_arguments() {
        let args = ["git-fit", "hook", "post-checkout", "abc", "def", "1"];
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Command::Hook(HookArgs {
                hook: Hook::PostCheckout { old, new, flag },
            }) => assert_eq!((old.as_str(), new.as_str(), flag.as_str()), ("abc", "def", "1")),
            _ => panic!("expected post-checkout"),
        }
    }
}
