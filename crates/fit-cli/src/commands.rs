use std::collections::BTreeSet;
use std::env;
use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use colored::{ColoredString, Colorize};
use fit_sdk::{
    ChangeKind, FitRepo, MergeDriverOutcome, QuietProgress, RestoreAction, SdkError, StatusReport,
    StatusRow, TransferProgress, TransferReport, WorkdirGuard, MERGE_HELP,
};

use crate::cli::*;
use crate::progress::{human_size, ConsoleProgress};

const LEGEND: &str = "\
Change symbols:
  *  modified       content differs from .fit
  +  added          newly carries the fit attribute
  -  removed        deleted from the working tree
  ~  untracked      still on disk but no longer carries the fit attribute

Staged in git, and blocking the next commit:
  F  a fit item staged directly in git
  B  a binary file fit has not been told about

During a merge, second column:
  M  resolved to mine
  T  resolved to theirs
  W  resolved to the working tree
  U  not resolved yet
";

pub async fn run_command(cli: Cli) -> anyhow::Result<ExitCode> {
    let _guard = match &cli.directory {
        Some(dir) => Some(
            WorkdirGuard::enter(dir)
                .with_context(|| format!("cannot enter {}", dir.display()))?,
        ),
        None => None,
    };

    if let Command::MergeHelp = cli.command {
        print!("{MERGE_HELP}");
        return Ok(ExitCode::SUCCESS);
    }

    let cwd = env::current_dir().context("cannot read the current directory")?;
    let repo = FitRepo::discover(&cwd)?;

    match cli.command {
        Command::Status(args) => cmd_status(&repo, args, &cwd),
        Command::Save(args) => cmd_save(&repo, args, &cwd),
        Command::Restore(args) => cmd_restore(&repo, args, &cwd),
        Command::Get(args) => cmd_get(&repo, args, &cwd).await,
        Command::Put(args) => cmd_put(&repo, args).await,
        Command::MergeDriver(args) => cmd_merge_driver(&repo, args),
        Command::Hook(args) => cmd_hook(&repo, args),
        Command::MergeHelp => Ok(ExitCode::SUCCESS),
    }
}

/// `None` selects everything.
fn selection(
    repo: &FitRepo,
    paths: &[String],
    cwd: &Path,
) -> anyhow::Result<Option<BTreeSet<String>>> {
    if paths.is_empty() {
        return Ok(None);
    }
    Ok(Some(repo.select(paths, cwd)?.items))
}

/// Line 0 marks a conflict whose row was deleted from the form.
fn form_line(line: usize) -> String {
    if line == 0 {
        "row missing".to_string()
    } else {
        format!("line {line}")
    }
}

fn status_code(row: &StatusRow) -> ColoredString {
    let code = row.code();
    if row.offender.is_some() || row.merge == Some('U') {
        return code.red().bold();
    }
    match row.kind {
        ChangeKind::Modified => code.yellow(),
        ChangeKind::Added => code.green(),
        ChangeKind::Removed => code.red(),
        ChangeKind::Untracked => code.cyan(),
        ChangeKind::Unchanged => code.normal(),
    }
}

fn cmd_status(repo: &FitRepo, args: StatusArgs, cwd: &Path) -> anyhow::Result<ExitCode> {
    if args.legend {
        println!("{LEGEND}");
    }
    let filter = selection(repo, &args.paths, cwd)?;
    let report = repo.status(filter.as_ref())?;

    let rows = report.rows(args.all);
    for row in &rows {
        println!("  {}  {}", status_code(row), row.path);
    }
    print_status_notes(&report, !rows.is_empty());
    Ok(ExitCode::SUCCESS)
}

fn print_status_notes(report: &StatusReport, listed: bool) {
    let mut notes = Vec::new();
    if let Some(merge) = &report.merge {
        if !merge.is_complete() {
            notes.push(format!(
                "A merge is in progress with {} unresolved item(s). See `git-fit merge-help`.",
                merge.unresolved.len()
            ));
        }
    }
    if !report.offenders.is_empty() {
        notes.push("Items marked F or B are staged in git and will abort the commit.".to_string());
    }
    if report.manifest_dirty {
        notes.push("The .fit file has changes that are not staged.".to_string());
    }
    if report.cached_stubs > 0 {
        notes.push(format!(
            "{} empty placeholder(s) can be filled from the local cache: run `git-fit get`.",
            report.cached_stubs
        ));
    }
    if report.downloads > 0 {
        notes.push(format!("{} item(s) need downloading: run `git-fit get`.", report.downloads));
    }
    if report.pending_uploads > 0 {
        notes.push(format!(
            "{} committed item(s) are not uploaded yet: run `git-fit put`.",
            report.pending_uploads
        ));
    }

    if !listed && notes.is_empty() {
        println!("Nothing to report: the working tree matches .fit.");
        return;
    }
    if listed && !notes.is_empty() {
        println!();
    }
    for note in notes {
        println!("{}", note.dimmed());
    }
}

fn cmd_save(repo: &FitRepo, args: PathArgs, cwd: &Path) -> anyhow::Result<ExitCode> {
    let filter = selection(repo, &args.paths, cwd)?;
    let report = match repo.save(filter.as_ref()) {
        Ok(report) => report,
        Err(SdkError::Unresolved(rows)) => {
            eprintln!("{}", "A merge is in progress and these items are not resolved yet:".red());
            for (path, line) in &rows {
                eprintln!("  {}: {path}", form_line(*line));
            }
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => return Err(e.into()),
    };

    if report.is_noop() {
        println!("Nothing to save.");
        return Ok(ExitCode::SUCCESS);
    }
    for (path, entry) in &report.saved {
        println!("  {}  {path} ({})", "saved".green(), human_size(entry.size));
    }
    for path in &report.removed {
        println!("  {}  {path}", "removed".red());
    }
    if report.resolved_merge {
        println!("{} Merge conflicts resolved.", "✓".green().bold());
    }
    if report.staged {
        println!("Staged {} for commit.", repo.config().manifest_file.bold());
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_restore(repo: &FitRepo, args: RestoreArgs, cwd: &Path) -> anyhow::Result<ExitCode> {
    let filter = selection(repo, &args.paths, cwd)?;
    let plan = repo.restore_plan(filter.as_ref())?;
    if plan.is_empty() {
        if !args.quiet {
            println!("Nothing to restore.");
        }
        return Ok(ExitCode::SUCCESS);
    }

    // Lost content is listed before it goes, even with --quiet.
    for (path, action) in plan.destructive() {
        let verb = match action {
            RestoreAction::Removed => format!("{:>11}", "removing").red(),
            _ => format!("{:>11}", "overwriting").yellow(),
        };
        println!("  {verb}  {path}");
    }
    if !args.quiet {
        for path in &plan.recreate {
            println!("  {}  {path}", format!("{:>11}", "recreating").green());
        }
    }

    let report = repo.apply_restore(&plan)?;
    let missing = report.missing();
    if missing > 0 {
        if !args.quiet {
            for (path, action) in &report.actions {
                if *action == RestoreAction::Stubbed {
                    println!("  {:>11}  {path}", action.label());
                }
            }
        }
        eprintln!(
            "{} {missing} item(s) are not in the local cache and were left as empty \
             placeholders: run `git-fit get`.",
            "warning:".yellow().bold()
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn progress_for(quiet: bool) -> Box<dyn TransferProgress> {
    if quiet {
        Box::new(QuietProgress)
    } else {
        Box::new(ConsoleProgress::new())
    }
}

fn finish_transfer(report: &TransferReport, verb: &str, quiet: bool) -> ExitCode {
    if !quiet {
        println!(
            "{} {} item(s) {verb} ({}), {} from cache, {} already present.",
            "✓".green().bold(),
            report.transferred.len(),
            human_size(report.bytes),
            report.from_cache.len(),
            report.already_present.len()
        );
        if !report.pruned.evicted.is_empty() {
            println!(
                "  cache pruned: {} object(s), {}",
                report.pruned.evicted.len(),
                human_size(report.pruned.freed)
            );
        }
    }
    if report.is_success() {
        return ExitCode::SUCCESS;
    }
    eprintln!("{} {} item(s) failed:", "error:".red().bold(), report.failed.len());
    for (path, reason) in &report.failed {
        eprintln!("  {path}: {reason}");
    }
    ExitCode::FAILURE
}

async fn cmd_get(repo: &FitRepo, args: TransferArgs, cwd: &Path) -> anyhow::Result<ExitCode> {
    let filter = selection(repo, &args.paths, cwd)?;
    if args.summary || args.list {
        let plan = repo.get_plan(filter.as_ref())?;
        if args.list {
            for item in &plan.from_cache {
                println!("  {}     {}", "cache".cyan(), item.path);
            }
            for item in &plan.downloads {
                let size = human_size(item.entry.size);
                println!("  {}  {} ({size})", "download".yellow(), item.path);
            }
        } else {
            println!(
                "{} from the local cache, {} to download ({}).",
                plan.from_cache.len(),
                plan.downloads.len(),
                human_size(plan.download_bytes())
            );
        }
        return Ok(ExitCode::SUCCESS);
    }

    let mut progress = progress_for(args.quiet);
    let report = repo.get(filter.as_ref(), progress.as_mut()).await?;
    Ok(finish_transfer(&report, "downloaded", args.quiet))
}

async fn cmd_put(repo: &FitRepo, args: PutArgs) -> anyhow::Result<ExitCode> {
    if args.summary || args.list {
        let plan = repo.put_plan()?;
        if args.list {
            for item in &plan.uploads {
                let size = human_size(item.entry.size);
                println!("  {}  {} ({size})", "upload".yellow(), item.path);
            }
            for item in &plan.missing {
                println!("  {}  {}", "missing".red(), item.path);
            }
        } else {
            println!(
                "At most {} item(s) to upload ({}), {} missing from the local cache.",
                plan.uploads.len(),
                human_size(plan.upload_bytes()),
                plan.missing.len()
            );
        }
        return Ok(ExitCode::SUCCESS);
    }

    let mut progress = progress_for(args.quiet);
    let report = repo.put(progress.as_mut()).await?;
    Ok(finish_transfer(&report, "uploaded", args.quiet))
}

fn cmd_merge_driver(repo: &FitRepo, args: MergeDriverArgs) -> anyhow::Result<ExitCode> {
    match repo.merge_driver(&args.common, &args.mine, &args.other)? {
        MergeDriverOutcome::Merged => Ok(ExitCode::SUCCESS),
        MergeDriverOutcome::Conflicted(conflicts) => {
            eprintln!(
                "{} {} fit item(s) conflict. Fill in the Conflict Resolution Form in {}, \
                 then run `git-fit save`.",
                "merge:".yellow().bold(),
                conflicts.len(),
                repo.config().manifest_file
            );
            eprintln!("Run `git-fit merge-help` for details.");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn cmd_hook(repo: &FitRepo, args: HookArgs) -> anyhow::Result<ExitCode> {
    match args.hook {
        Hook::PreCommit => {
            let report = repo.pre_commit()?;
            if !report.is_blocking() {
                return Ok(ExitCode::SUCCESS);
            }
            eprintln!("{}", "********** git-fit has aborted this commit **********".red().bold());
            if !report.unresolved.is_empty() {
                eprintln!("A fit merge is in progress and these items are not resolved yet:");
                for (path, line) in &report.unresolved {
                    eprintln!("    {}: {path}", form_line(*line));
                }
            }
            if !report.offenders.is_empty() {
                eprintln!("These items are staged in git:");
                let mut offenders: Vec<(&String, char)> = report
                    .offenders
                    .tracked
                    .iter()
                    .map(|p| (p, 'F'))
                    .chain(report.offenders.binary.iter().map(|p| (p, 'B')))
                    .collect();
                offenders.sort();
                for (path, code) in offenders {
                    eprintln!("    {code} {path}");
                }
                eprintln!();
                eprintln!("F = carries the fit attribute, so fit should track it");
                eprintln!("B = a binary file fit has not been told about");
            }
            Ok(ExitCode::FAILURE)
        }
        Hook::PostCommit => {
            repo.post_commit()?;
            Ok(ExitCode::SUCCESS)
        }
        Hook::PostCheckout { old, new, flag } => {
            let report = repo.post_checkout(&old, &new, flag == "1")?;
            for (path, action) in &report.restore.actions {
                eprintln!("  {:>8}  {path}", action.label());
            }
            if let Some(conflicts) = &report.conflicts {
                eprintln!(
                    "{} kept the local version of {} item(s) also changed by the checkout:",
                    "warning:".yellow().bold(),
                    conflicts.len()
                );
                for path in conflicts.paths() {
                    eprintln!("    {path}");
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
