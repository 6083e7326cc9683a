//! Admin CLI and forced-command entry point (§6).
//!
//! With none of `--check`/`--learn`/`--unlearn`, this runs the
//! forced-command path: decide on `$SSH_ORIGINAL_COMMAND` and either
//! exec the user's shell or print the deny banner and exit 1. The three
//! admin modes are mutually exclusive and never exec anything.

// This binary's job is printing to stdout/stderr (--check diagnostics,
// the deny banner, usage errors): the print lints are for accidental
// debug output, not this.
#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use itertools::Itertools as _;
use sshdo_policy::NullIdentityResolver;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

mod audit;
mod coalesce;
mod decision;
mod forced_command;
mod identity;
mod learn;
mod logsource;
mod unlearn;

use identity::OsIdentityResolver;

/// Platform default main policy file, superseded by `SSHDO_CONFIG` and
/// then by `--config` (§6).
const DEFAULT_CONFIG_PATH: &str = "/etc/sshdoers";

const PROGNAME: &str = "sshdo";

/// Forced-command SSH gatekeeper: policy-driven allow/train/deny, with
/// digit-pattern learning from the audit log.
#[derive(Parser)]
#[command(name = "sshdo", version, about)]
struct App {
    /// Policy file to load.
    #[arg(short = 'C', long = "config", env = "SSHDO_CONFIG", value_name = "PATH")]
    config: Option<Utf8PathBuf>,

    /// Validate the policy and print diagnostics instead of deciding a command.
    #[arg(short, long, group = "mode")]
    check: bool,

    /// Mine the audit log for commands to add to the policy.
    #[arg(short, long, group = "mode")]
    learn: bool,

    /// Mine the audit log for policy entries nothing exercises any more.
    #[arg(short, long, group = "mode")]
    unlearn: bool,

    /// With --learn, also propose previously-disallowed commands; with
    /// --unlearn, also count previously-disallowed commands as usage.
    #[arg(short, long)]
    accepting: bool,

    #[command(flatten)]
    verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::WarnLevel>,

    /// Forced-command invocation: the optional label. With --check,
    /// --learn, or --unlearn: explicit log files to read, overriding the
    /// configured globs.
    #[arg(value_name = "ARGS")]
    args: Vec<String>,
}

fn main() -> ExitCode {
    let app = App::parse();
    init_logging(&app.verbose);

    if app.accepting && !(app.learn || app.unlearn) {
        eprintln!("error: --accepting requires --learn or --unlearn");
        return ExitCode::FAILURE;
    }

    let config_path = app
        .config
        .clone()
        .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_CONFIG_PATH));

    if app.check {
        run_check(&config_path)
    } else if app.learn {
        run_learn(&config_path, &app.args, app.accepting)
    } else if app.unlearn {
        run_unlearn(&config_path, &app.args, app.accepting)
    } else {
        if app.args.len() > 1 {
            eprintln!("error: forced-command invocation takes at most one label argument");
            return ExitCode::FAILURE;
        }
        run_forced_command(&config_path, app.args.first().map(String::as_str))
    }
}

fn init_logging(verbose: &clap_verbosity_flag::Verbosity<clap_verbosity_flag::WarnLevel>) {
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(verbose.tracing_level_filter().into())
        .with_env_var("SSHDO_LOG")
        .from_env()
        .expect("failed to parse SSHDO_LOG");

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().without_time().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// `--check` (§7 tier 3): every diagnostic becomes a printed line; the
/// exit code is the issue count, capped at 255.
fn run_check(config_path: &Utf8PathBuf) -> ExitCode {
    let outcome = sshdo_policy::load(config_path, &OsIdentityResolver, true);

    let diagnostics = outcome
        .diagnostics
        .into_iter()
        .sorted_by_key(|d| (d.file.clone(), d.line))
        .collect::<Vec<_>>();

    for d in &diagnostics {
        match d.line {
            Some(line) => println!("{}:{}: {}", d.file, line, d.message),
            None => println!("{}: {}", d.file, d.message),
        }
    }

    let count = diagnostics.len();
    if count > 0 {
        eprintln!("{count} issue(s) found");
    }
    ExitCode::from(count.min(255) as u8)
}

fn run_learn(config_path: &Utf8PathBuf, files: &[String], accepting: bool) -> ExitCode {
    let outcome = sshdo_policy::load(config_path, &NullIdentityResolver, false);

    let paths = logsource::resolve_paths(files, &outcome.settings);
    let sources = match logsource::open_sources(&paths) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let records = logsource::records_from_sources(sources, PROGNAME);

    let rendered = learn::learn(
        &outcome.tree,
        &outcome.training,
        &outcome.settings,
        identity::groups_for_user,
        records,
        &learn::LearnOptions { accepting },
    );
    if !rendered.is_empty() {
        println!("{rendered}");
    }
    ExitCode::SUCCESS
}

fn run_unlearn(config_path: &Utf8PathBuf, files: &[String], accepting: bool) -> ExitCode {
    let outcome = sshdo_policy::load(config_path, &NullIdentityResolver, false);

    let paths = logsource::resolve_paths(files, &outcome.settings);
    let sources = match logsource::open_sources(&paths) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let records = logsource::records_from_sources(sources, PROGNAME);

    let rendered = unlearn::unlearn(&outcome.tree, &outcome.settings, records, &unlearn::UnlearnOptions { accepting });
    if !rendered.is_empty() {
        println!("{rendered}");
    }
    ExitCode::SUCCESS
}

/// The forced-command path (§5): decide, audit, then either exec the
/// shell (allow/train) or print the banner and exit 1 (deny).
fn run_forced_command(config_path: &Utf8PathBuf, label_arg: Option<&str>) -> ExitCode {
    let invocation = match forced_command::Invocation::from_env(label_arg) {
        Ok(inv) => inv,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let outcome = sshdo_policy::load(config_path, &NullIdentityResolver, false);
    let mut emitter = audit::AuditEmitter::connect(&outcome.settings, PROGNAME).ok();

    for diag in &outcome.diagnostics {
        if let Some(emitter) = emitter.as_mut() {
            let record = audit::config_error_record(diag.file.as_str(), diag.line, None, Some(&diag.message));
            let _ = emitter.emit(&record);
        }
    }

    let groups = identity::groups_for_user(&invocation.user);
    let decision = decision::decide(
        &outcome.tree,
        &outcome.training,
        outcome.settings.match_style,
        &invocation.user,
        &groups,
        &invocation.label,
        &invocation.command,
    );

    let config_field = (outcome.settings.config_path.as_str() != DEFAULT_CONFIG_PATH)
        .then(|| outcome.settings.config_path.as_str());
    let record = audit::decision_record(
        &decision,
        &invocation.user,
        invocation.remoteip.as_deref(),
        &invocation.label,
        &invocation.command,
        config_field,
    );
    if let Some(emitter) = emitter.as_mut() {
        let _ = emitter.emit(&record);
    }

    if decision.is_allow() || decision.is_train() {
        if let Err(e) = forced_command::exec_shell(&invocation.user, &invocation.command) {
            if let Some(emitter) = emitter.as_mut() {
                let _ = emitter.emit(&audit::exec_error_record(&invocation.command, &e.to_string()));
            }
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
        unreachable!("exec_shell only returns on error");
    }

    print_banner(outcome.settings.banner_path.as_deref(), emitter.as_mut());
    ExitCode::FAILURE
}

fn print_banner(banner_path: Option<&camino::Utf8Path>, emitter: Option<&mut audit::AuditEmitter>) {
    let Some(path) = banner_path else { return };
    match std::fs::read_to_string(path) {
        Ok(contents) => eprint!("{contents}"),
        Err(e) => {
            if let Some(emitter) = emitter {
                let record = audit::config_error_record(path.as_str(), None, None, Some(&e.to_string()));
                let _ = emitter.emit(&record);
            }
        }
    }
}
