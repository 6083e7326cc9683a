//! Forced-command dispatch (§5, §6): reads the environment the hosting
//! SSH daemon sets, and — once a decision has been reached and audited —
//! replaces this process with the user's shell.

use std::env;
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;

use nix::unistd::User;
use sshdo_policy::{INTERACTIVE, Label};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForcedCommandError {
    #[error("USER environment variable is not set")]
    MissingUser,
    #[error("no such user `{0}`")]
    UnknownUser(String),
    #[error("user `{0}` has no configured shell")]
    NoShell(String),
    #[error("failed to look up user `{0}`: {1}")]
    Lookup(String, #[source] nix::Error),
    #[error("failed to exec shell: {0}")]
    Exec(#[source] nix::Error),
}

/// The environment this tool was invoked with, as a forced command.
pub struct Invocation {
    pub user: String,
    pub command: String,
    pub remoteip: Option<String>,
    pub label: Label,
}

impl Invocation {
    /// Read from the process environment plus the optional positional CLI
    /// argument (the label; §6).
    pub fn from_env(label_arg: Option<&str>) -> Result<Self, ForcedCommandError> {
        let user = env::var("USER").map_err(|_| ForcedCommandError::MissingUser)?;

        let raw_cmd = env::var("SSH_ORIGINAL_COMMAND").unwrap_or_default();
        let command = if raw_cmd.is_empty() {
            INTERACTIVE.to_string()
        } else {
            raw_cmd
        };

        let remoteip = env::var("SSH_CLIENT")
            .ok()
            .and_then(|v| v.split_whitespace().next().map(str::to_string));

        let label = Label::normalize(label_arg.unwrap_or(""));

        Ok(Self {
            user,
            command,
            remoteip,
            label,
        })
    }

    pub fn is_interactive(&self) -> bool {
        self.command == INTERACTIVE
    }
}

/// Replace the current process image with `username`'s login shell,
/// running `command` (or an interactive session, for the `<interactive>`
/// sentinel). Never returns on success — the process image is gone.
///
/// argv\[0\] follows the login-shell convention: `-<shellname>` for an
/// interactive session, plain `<shellname>` with `-c <command>` otherwise
/// (§5).
pub fn exec_shell(username: &str, command: &str) -> Result<(), ForcedCommandError> {
    let user = User::from_name(username)
        .map_err(|e| ForcedCommandError::Lookup(username.to_string(), e))?
        .ok_or_else(|| ForcedCommandError::UnknownUser(username.to_string()))?;

    let shell = user.shell;
    if shell.as_os_str().is_empty() {
        return Err(ForcedCommandError::NoShell(username.to_string()));
    }

    let shell_name = shell
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sh".to_string());

    // Environment variables are already NUL-free C strings, so this can't
    // fail for anything that actually reached us via the process env.
    let shell_cstr = CString::new(shell.as_os_str().as_bytes()).expect("shell path has no interior NUL");

    let argv: Vec<CString> = if command == INTERACTIVE {
        vec![CString::new(format!("-{shell_name}")).expect("shell name has no interior NUL")]
    } else {
        vec![
            CString::new(shell_name).expect("shell name has no interior NUL"),
            CString::new("-c").expect("literal has no interior NUL"),
            CString::new(command).expect("command has no interior NUL"),
        ]
    };

    nix::unistd::execv(&shell_cstr, &argv).map_err(ForcedCommandError::Exec)?;
    unreachable!("execv only returns on error")
}
