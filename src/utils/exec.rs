//! External command execution for templates.
//!
//! Commands run synchronously with captured output. Failures never propagate
//! as errors: they are folded into the returned text so a page that shells
//! out still renders.

use crate::error::BuildError;
use regex::Regex;
use std::{
    borrow::Cow,
    ffi::OsString,
    process::{Command, Output},
    sync::OnceLock,
};

// ============================================================================
// Command Execution
// ============================================================================

/// Captured result of one command run.
#[derive(Debug, Default)]
pub struct CmdOutput {
    pub stdout: String,
    pub stderr: String,
    /// Set when the command could not be spawned or exited non-zero.
    pub failure: Option<BuildError>,
}

impl CmdOutput {
    /// Failure line, then stderr, then stdout; empty parts are omitted.
    pub fn merged(&self) -> String {
        let failure = self.failure.as_ref().map(ToString::to_string);
        [failure.as_deref(), Some(self.stderr.as_str()), Some(self.stdout.as_str())]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Run `cmd` with `args`, adding `env` on top of the host environment.
///
/// Later pairs in `env` override earlier ones with the same name.
pub fn run(cmd: &str, args: &[String], env: &[(String, String)]) -> CmdOutput {
    let (name, mut command) = prepare(cmd, args);
    command.envs(env.iter().map(|(k, v)| (k, v)));

    match command.output() {
        Ok(output) => from_output(&name, &output),
        Err(e) => CmdOutput {
            failure: Some(BuildError::ExternalCommand {
                command: name,
                message: e.to_string(),
            }),
            ..CmdOutput::default()
        },
    }
}

/// Run a command and return its merged output text.
pub fn merged_output(cmd: &str, args: &[String], env: &[(String, String)]) -> String {
    run(cmd, args, env).merged()
}

/// Prepare a Command and its display name (`cmd arg1 arg2`).
fn prepare(cmd: &str, args: &[String]) -> (String, Command) {
    let name = std::iter::once(cmd)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ");

    let mut command = Command::new(cmd);
    command.args(args.iter().map(OsString::from));
    (name, command)
}

fn from_output(name: &str, output: &Output) -> CmdOutput {
    let failure = (!output.status.success()).then(|| BuildError::ExternalCommand {
        command: name.to_owned(),
        message: output.status.to_string(),
    });

    CmdOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: strip_ansi(&String::from_utf8_lossy(&output.stderr)).into_owned(),
        failure,
    }
}

fn strip_ansi(s: &str) -> Cow<'_, str> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").expect("valid ansi regex"));
    re.replace_all(s, "")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binary_is_folded_into_output() {
        let out = run("webjot-definitely-not-a-command", &["--flag".into()], &[]);
        assert!(out.failure.is_some());
        let merged = out.merged();
        assert!(merged.starts_with("CMD ERROR on `webjot-definitely-not-a-command --flag`:"));
    }

    #[test]
    fn test_merged_order_and_empty_parts() {
        let out = CmdOutput {
            stdout: "out".into(),
            stderr: String::new(),
            failure: None,
        };
        assert_eq!(out.merged(), "out");

        let out = CmdOutput {
            stdout: "out".into(),
            stderr: "err".into(),
            failure: Some(BuildError::ExternalCommand {
                command: "x".into(),
                message: "exit status: 1".into(),
            }),
        };
        assert_eq!(out.merged(), "CMD ERROR on `x`: exit status: 1\nerr\nout");
    }

    #[cfg(unix)]
    #[test]
    fn test_env_is_passed_to_child() {
        let out = run(
            "sh",
            &["-c".into(), "printf %s \"$JOT_TITLE\"".into()],
            &[("JOT_TITLE".into(), "first".into()), ("JOT_TITLE".into(), "last".into())],
        );
        assert!(out.failure.is_none());
        assert_eq!(out.stdout, "last");
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_keeps_output() {
        let out = run("sh", &["-c".into(), "echo hi; exit 3".into()], &[]);
        assert_eq!(out.stdout, "hi\n");
        assert!(out.merged().starts_with("CMD ERROR on `sh -c echo hi; exit 3`"));
    }

    #[test]
    fn test_strip_ansi() {
        assert_eq!(strip_ansi("\x1b[31mred\x1b[0m"), "red");
    }
}
