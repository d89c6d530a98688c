//! Spawning external tools.
//!
//! Every stage of every pipeline goes through [`run`] or [`run_captured`]. Both suspend the
//! calling task while the child runs, and both spawn with `kill_on_drop`, so a cancelled
//! orchestrator future takes its subprocess down with it.

use crate::error::{Error, Result};
use log::debug;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// A fully composed argument vector for one external invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: PathBuf,
    args: Vec<OsString>,
}

impl CommandLine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).kill_on_drop(true);
        cmd
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Runs a stage to completion, inheriting stdout/stderr.
pub async fn run(cmd: &CommandLine) -> Result<()> {
    debug!("Running: {}", cmd);
    let status = cmd
        .command()
        .stdin(Stdio::null())
        .status()
        .await
        .map_err(|e| spawn_error(cmd, e))?;

    if !status.success() {
        return Err(Error::ProcessFailed {
            command: cmd.to_string(),
            code: status.code(),
        });
    }
    Ok(())
}

/// Runs an inspection command and returns its captured stdout.
pub async fn run_captured(cmd: &CommandLine) -> Result<Vec<u8>> {
    debug!("Running (captured): {}", cmd);
    let output = cmd
        .command()
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| spawn_error(cmd, e))?;

    if !output.status.success() {
        debug!(
            "{} stderr: {}",
            cmd.program().display(),
            String::from_utf8_lossy(&output.stderr).trim_end()
        );
        return Err(Error::ProcessFailed {
            command: cmd.to_string(),
            code: output.status.code(),
        });
    }
    Ok(output.stdout)
}

/// Runs a probe with all output discarded, returning the raw spawn result.
///
/// Used by install checks, which must tell "not found" apart from other spawn failures.
pub(crate) async fn probe(cmd: &CommandLine) -> std::io::Result<bool> {
    debug!("Probing: {}", cmd);
    let status = cmd
        .command()
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;
    Ok(status.success())
}

fn spawn_error(cmd: &CommandLine, err: std::io::Error) -> Error {
    if err.kind() == std::io::ErrorKind::NotFound {
        Error::ToolNotInstalled {
            tool: cmd.program().display().to_string(),
            hint: String::new(),
        }
    } else {
        Error::io(format!("Failed to spawn `{}`", cmd), err)
    }
}
