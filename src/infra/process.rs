//! External process execution
//!
//! Commands are run with their output appended to a [`LogSink`]. Children are
//! placed in their own process group, so an interrupt sent to the daemon's
//! terminal never reaches a running build.

use std::ffi::OsStr;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::CommandError;
use crate::infra::log_sink::LogSink;

/// Privilege-dropping wrapper
pub const BIN_SUDO: &str = "sudo";

/// Shell used for hooks
pub const BIN_SH: &str = "sh";

/// Runs commands with consistent logging
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandRunner {
    debug: bool,
}

impl CommandRunner {
    /// Create a runner; `debug` logs every command line at info level
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }

    /// Build a command that runs `program` as `user:group` through sudo
    pub fn sudo<I, S>(user: &str, group: &str, program: &str, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(BIN_SUDO);
        cmd.args(["-u", user, "-g", group, program]).args(args);
        cmd
    }

    /// Build a command that runs `script` through `sh -c` inside `cwd`
    pub fn shell(script: &str, cwd: &Path) -> Command {
        let mut cmd = Command::new(BIN_SH);
        cmd.arg("-c").arg(script).current_dir(cwd);
        cmd
    }

    /// Run `cmd` to completion, appending its output to `log`
    pub async fn run(&self, mut cmd: Command, log: &LogSink) -> Result<(), CommandError> {
        let program = cmd.get_program().to_string_lossy().into_owned();
        let line = describe(&cmd);
        if self.debug {
            tracing::info!("will run command \"{line}\"");
        } else {
            tracing::debug!("running \"{line}\"");
        }
        log.note(&format!("$ {line}"));

        let (stdout, stderr) = log.stdio()?;
        cmd.stdin(Stdio::null()).stdout(stdout).stderr(stderr);
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let status = tokio::process::Command::from(cmd)
            .status()
            .await
            .map_err(|e| CommandError::Spawn {
                program: program.clone(),
                error: e.to_string(),
            })?;

        if status.success() {
            if self.debug {
                tracing::info!("command \"{line}\" done without error");
            }
            Ok(())
        } else {
            if self.debug {
                tracing::warn!("command \"{line}\" done with error: {status}");
            }
            Err(CommandError::Failed {
                program,
                status: status.to_string(),
                log: log.path().to_path_buf(),
            })
        }
    }
}

/// Render a command line for logs
pub fn describe(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|part| part.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}
