//! External build toolchain invocation.

use std::io::{self, Read};
use std::path::Path;
use std::process::{Command, Stdio};

use crate::config::BuildSettings;

/// Exit status and combined output of one toolchain run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainRun {
	/// Exit code, or `None` if the process was killed by a signal.
	pub exit_code: Option<i32>,
	/// Interleaved stdout and stderr.
	pub log: String,
}

impl ToolchainRun {
	pub fn success(&self) -> bool {
		self.exit_code == Some(0)
	}
}

/// Runs a build inside a staging directory.
pub trait Toolchain: Send + Sync {
	/// Builds the package in `staging_dir`, blocking until the build exits.
	///
	/// `Err` means the toolchain could not be run at all; a build that ran and failed
	/// is an `Ok` run with a non-zero exit code.
	fn run(&self, staging_dir: &Path) -> io::Result<ToolchainRun>;
}

impl<F> Toolchain for F
where
	F: Fn(&Path) -> io::Result<ToolchainRun> + Send + Sync,
{
	fn run(&self, staging_dir: &Path) -> io::Result<ToolchainRun> {
		self(staging_dir)
	}
}

/// Runs the configured build command through the system shell.
///
/// The environment setup snippet and the command share one shell, so variables it
/// exports are visible to the build. There is no timeout: a hung build hangs the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellToolchain {
	env_setup: Option<String>,
	command: String,
}

impl ShellToolchain {
	pub fn new(command: impl Into<String>, env_setup: Option<String>) -> Self {
		Self {
			env_setup,
			command: command.into(),
		}
	}

	pub fn from_settings(settings: &BuildSettings) -> Self {
		Self::new(settings.command.clone(), settings.env_setup.clone())
	}

	/// Shell script executed for a build.
	pub fn script(&self) -> String {
		match &self.env_setup {
			Some(setup) => format!("{setup}; {}", self.command),
			None => self.command.clone(),
		}
	}
}

#[cfg(unix)]
fn shell_command(script: &str) -> Command {
	let mut cmd = Command::new("sh");
	cmd.arg("-c").arg(script);
	cmd
}

#[cfg(windows)]
fn shell_command(script: &str) -> Command {
	let mut cmd = Command::new("cmd");
	cmd.arg("/C").arg(script);
	cmd
}

impl Toolchain for ShellToolchain {
	fn run(&self, staging_dir: &Path) -> io::Result<ToolchainRun> {
		let script = self.script();
		tracing::debug!(dir = %staging_dir.display(), %script, "Running build toolchain");

		let (mut reader, writer) = os_pipe::pipe()?;
		let writer_err = writer.try_clone()?;

		let mut cmd = shell_command(&script);
		cmd.current_dir(staging_dir).stdin(Stdio::null()).stdout(writer).stderr(writer_err);
		let mut child = cmd.spawn()?;
		// The command holds the write ends; drop it so the read below sees EOF.
		drop(cmd);

		let mut log = Vec::new();
		reader.read_to_end(&mut log)?;
		let status = child.wait()?;

		Ok(ToolchainRun {
			exit_code: status.code(),
			log: String::from_utf8_lossy(&log).into_owned(),
		})
	}
}
