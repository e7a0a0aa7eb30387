//! On-demand converter plugin builds.
//!
//! This module stages generated plugin sources in the development area, runs the
//! external build toolchain on them, and publishes the resulting library where
//! discovery finds it.

mod orchestrator;
mod toolchain;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use orchestrator::BuildOrchestrator;
use thiserror::Error;
pub use toolchain::{ShellToolchain, Toolchain, ToolchainRun};

use crate::config::Config;
use crate::sanitize::{library_file_name, sanitize};
use crate::synth::RenderedPlugin;

/// Subsystem directory under `<base>/src` holding staging packages.
pub const STAGING_SUBSYSTEM: &str = "Payload2xmlStaging";

/// Subdirectory of a staging package holding the generated files.
pub const PLUGINS_DIR: &str = "plugins";

/// File the combined toolchain output is written to inside a staging package.
pub const BUILD_LOG_NAME: &str = "build.log";

/// Errors that can occur during an on-demand build.
#[derive(Debug, Error)]
pub enum BuildError {
	#[error(
		"staging directory {0} already exists; remove it if you did not create it manually \
		 (a failed build leaves it behind for inspection)"
	)]
	StagingCollision(PathBuf),

	#[error("filesystem error at {path}: {source}")]
	Filesystem { path: PathBuf, source: std::io::Error },

	#[error("failed to start the build toolchain: {0}")]
	Spawn(#[source] std::io::Error),

	#[error("build failed with exit code {exit_code:?} after {duration:?}")]
	Failure {
		exit_code: Option<i32>,
		log: String,
		duration: Duration,
	},

	#[error("failed to publish {from} to {to}: {source}")]
	Publish {
		from: PathBuf,
		to: PathBuf,
		source: std::io::Error,
	},
}

/// Result type for build operations.
pub type Result<T> = std::result::Result<T, BuildError>;

/// One converter plugin to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
	pub payload_type: String,
	pub rendered: RenderedPlugin,
	/// Package directory the sources are staged in; must not exist beforehand.
	pub staging_dir: PathBuf,
	/// Where the toolchain writes the library it builds.
	pub staged_artifact: PathBuf,
	/// Where the library is copied for discovery to find.
	pub published_artifact: PathBuf,
}

impl BuildRequest {
	pub fn plugins_dir(&self) -> PathBuf {
		self.staging_dir.join(PLUGINS_DIR)
	}

	pub fn log_path(&self) -> PathBuf {
		self.staging_dir.join(BUILD_LOG_NAME)
	}
}

/// Result of a successful build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
	/// Published library.
	pub artifact: PathBuf,
	/// Combined stdout and stderr of the toolchain.
	pub log: String,
	pub duration: Duration,
}

/// Builds converter plugins.
pub trait Builder: Send + Sync {
	/// Stages, builds and publishes `request`.
	fn build(&self, request: &BuildRequest) -> Result<BuildOutcome>;

	/// Removes a staging directory left behind by an earlier failed build.
	///
	/// Returns whether anything was removed.
	fn discard_staging(&self, request: &BuildRequest) -> Result<bool> {
		remove_staging(&request.staging_dir)
	}
}

/// Removes a staging package and, when it is left empty, its subsystem directory.
pub(crate) fn remove_staging(staging_dir: &Path) -> Result<bool> {
	match fs::remove_dir_all(staging_dir) {
		Ok(()) => {}
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
		Err(source) => {
			return Err(BuildError::Filesystem {
				path: staging_dir.to_path_buf(),
				source,
			});
		}
	}
	if let Some(parent) = staging_dir.parent() {
		// Fails while other packages are staged there, which is fine.
		let _ = fs::remove_dir(parent);
	}
	Ok(true)
}

/// Maps payload types to staging and artifact locations in a development area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildLayout {
	staging_root: PathBuf,
	lib_dir: PathBuf,
}

impl BuildLayout {
	pub fn new(config: &Config) -> Self {
		Self {
			staging_root: config.base_dir.join("src").join(STAGING_SUBSYSTEM),
			lib_dir: config.lib_dir(),
		}
	}

	/// Staging package for `payload_type`, unique per sanitized type.
	pub fn staging_dir(&self, payload_type: &str) -> PathBuf {
		self.staging_root.join(sanitize(payload_type))
	}

	pub fn request(&self, payload_type: &str, rendered: RenderedPlugin) -> BuildRequest {
		let staged_artifact = self.lib_dir.join(library_file_name(&format!("plugin{}", rendered.library_base_name)));
		let published_artifact = self.lib_dir.join(library_file_name(&rendered.plugin_name));
		BuildRequest {
			payload_type: payload_type.to_string(),
			staging_dir: self.staging_dir(payload_type),
			staged_artifact,
			published_artifact,
			rendered,
		}
	}
}
