//! Staging, building and publishing one converter plugin.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::toolchain::{ShellToolchain, Toolchain};
use super::{BuildError, BuildOutcome, BuildRequest, Builder, Result, remove_staging};
use crate::config::BuildSettings;
use crate::synth::BUILD_DESCRIPTOR_NAME;

/// [`Builder`] driving a [`Toolchain`] over a staging package.
///
/// A build goes through these steps, each with its own error:
/// 1. Claims the staging directory, failing with [`BuildError::StagingCollision`] if it exists.
/// 2. Writes the build descriptor and source under `plugins/`.
/// 3. Runs the toolchain in the staging directory and records its combined output.
/// 4. Copies the staged library to its published name.
/// 5. Removes the staging directory.
///
/// Any failure after step 1 leaves the staging directory in place for inspection.
#[derive(Debug, Clone)]
pub struct BuildOrchestrator<T = ShellToolchain> {
	toolchain: T,
}

impl BuildOrchestrator<ShellToolchain> {
	pub fn from_settings(settings: &BuildSettings) -> Self {
		Self::new(ShellToolchain::from_settings(settings))
	}
}

impl<T: Toolchain> BuildOrchestrator<T> {
	pub fn new(toolchain: T) -> Self {
		Self { toolchain }
	}

	pub fn toolchain(&self) -> &T {
		&self.toolchain
	}
}

impl<T: Toolchain> Builder for BuildOrchestrator<T> {
	fn build(&self, request: &BuildRequest) -> Result<BuildOutcome> {
		let start = Instant::now();

		claim_staging(&request.staging_dir)?;
		debug!(payload_type = %request.payload_type, staging = %request.staging_dir.display(), "Created staging package");
		materialize(request)?;

		info!(payload_type = %request.payload_type, "Building converter plugin");
		let run = self.toolchain.run(&request.staging_dir).map_err(BuildError::Spawn)?;
		let duration = start.elapsed();

		let log_path = request.log_path();
		if let Err(e) = fs::write(&log_path, &run.log) {
			warn!(path = %log_path.display(), error = %e, "Failed to write build log");
		}
		info!(
			payload_type = %request.payload_type,
			seconds = duration.as_secs_f64(),
			exit_code = ?run.exit_code,
			"Building done"
		);

		if !run.success() {
			warn!(
				payload_type = %request.payload_type,
				log = %log_path.display(),
				"Build failed, leaving staging directory for inspection"
			);
			return Err(BuildError::Failure {
				exit_code: run.exit_code,
				log: run.log,
				duration,
			});
		}

		publish(request)?;

		if let Err(e) = remove_staging(&request.staging_dir) {
			warn!(error = %e, "Failed to clean up staging directory");
		}

		Ok(BuildOutcome {
			artifact: request.published_artifact.clone(),
			log: run.log,
			duration,
		})
	}
}

/// Creates the staging directory, refusing to reuse one that already exists.
fn claim_staging(staging_dir: &Path) -> Result<()> {
	if let Some(parent) = staging_dir.parent() {
		fs::create_dir_all(parent).map_err(|source| BuildError::Filesystem {
			path: parent.to_path_buf(),
			source,
		})?;
	}
	match fs::create_dir(staging_dir) {
		Ok(()) => Ok(()),
		Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(BuildError::StagingCollision(staging_dir.to_path_buf())),
		Err(source) => Err(BuildError::Filesystem {
			path: staging_dir.to_path_buf(),
			source,
		}),
	}
}

fn materialize(request: &BuildRequest) -> Result<()> {
	let plugins_dir = request.plugins_dir();
	let fs_err = |path: &Path| {
		let path = path.to_path_buf();
		move |source| BuildError::Filesystem { path, source }
	};

	fs::create_dir_all(&plugins_dir).map_err(fs_err(&plugins_dir))?;

	let descriptor_path = plugins_dir.join(BUILD_DESCRIPTOR_NAME);
	fs::write(&descriptor_path, &request.rendered.build_descriptor).map_err(fs_err(&descriptor_path))?;

	let source_path = plugins_dir.join(request.rendered.source_file_name);
	fs::write(&source_path, &request.rendered.source).map_err(fs_err(&source_path))?;
	Ok(())
}

fn publish(request: &BuildRequest) -> Result<()> {
	let from = &request.staged_artifact;
	let to = &request.published_artifact;
	let publish_err = |source| BuildError::Publish {
		from: from.clone(),
		to: to.clone(),
		source,
	};

	if let Some(dir) = to.parent() {
		fs::create_dir_all(dir).map_err(publish_err)?;
	}
	fs::copy(from, to).map_err(publish_err)?;
	debug!(from = %from.display(), to = %to.display(), "Published converter library");
	Ok(())
}
