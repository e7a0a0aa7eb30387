//! Payload conversion entry point.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::build::{BuildError, BuildLayout, BuildOrchestrator, Builder};
use crate::config::Config;
use crate::converter::{ConversionError, ConverterHandle};
use crate::discover::Discoverer;
use crate::loader::{DylibLoader, Loader};
use crate::registry::{ConverterRegistry, RegistryError};
use crate::store::{FetchError, PayloadFetcher};
use crate::synth::CodeSynthesizer;

/// Stage at which converter resolution stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStage {
	Discovery,
	Synthesis,
	Build,
	Publish,
	Load,
}

impl fmt::Display for ResolutionStage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Discovery => "discovery",
			Self::Synthesis => "synthesis",
			Self::Build => "build",
			Self::Publish => "publish",
			Self::Load => "load",
		})
	}
}

/// Errors surfaced by [`Payload2Xml`].
#[derive(Debug, Error)]
pub enum ConvertError {
	#[error(transparent)]
	Fetch(#[from] FetchError),

	/// A staging directory already exists; needs someone to look at it.
	#[error(transparent)]
	StagingCollision(BuildError),

	#[error(transparent)]
	TokenCollision(#[from] RegistryError),

	#[error("no XML converter available for payload class {payload_type} (stopped at {stage}): {reason}")]
	NoConverterAvailable {
		payload_type: String,
		stage: ResolutionStage,
		reason: String,
		/// Combined toolchain output, when a build ran and failed.
		build_log: Option<String>,
	},

	#[error("converting payload of class {payload_type} failed: {source}")]
	Conversion {
		payload_type: String,
		source: ConversionError,
	},
}

impl ConvertError {
	fn unavailable(payload_type: &str, stage: ResolutionStage, reason: impl fmt::Display) -> Self {
		Self::NoConverterAvailable {
			payload_type: payload_type.to_string(),
			stage,
			reason: reason.to_string(),
			build_log: None,
		}
	}

	fn build_failed(payload_type: &str, error: BuildError) -> Self {
		let stage = match error {
			BuildError::Publish { .. } => ResolutionStage::Publish,
			_ => ResolutionStage::Build,
		};
		let reason = error.to_string();
		let build_log = match error {
			BuildError::Failure { log, .. } => Some(log),
			_ => None,
		};
		Self::NoConverterAvailable {
			payload_type: payload_type.to_string(),
			stage,
			reason,
			build_log,
		}
	}

	/// Stage at which resolution stopped, for [`ConvertError::NoConverterAvailable`].
	pub fn stage(&self) -> Option<ResolutionStage> {
		match self {
			Self::NoConverterAvailable { stage, .. } => Some(*stage),
			_ => None,
		}
	}

	/// Toolchain output of the failed build, for [`ConvertError::NoConverterAvailable`].
	pub fn build_log(&self) -> Option<&str> {
		match self {
			Self::NoConverterAvailable { build_log, .. } => build_log.as_deref(),
			_ => None,
		}
	}

	/// Path of the colliding staging directory, for [`ConvertError::StagingCollision`].
	pub fn staging_path(&self) -> Option<&PathBuf> {
		match self {
			Self::StagingCollision(BuildError::StagingCollision(path)) => Some(path),
			_ => None,
		}
	}
}

/// Converts stored payloads to XML, obtaining converters on demand.
///
/// Resolved converters are kept in the owned [`ConverterRegistry`] for the lifetime of
/// this value. A failed resolution is not remembered: the next request for the same
/// payload type runs the whole pipeline again.
pub struct Payload2Xml {
	registry: ConverterRegistry,
	discoverer: Discoverer,
	synthesizer: CodeSynthesizer,
	layout: BuildLayout,
	builder: Box<dyn Builder>,
	loader: Arc<dyn Loader>,
}

impl Payload2Xml {
	/// Uses the platform loader and the configured shell toolchain.
	pub fn new(config: Config) -> Self {
		let builder = BuildOrchestrator::from_settings(&config.build);
		Self::with_parts(config, Box::new(builder), Arc::new(DylibLoader::new()))
	}

	pub fn with_parts(config: Config, builder: Box<dyn Builder>, loader: Arc<dyn Loader>) -> Self {
		Self {
			registry: ConverterRegistry::new(),
			layout: BuildLayout::new(&config),
			discoverer: Discoverer::new(config, Arc::clone(&loader)),
			synthesizer: CodeSynthesizer::new(),
			builder,
			loader,
		}
	}

	pub fn registry(&self) -> &ConverterRegistry {
		&self.registry
	}

	/// Fetches the payload under `key` and returns its XML representation.
	pub fn convert_to_xml(&self, fetcher: &dyn PayloadFetcher, key: &str) -> Result<String, ConvertError> {
		let payload = fetcher.fetch_by_key(key)?;
		info!(payload_type = %payload.object_type, key, "Found payload of type {}", payload.object_type);

		let converter = self.resolve(&payload.object_type)?;
		converter.invoke(&payload.data).map_err(|source| ConvertError::Conversion {
			payload_type: payload.object_type,
			source,
		})
	}

	/// Returns a converter for `payload_type`, building one if necessary.
	pub fn resolve(&self, payload_type: &str) -> Result<ConverterHandle, ConvertError> {
		if let Some(handle) = self.registry.get(payload_type) {
			debug!(payload_type, "Converter cached");
			return Ok(handle);
		}

		debug!(payload_type, "Discovering");
		let handle = match self.discoverer.find(payload_type) {
			Ok(Some(handle)) => handle,
			Ok(None) => self.build_converter(payload_type)?,
			Err(e) => return Err(ConvertError::unavailable(payload_type, ResolutionStage::Discovery, e)),
		};

		self.registry.insert(payload_type, handle.clone())?;
		debug!(payload_type, "Converter ready");
		Ok(handle)
	}

	/// Removes the staging directory a failed build of `payload_type` left behind.
	///
	/// Returns whether there was one.
	pub fn discard_stale_staging(&self, payload_type: &str) -> Result<bool, BuildError> {
		let request = self.layout.request(payload_type, self.synthesizer.render(payload_type));
		let removed = self.builder.discard_staging(&request)?;
		if removed {
			info!(payload_type, staging = %request.staging_dir.display(), "Discarded stale staging directory");
		}
		Ok(removed)
	}

	fn build_converter(&self, payload_type: &str) -> Result<ConverterHandle, ConvertError> {
		if payload_type.trim().is_empty() {
			return Err(ConvertError::unavailable(payload_type, ResolutionStage::Synthesis, "empty payload type name"));
		}
		self.registry.check_token(payload_type)?;

		debug!(payload_type, "Synthesizing");
		let request = self.layout.request(payload_type, self.synthesizer.render(payload_type));

		debug!(payload_type, "Building");
		let outcome = match self.builder.build(&request) {
			Ok(outcome) => outcome,
			Err(e @ BuildError::StagingCollision(_)) => return Err(ConvertError::StagingCollision(e)),
			Err(e) => {
				warn!(payload_type, error = %e, "Converter unavailable");
				return Err(ConvertError::build_failed(payload_type, e));
			}
		};

		debug!(payload_type, artifact = %outcome.artifact.display(), "Loading");
		self.loader.load_converter(&outcome.artifact, payload_type).map_err(|e| {
			warn!(payload_type, error = %e, "Converter unavailable");
			ConvertError::unavailable(payload_type, ResolutionStage::Load, e)
		})
	}
}
