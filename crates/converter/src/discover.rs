//! Lookup of converters among libraries that are already built.
//!
//! Search order:
//! 1. The built-in library of the development area.
//! 2. The built-in library of the release, when the area is a developer checkout.
//! 3. The type-specific library an earlier on-demand build published in the area.
//!
//! A plain release (no release fallback configured) stops after step 1, since it
//! cannot build anything on demand.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::converter::ConverterHandle;
use crate::loader::Loader;
use crate::sanitize::{converter_symbol, library_file_name};

/// Base name of the library bundling the commonly used converters.
pub const BUILTIN_LIBRARY_NAME: &str = "pluginUtilities_payload2xml";

/// Errors that end discovery for good.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiscoverError {
	#[error("no XML converter for payload class {payload_type} in the built-in library, and this read-only release cannot build one")]
	ReadOnlyRelease { payload_type: String },
}

/// Finds prebuilt converters.
pub struct Discoverer {
	config: Config,
	loader: Arc<dyn Loader>,
}

impl Discoverer {
	pub fn new(config: Config, loader: Arc<dyn Loader>) -> Self {
		Self { config, loader }
	}

	/// Built-in library locations in search order.
	pub fn builtin_libraries(&self) -> Vec<PathBuf> {
		let name = library_file_name(BUILTIN_LIBRARY_NAME);
		let mut paths = vec![self.config.lib_dir().join(&name)];
		if let Some(release) = self.config.release_lib_dir() {
			paths.push(release.join(&name));
		}
		paths
	}

	/// Looks for a converter for `payload_type`.
	///
	/// `Ok(None)` means nothing was found but the caller may build one.
	pub fn find(&self, payload_type: &str) -> Result<Option<ConverterHandle>, DiscoverError> {
		debug!(payload_type, symbol = %converter_symbol(payload_type), "Discovering converter");

		for library in self.builtin_libraries() {
			if let Some(handle) = self.try_library(&library, payload_type) {
				info!(payload_type, library = %library.display(), "XML converter found in the built-in library");
				return Ok(Some(handle));
			}
		}

		if !self.config.is_development_area() {
			return Err(DiscoverError::ReadOnlyRelease {
				payload_type: payload_type.to_string(),
			});
		}

		let local = self.config.local_library(payload_type);
		if let Some(handle) = self.try_library(&local, payload_type) {
			info!(payload_type, library = %local.display(), "Found local library with XML converter");
			return Ok(Some(handle));
		}

		warn!(payload_type, "No XML converter found in the built-in library");
		Ok(None)
	}

	/// Converter for `payload_type` in `library`, treating every failure as a miss.
	fn try_library(&self, library: &Path, payload_type: &str) -> Option<ConverterHandle> {
		if !library.exists() {
			debug!(library = %library.display(), "Library not present");
			return None;
		}
		match self.loader.load(library) {
			Ok(module) => module.converter(payload_type),
			Err(e) => {
				warn!(library = %library.display(), error = %e, "Skipping converter library that failed to load");
				None
			}
		}
	}
}
