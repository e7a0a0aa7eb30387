//! Dynamic loading of converter modules.
//!
//! A converter module is a shared library that registers converters for the payload
//! types it supports when it is loaded. [`Loader`] is the seam between discovery and
//! the platform loader; [`DylibLoader`] is the real implementation.

mod dylib;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use dylib::DylibLoader;
use thiserror::Error;

use condxml_cabi::CondXmlStatus;

use crate::converter::ConverterHandle;
use crate::sanitize::converter_symbol;

/// Errors that can occur when loading a converter module.
#[derive(Debug, Error)]
pub enum LoadError {
	#[error("converter library not found: {0}")]
	LibraryNotFound(PathBuf),

	#[error("failed to load converter library {path}: {reason}")]
	Open { path: PathBuf, reason: String },

	#[error("converter library {path} has no module entry point: {reason}")]
	EntryPointMissing { path: PathBuf, reason: String },

	#[error("module entry point of {path} failed with status {status:?}")]
	EntryPointFailed { path: PathBuf, status: CondXmlStatus },

	#[error("converter library {path} is incompatible: host ABI {expected}, module ABI {actual}")]
	Incompatible { path: PathBuf, expected: u32, actual: u32 },

	#[error("converter library {path} does not provide {symbol}")]
	SymbolNotFound { path: PathBuf, symbol: String },
}

/// Converters registered by one loaded library, keyed by exact payload type.
#[derive(Debug, Clone)]
pub struct ConverterModule {
	path: PathBuf,
	converters: HashMap<String, ConverterHandle>,
}

impl ConverterModule {
	/// Builds a module from `(payload_type, handle)` registrations.
	///
	/// A later registration for the same payload type replaces an earlier one.
	pub fn new(path: impl Into<PathBuf>, converters: impl IntoIterator<Item = (String, ConverterHandle)>) -> Self {
		Self {
			path: path.into(),
			converters: converters.into_iter().collect(),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Converter registered for exactly `payload_type`, if any.
	///
	/// Type names that merely share a sanitized token (`A<B>` and `A_B`) do not match.
	pub fn converter(&self, payload_type: &str) -> Option<ConverterHandle> {
		self.converters.get(payload_type).cloned()
	}

	/// Payload types this module converts, sorted.
	pub fn payload_types(&self) -> Vec<&str> {
		let mut types: Vec<_> = self.converters.keys().map(String::as_str).collect();
		types.sort_unstable();
		types
	}

	pub fn len(&self) -> usize {
		self.converters.len()
	}

	pub fn is_empty(&self) -> bool {
		self.converters.is_empty()
	}
}

/// Loads converter modules from shared libraries.
pub trait Loader: Send + Sync {
	/// Loads the library at `path` and collects the converters it registers.
	fn load(&self, path: &Path) -> Result<Arc<ConverterModule>, LoadError>;

	/// Loads `path` and resolves the converter for `payload_type` from it.
	fn load_converter(&self, path: &Path, payload_type: &str) -> Result<ConverterHandle, LoadError> {
		self.load(path)?
			.converter(payload_type)
			.ok_or_else(|| LoadError::SymbolNotFound {
				path: path.to_path_buf(),
				symbol: converter_symbol(payload_type),
			})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	struct OneModule;

	impl Loader for OneModule {
		fn load(&self, path: &Path) -> Result<Arc<ConverterModule>, LoadError> {
			let handle = ConverterHandle::from_fn("std::string2xml", |b: &[u8]| Ok(format!("<s>{}</s>", b.len())));
			Ok(Arc::new(ConverterModule::new(path, [("std::string".to_string(), handle)])))
		}
	}

	fn tagged(tag: &'static str) -> ConverterHandle {
		ConverterHandle::from_fn(converter_symbol(tag), move |_: &[u8]| Ok(format!("<{tag}/>")))
	}

	#[test]
	fn module_lookup_is_by_exact_type() {
		let module = OneModule.load(Path::new("lib.so")).unwrap();
		assert!(module.converter("std::string").is_some());
		assert!(module.converter("std:: string").is_none());
		assert!(module.converter("std::wstring").is_none());
		assert_eq!(module.payload_types(), vec!["std::string"]);
	}

	#[test]
	fn types_sharing_a_token_stay_distinct() {
		let module = ConverterModule::new("lib.so", [("A<B>".to_string(), tagged("templated"))]);
		assert!(module.converter("A_B").is_none());
		assert_eq!(module.converter("A<B>").unwrap().invoke(b"").unwrap(), "<templated/>");

		let module = ConverterModule::new("lib.so", [("A<B>".to_string(), tagged("templated")), ("A_B".to_string(), tagged("plain"))]);
		assert_eq!(module.len(), 2);
		assert_eq!(module.payload_types(), vec!["A<B>", "A_B"]);
		assert_eq!(module.converter("A_B").unwrap().invoke(b"").unwrap(), "<plain/>");
		assert_eq!(module.converter("A<B>").unwrap().invoke(b"").unwrap(), "<templated/>");
	}

	#[test]
	fn load_converter_reports_missing_symbol() {
		let err = OneModule.load_converter(Path::new("lib.so"), "FooPayload").unwrap_err();
		match err {
			LoadError::SymbolNotFound { path, symbol } => {
				assert_eq!(path, PathBuf::from("lib.so"));
				assert_eq!(symbol, "FooPayload2xml");
			}
			other => panic!("expected SymbolNotFound, got {other:?}"),
		}
		let handle = OneModule.load_converter(Path::new("lib.so"), "std::string").unwrap();
		assert_eq!(handle.invoke(b"abc").unwrap(), "<s>3</s>");
	}
}
