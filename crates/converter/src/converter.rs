//! The converter capability handed out by discovery and loading.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Errors raised by a converter while writing XML.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConversionError {
	#[error("converter failed: {0}")]
	Failed(String),
	#[error("converter produced invalid UTF-8")]
	InvalidUtf8,
}

/// Turns the raw bytes of one payload into XML text.
pub trait Converter: Send + Sync {
	fn write(&self, payload: &[u8]) -> Result<String, ConversionError>;
}

/// Produces converter instances for one payload type.
pub trait ConverterFactory: Send + Sync {
	fn instantiate(&self) -> Box<dyn Converter>;
}

struct FnFactory<F>(Arc<F>);

struct SharedFn<F>(Arc<F>);

impl<F> Converter for SharedFn<F>
where
	F: Fn(&[u8]) -> Result<String, ConversionError> + Send + Sync,
{
	fn write(&self, payload: &[u8]) -> Result<String, ConversionError> {
		(self.0)(payload)
	}
}

impl<F> ConverterFactory for FnFactory<F>
where
	F: Fn(&[u8]) -> Result<String, ConversionError> + Send + Sync + 'static,
{
	fn instantiate(&self) -> Box<dyn Converter> {
		Box::new(SharedFn(Arc::clone(&self.0)))
	}
}

/// Cloneable, invokable converter for one payload type.
#[derive(Clone)]
pub struct ConverterHandle {
	symbol: Arc<str>,
	factory: Arc<dyn ConverterFactory>,
}

impl ConverterHandle {
	pub fn new(symbol: impl Into<Arc<str>>, factory: Arc<dyn ConverterFactory>) -> Self {
		Self {
			symbol: symbol.into(),
			factory,
		}
	}

	/// Wraps a plain conversion function.
	pub fn from_fn<F>(symbol: impl Into<Arc<str>>, f: F) -> Self
	where
		F: Fn(&[u8]) -> Result<String, ConversionError> + Send + Sync + 'static,
	{
		Self::new(symbol, Arc::new(FnFactory(Arc::new(f))))
	}

	/// Entry-point name this handle was resolved from, e.g. `FooPayload2xml`.
	pub fn symbol(&self) -> &str {
		&self.symbol
	}

	pub fn instantiate(&self) -> Box<dyn Converter> {
		self.factory.instantiate()
	}

	/// Instantiates a converter and writes `payload` as XML.
	pub fn invoke(&self, payload: &[u8]) -> Result<String, ConversionError> {
		self.instantiate().write(payload)
	}
}

impl fmt::Debug for ConverterHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ConverterHandle").field("symbol", &self.symbol).finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn handle_invokes_wrapped_function() {
		let handle = ConverterHandle::from_fn("FooPayload2xml", |bytes: &[u8]| Ok(format!("<xml>{}</xml>", bytes.len())));
		assert_eq!(handle.symbol(), "FooPayload2xml");
		assert_eq!(handle.invoke(b"\x01\x02").as_deref(), Ok("<xml>2</xml>"));
	}

	#[test]
	fn clones_share_the_factory() {
		let handle = ConverterHandle::from_fn("X2xml", |_: &[u8]| Err(ConversionError::Failed("bad payload".into())));
		let clone = handle.clone();
		assert_eq!(clone.invoke(b""), Err(ConversionError::Failed("bad payload".into())));
	}
}
