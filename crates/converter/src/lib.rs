// Conversion runs inside larger tools - report through tracing, never stderr
#![deny(clippy::print_stderr)]

//! On-demand payload-to-XML converters
//!
//! Given the runtime type name of a stored payload, this crate obtains a converter
//! for it: first from libraries that are already built, otherwise by generating the
//! glue source of a converter plugin, compiling it with the external build toolchain,
//! and loading the freshly built library.
//!
//! # Architecture
//!
//! * [`sanitize`]: Type name to file/identifier token mapping
//! * [`discover`]: Lookup in the built-in, release and type-specific libraries
//! * [`synth`]: Plugin source and build descriptor rendering
//! * [`build`]: Staging, toolchain invocation and artifact publishing
//! * [`loader`]: Dynamic loading of converter modules
//! * [`registry`]: Resolved converters, one per payload type
//! * [`facade`]: The [`Payload2Xml`] entry point tying the pipeline together
//! * [`store`]: The payload fetching collaborator
//! * [`config`]: Area layout and toolchain settings
//!
//! # Resolution
//!
//! ```text
//! fetch(key) -> registry hit? -> discover -> [found] -> cache -> invoke
//!                                          -> [miss]  -> render -> build -> load -> cache -> invoke
//! ```
//!
//! Failures along the build path make the type unavailable for that call only; nothing
//! negative is cached, so a later call retries the whole pipeline.

pub mod build;
pub mod config;
pub mod converter;
pub mod discover;
pub mod facade;
pub mod loader;
pub mod registry;
pub mod sanitize;
pub mod store;
pub mod synth;

pub use build::{BuildError, BuildLayout, BuildOrchestrator, BuildOutcome, BuildRequest, Builder, ShellToolchain, Toolchain, ToolchainRun};
pub use config::{BuildSettings, Config, ConfigError};
pub use converter::{ConversionError, Converter, ConverterFactory, ConverterHandle};
pub use discover::{DiscoverError, Discoverer};
pub use facade::{ConvertError, Payload2Xml, ResolutionStage};
pub use loader::{ConverterModule, DylibLoader, LoadError, Loader};
pub use registry::{ConverterRegistry, RegistryError};
pub use sanitize::{converter_symbol, library_extension, library_file_name, plugin_library_name, sanitize};
pub use store::{FetchError, Payload, PayloadFetcher, PayloadTable};
pub use synth::{CodeSynthesizer, RenderedPlugin};
