//! Payload type names as file and identifier tokens.
//!
//! Type names such as `std::vector<unsigned char>` name generated files, staged and
//! published libraries, and plugin identifiers. They are reduced to a token by
//! dropping spaces and angle brackets.

/// Reduces a payload type name to a token usable in file names and plugin names.
///
/// Spaces are removed, `<` becomes `_` and `>` is dropped, so
/// `std::vector<unsigned char>` becomes `std::vector_unsignedchar`.
///
/// The mapping is not injective for arbitrary names (`A<B>` and `A_B` share a token);
/// [`ConverterRegistry::check_token`](crate::ConverterRegistry::check_token) catches
/// such pairs at runtime.
pub fn sanitize(type_name: &str) -> String {
	type_name
		.chars()
		.filter_map(|c| match c {
			' ' | '>' => None,
			'<' => Some('_'),
			c => Some(c),
		})
		.collect()
}

/// Logical entry-point name of the converter for `payload_type`.
pub fn converter_symbol(payload_type: &str) -> String {
	format!("{payload_type}2xml")
}

/// Base name of the plugin library holding the converter for a sanitized token.
pub fn plugin_library_name(token: &str) -> String {
	format!("plugin{token}_payload2xml")
}

/// Appends the platform's shared library extension to `base`.
pub fn library_file_name(base: &str) -> String {
	format!("{base}.{}", library_extension())
}

/// Shared library file extension for the current platform.
#[cfg(target_os = "windows")]
pub fn library_extension() -> &'static str {
	"dll"
}

#[cfg(target_os = "macos")]
pub fn library_extension() -> &'static str {
	"dylib"
}

#[cfg(all(unix, not(target_os = "macos")))]
pub fn library_extension() -> &'static str {
	"so"
}
