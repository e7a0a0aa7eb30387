//! Converter plugin source generation.
//!
//! A converter for a payload type is a one-line instantiation of the framework's
//! converter template inside a plugin module, plus a SCRAM build descriptor.

use crate::sanitize::{plugin_library_name, sanitize};

/// File name of the generated translation unit inside `plugins/`.
pub const SOURCE_FILE_NAME: &str = "Local_2XML.cpp";

/// File name of the generated build descriptor inside `plugins/`.
pub const BUILD_DESCRIPTOR_NAME: &str = "BuildFile.xml";

const SOURCE_TEMPLATE: &str = r#"
#include "CondCore/Utilities/interface/Payload2XMLModule.h"
#include "CondCore/Utilities/src/CondFormats.h"

PAYLOAD_2XML_MODULE( {plugin_name} ){
  PAYLOAD_2XML_CLASS( {payload_type} );
}
"#;

const BUILD_DESCRIPTOR_TEMPLATE: &str = r#"
<flags CXXFLAGS="-Wno-sign-compare -Wno-unused-variable -Os"/>
<library   file="{source_file}" name="{library_name}">
  <use   name="CondCore/Utilities"/>
  <use   name="boost_python"/>
</library>
<export>
  <lib   name="1"/>
</export>
"#;

/// Everything needed to stage a build of one converter plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPlugin {
	pub source: String,
	pub build_descriptor: String,
	pub source_file_name: &'static str,
	/// Library name the toolchain builds under (the staged artifact).
	pub library_base_name: String,
	/// Plugin name the module registers itself as (the published artifact).
	pub plugin_name: String,
}

/// Renders converter plugin sources for payload types.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodeSynthesizer;

impl CodeSynthesizer {
	pub fn new() -> Self {
		Self
	}

	/// Renders the plugin for `payload_type`, which must be a non-empty type expression.
	pub fn render(&self, payload_type: &str) -> RenderedPlugin {
		let token = sanitize(payload_type);
		let plugin_name = plugin_library_name(&token);
		let library_base_name = staged_library_name(&token);

		let source = SOURCE_TEMPLATE
			.replace("{plugin_name}", &plugin_name)
			.replace("{payload_type}", payload_type);
		let build_descriptor = BUILD_DESCRIPTOR_TEMPLATE
			.replace("{source_file}", SOURCE_FILE_NAME)
			.replace("{library_name}", &library_base_name);

		RenderedPlugin {
			source,
			build_descriptor,
			source_file_name: SOURCE_FILE_NAME,
			library_base_name,
			plugin_name,
		}
	}
}

/// Name the toolchain builds the library under before it is published.
pub fn staged_library_name(token: &str) -> String {
	format!("Tmp{token}_payload2xml")
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn source_instantiates_the_exact_type() {
		let rendered = CodeSynthesizer::new().render("FooPayload");
		assert!(rendered.source.contains("PAYLOAD_2XML_CLASS( FooPayload )"));
		assert!(rendered.source.contains("PAYLOAD_2XML_MODULE( pluginFooPayload_payload2xml )"));
		assert!(rendered.source.contains("#include \"CondCore/Utilities/interface/Payload2XMLModule.h\""));
		assert_eq!(rendered.plugin_name, "pluginFooPayload_payload2xml");
		assert_eq!(rendered.source_file_name, "Local_2XML.cpp");
	}

	#[test]
	fn templated_type_keeps_its_spelling_in_source() {
		let rendered = CodeSynthesizer::new().render("std::vector<unsigned char>");
		assert!(rendered.source.contains("PAYLOAD_2XML_CLASS( std::vector<unsigned char> )"));
		assert!(rendered.source.contains("PAYLOAD_2XML_MODULE( pluginstd::vector_unsignedchar_payload2xml )"));
		assert_eq!(rendered.library_base_name, "Tmpstd::vector_unsignedchar_payload2xml");
	}

	#[test]
	fn build_descriptor_declares_flags_and_dependencies() {
		let rendered = CodeSynthesizer::new().render("FooPayload");
		assert_eq!(
			rendered.build_descriptor,
			r#"
<flags CXXFLAGS="-Wno-sign-compare -Wno-unused-variable -Os"/>
<library   file="Local_2XML.cpp" name="TmpFooPayload_payload2xml">
  <use   name="CondCore/Utilities"/>
  <use   name="boost_python"/>
</library>
<export>
  <lib   name="1"/>
</export>
"#
		);
	}
}
