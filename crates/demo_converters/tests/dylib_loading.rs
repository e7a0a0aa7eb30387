#![allow(unused_crate_dependencies)]

use std::fs;
use std::path::{Path, PathBuf};

use condxml_converter::discover::BUILTIN_LIBRARY_NAME;
use condxml_converter::{Config, DylibLoader, Loader, Payload2Xml, PayloadTable, library_file_name};
use pretty_assertions::assert_eq;

/// The cdylib cargo built next to this test binary.
fn built_library() -> PathBuf {
	let exe = std::env::current_exe().unwrap();
	let deps = exe.parent().unwrap();
	let (prefix, ext) = if cfg!(windows) {
		("pluginUtilities_payload2xml", ".dll")
	} else if cfg!(target_os = "macos") {
		("libpluginUtilities_payload2xml", ".dylib")
	} else {
		("libpluginUtilities_payload2xml", ".so")
	};

	[deps, deps.parent().unwrap()]
		.iter()
		.filter_map(|dir| fs::read_dir(dir).ok())
		.flatten()
		.filter_map(Result::ok)
		.map(|entry| entry.path())
		.find(|path| {
			let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
			name.starts_with(prefix) && name.ends_with(ext)
		})
		.unwrap_or_else(|| panic!("{prefix}*{ext} not found near {}", deps.display()))
}

/// Development area with the demo library installed as its built-in library.
fn area_with_builtin(dir: &Path) -> Config {
	fs::create_dir(dir.join("src")).unwrap();
	let config = Config::new(dir, Some(dir.join("release")), "test_arch");
	fs::create_dir_all(config.lib_dir()).unwrap();
	fs::copy(built_library(), config.lib_dir().join(library_file_name(BUILTIN_LIBRARY_NAME))).unwrap();
	config
}

#[test]
fn loader_registers_the_built_in_converters() {
	let loader = DylibLoader::new();
	let module = loader.load(&built_library()).unwrap();
	assert_eq!(module.payload_types(), vec!["std::string", "std::vector<unsigned char>"]);
	assert!(module.converter("std::vector_unsignedchar").is_none());

	let again = loader.load(&built_library()).unwrap();
	assert!(std::sync::Arc::ptr_eq(&module, &again));
}

#[test]
fn converter_outlives_its_loader() {
	let handle = {
		let loader = DylibLoader::new();
		loader.load_converter(&built_library(), "std::vector<unsigned char>").unwrap()
	};
	let xml = handle.invoke(&[0xde, 0xad]).unwrap();
	assert!(xml.contains("<size>2</size><data>dead</data>"), "{xml}");
}

#[test]
fn built_in_library_serves_conversions_end_to_end() {
	let dir = tempfile::tempdir().unwrap();
	let conv = Payload2Xml::new(area_with_builtin(dir.path()));

	let mut table = PayloadTable::new();
	table.insert("a1", "std::string", b"x < y".to_vec());
	table.insert("b2", "std::string", vec![0xff]);

	assert_eq!(
		conv.convert_to_xml(&table, "a1").unwrap(),
		"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<cmsCondPayload class=\"std::string\">x &lt; y</cmsCondPayload>\n"
	);
	let err = conv.convert_to_xml(&table, "b2").unwrap_err();
	assert!(err.to_string().contains("not UTF-8"), "{err}");
	assert_eq!(conv.registry().payload_types(), vec!["std::string".to_string()]);
}
