use std::path::PathBuf;
use std::{env, fs};

const HEADER: &str = "\
/* Converter module ABI for the payload-to-XML host.
 *
 * A module exports condxml_module_entry_v1. In generated C++ plugins the
 * PAYLOAD_2XML_MODULE macro expands to this definition and each
 * PAYLOAD_2XML_CLASS registers one converter through host->register_converter.
 */";

const ENTRY_PROTOTYPE: &str = "
#ifdef __cplusplus
extern \"C\" {
#endif

CondXmlStatus condxml_module_entry_v1(const CondXmlHostV1 *host, void *registrar, CondXmlModuleV1 *out_module);

#ifdef __cplusplus
}
#endif";

fn main() {
	let crate_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
	let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());

	println!("cargo:rerun-if-changed=src/lib.rs");
	println!("cargo:rerun-if-changed=build.rs");

	let bindings = cbindgen::Builder::new()
		.with_crate(&crate_dir)
		.with_language(cbindgen::Language::C)
		.with_cpp_compat(true)
		.with_include_guard("CONDXML_CABI_H")
		.with_header(HEADER)
		.with_trailer(ENTRY_PROTOTYPE)
		.with_no_includes()
		.with_sys_include("stddef.h")
		.with_sys_include("stdint.h")
		.generate();
	let bindings = match bindings {
		Ok(bindings) => bindings,
		Err(e) => {
			println!("cargo:warning=condxml_cabi.h not generated: {e}");
			return;
		}
	};

	let out_header = out_dir.join("condxml_cabi.h");
	bindings.write_to_file(&out_header);

	// Also emit to workspace target/generated for convenient access.
	if let Some(workspace_root) = crate_dir.parent().and_then(|p| p.parent()) {
		let gen_dir = workspace_root.join("target/generated");
		let _ = fs::create_dir_all(&gen_dir);
		let _ = fs::copy(&out_header, gen_dir.join("condxml_cabi.h"));
	}
}
