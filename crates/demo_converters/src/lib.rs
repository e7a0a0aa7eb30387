#![allow(non_snake_case)]
//! Built-in converter library for payloads of standard library types.
//!
//! Installed into an area's library directory as `pluginUtilities_payload2xml`, where
//! discovery looks before building anything on demand.

use core::ffi::c_void;

use condxml_cabi::{CONDXML_ABI_VERSION, CondXmlConvertFn, CondXmlHostV1, CondXmlModuleV1, CondXmlOwnedStr, CondXmlStatus, CondXmlStr};
use quick_xml::escape::escape;

/// Payload types this library converts, with their conversion functions.
pub const CONVERTERS: &[(&str, CondXmlConvertFn)] = &[("std::string", convert_string), ("std::vector<unsigned char>", convert_bytes)];

#[unsafe(no_mangle)]
/// # Safety
/// `host` and `out_module` must be non-null and valid for the duration of this call; `registrar`
/// is passed back to the host untouched.
pub unsafe extern "C" fn condxml_module_entry_v1(host: *const CondXmlHostV1, registrar: *mut c_void, out_module: *mut CondXmlModuleV1) -> CondXmlStatus {
	if host.is_null() || out_module.is_null() {
		return CondXmlStatus::InvalidArgument;
	}

	let host = unsafe { &*host };
	if host.abi_version != CONDXML_ABI_VERSION {
		return CondXmlStatus::Incompatible;
	}

	for (payload_type, convert) in CONVERTERS {
		let status = unsafe { (host.register_converter)(registrar, CondXmlStr::new(payload_type), *convert) };
		if status != CondXmlStatus::Ok {
			return status;
		}
	}

	if let Some(log) = host.log {
		log(CondXmlStr::new("registered built-in XML converters"));
	}

	unsafe {
		*out_module = CondXmlModuleV1 {
			abi_version: CONDXML_ABI_VERSION,
			free_str: Some(free_str),
		};
	}
	CondXmlStatus::Ok
}

unsafe extern "C" fn free_str(s: CondXmlOwnedStr) {
	drop(unsafe { s.into_string() });
}

/// Wraps `body` in the document element shared by all converters.
fn document(payload_type: &str, body: &str) -> String {
	format!(
		"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<cmsCondPayload class=\"{}\">{}</cmsCondPayload>\n",
		escape(payload_type),
		body
	)
}

/// Runs `render` over the payload bytes and hands its result to the host.
unsafe fn respond(data: *const u8, len: usize, out: *mut CondXmlOwnedStr, render: impl FnOnce(&[u8]) -> Result<String, String>) -> CondXmlStatus {
	if out.is_null() || (data.is_null() && len != 0) {
		return CondXmlStatus::InvalidArgument;
	}
	let payload = if len == 0 { &[][..] } else { unsafe { core::slice::from_raw_parts(data, len) } };
	let (status, text) = match render(payload) {
		Ok(xml) => (CondXmlStatus::Ok, xml),
		Err(message) => (CondXmlStatus::Failed, message),
	};
	unsafe { *out = CondXmlOwnedStr::from_string(text) };
	status
}

unsafe extern "C" fn convert_string(data: *const u8, len: usize, out: *mut CondXmlOwnedStr) -> CondXmlStatus {
	unsafe {
		respond(data, len, out, |payload| {
			let text = core::str::from_utf8(payload).map_err(|e| format!("std::string payload is not UTF-8: {e}"))?;
			Ok(document("std::string", &escape(text)))
		})
	}
}

unsafe extern "C" fn convert_bytes(data: *const u8, len: usize, out: *mut CondXmlOwnedStr) -> CondXmlStatus {
	unsafe {
		respond(data, len, out, |payload| {
			let hex: String = payload.iter().map(|b| format!("{b:02x}")).collect();
			let body = format!("<size>{}</size><data>{hex}</data>", payload.len());
			Ok(document("std::vector<unsigned char>", &body))
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[derive(Default)]
	struct Collected(Vec<(String, CondXmlConvertFn)>);

	unsafe extern "C" fn collect(registrar: *mut c_void, payload_type: CondXmlStr, convert: CondXmlConvertFn) -> CondXmlStatus {
		let collected = unsafe { &mut *registrar.cast::<Collected>() };
		let name = unsafe { payload_type.as_str() }.unwrap_or_default().to_string();
		collected.0.push((name, convert));
		CondXmlStatus::Ok
	}

	fn host(abi_version: u32) -> CondXmlHostV1 {
		CondXmlHostV1 {
			struct_size: core::mem::size_of::<CondXmlHostV1>(),
			abi_version,
			register_converter: collect,
			log: None,
		}
	}

	fn run(convert: CondXmlConvertFn, payload: &[u8]) -> (CondXmlStatus, String) {
		let mut out = CondXmlOwnedStr::EMPTY;
		let status = unsafe { convert(payload.as_ptr(), payload.len(), &mut out) };
		let text = unsafe { out.into_string() }.unwrap_or_default();
		(status, text)
	}

	fn entry(abi_version: u32) -> (CondXmlStatus, Collected, CondXmlModuleV1) {
		let host = host(abi_version);
		let mut collected = Collected::default();
		let mut module = CondXmlModuleV1 {
			abi_version: 0,
			free_str: None,
		};
		let status = unsafe { condxml_module_entry_v1(&host, (&mut collected as *mut Collected).cast(), &mut module) };
		(status, collected, module)
	}

	#[test]
	fn entry_registers_every_converter() {
		let (status, collected, module) = entry(CONDXML_ABI_VERSION);
		assert_eq!(status, CondXmlStatus::Ok);
		assert_eq!(module.abi_version, CONDXML_ABI_VERSION);
		assert!(module.free_str.is_some());
		let names: Vec<_> = collected.0.iter().map(|(name, _)| name.as_str()).collect();
		assert_eq!(names, ["std::string", "std::vector<unsigned char>"]);
	}

	#[test]
	fn entry_rejects_other_abi_versions() {
		let (status, collected, _) = entry(CONDXML_ABI_VERSION + 1);
		assert_eq!(status, CondXmlStatus::Incompatible);
		assert!(collected.0.is_empty());
	}

	#[test]
	fn strings_are_escaped() {
		let (status, xml) = run(convert_string, b"a<b & c");
		assert_eq!(status, CondXmlStatus::Ok);
		assert_eq!(
			xml,
			"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<cmsCondPayload class=\"std::string\">a&lt;b &amp; c</cmsCondPayload>\n"
		);
	}

	#[test]
	fn invalid_utf8_string_fails_with_message() {
		let (status, message) = run(convert_string, &[0xff, 0xfe]);
		assert_eq!(status, CondXmlStatus::Failed);
		assert!(message.contains("not UTF-8"));
	}

	#[test]
	fn byte_vectors_are_hex_encoded() {
		let (status, xml) = run(convert_bytes, &[0x01, 0xab, 0x00]);
		assert_eq!(status, CondXmlStatus::Ok);
		assert!(xml.contains("class=\"std::vector&lt;unsigned char&gt;\""));
		assert!(xml.contains("<size>3</size><data>01ab00</data>"));

		let (status, xml) = run(convert_bytes, &[]);
		assert_eq!(status, CondXmlStatus::Ok);
		assert!(xml.contains("<size>0</size><data></data>"));
	}

	#[test]
	fn null_output_is_rejected() {
		let status = unsafe { convert_bytes(core::ptr::null(), 0, core::ptr::null_mut()) };
		assert_eq!(status, CondXmlStatus::InvalidArgument);
	}
}
