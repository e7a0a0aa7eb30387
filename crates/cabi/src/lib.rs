#![allow(non_camel_case_types)]
//! C ABI between the converter host and converter modules.
//!
//! A converter module is a shared library exporting [`MODULE_ENTRY_SYMBOL`]. The host
//! calls it once after loading; the module registers one conversion function per
//! payload type through [`CondXmlHostV1::register_converter`] and fills in a
//! [`CondXmlModuleV1`] describing itself.
//!
//! Strings crossing the boundary are length-delimited UTF-8, never NUL-terminated.
//! Buffers allocated by the module are released with [`CondXmlModuleV1::free_str`].

use core::ffi::c_void;

/// ABI version implemented by this crate.
pub const CONDXML_ABI_VERSION: u32 = 1;

/// Name of the entry point every converter module exports.
pub const MODULE_ENTRY_SYMBOL: &[u8] = b"condxml_module_entry_v1\0";

/// Status returned across the boundary.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondXmlStatus {
	Ok = 0,
	Failed = 1,
	Incompatible = 2,
	InvalidArgument = 3,
}

/// Borrowed string view. Valid only for the duration of the call it is passed to.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CondXmlStr {
	pub ptr: *const u8,
	pub len: usize,
}

impl CondXmlStr {
	pub const EMPTY: Self = Self {
		ptr: core::ptr::null(),
		len: 0,
	};

	pub fn new(s: &str) -> Self {
		Self {
			ptr: s.as_ptr(),
			len: s.len(),
		}
	}

	/// Views the bytes as UTF-8, or `None` if they are not.
	///
	/// # Safety
	///
	/// `ptr` must be null or point to `len` readable bytes that outlive `'a`.
	pub unsafe fn as_str<'a>(self) -> Option<&'a str> {
		if self.ptr.is_null() {
			return Some("");
		}
		let bytes = unsafe { core::slice::from_raw_parts(self.ptr, self.len) };
		core::str::from_utf8(bytes).ok()
	}
}

/// Heap string handed from one side to the other. The allocating side frees it.
#[repr(C)]
#[derive(Debug)]
pub struct CondXmlOwnedStr {
	pub ptr: *mut u8,
	pub len: usize,
}

impl CondXmlOwnedStr {
	pub const EMPTY: Self = Self {
		ptr: core::ptr::null_mut(),
		len: 0,
	};

	/// Leaks `s` into a boxed byte slice owned by the receiver until freed.
	pub fn from_string(s: String) -> Self {
		let bytes = s.into_bytes().into_boxed_slice();
		let len = bytes.len();
		let ptr = Box::into_raw(bytes) as *mut u8;
		Self { ptr, len }
	}

	pub fn is_null(&self) -> bool {
		self.ptr.is_null()
	}

	/// Reclaims a buffer produced by [`CondXmlOwnedStr::from_string`] in the same allocator.
	///
	/// # Safety
	///
	/// The buffer must come from `from_string` in this very binary and must not be used again.
	pub unsafe fn into_string(self) -> Option<String> {
		if self.ptr.is_null() {
			return None;
		}
		let slice = core::ptr::slice_from_raw_parts_mut(self.ptr, self.len);
		let bytes = unsafe { Box::from_raw(slice) };
		Some(String::from_utf8_lossy(&bytes).into_owned())
	}

	/// Copies the bytes without taking ownership.
	///
	/// # Safety
	///
	/// `ptr` must be null or point to `len` readable bytes.
	pub unsafe fn to_string_lossy(&self) -> Option<String> {
		if self.ptr.is_null() {
			return None;
		}
		let bytes = unsafe { core::slice::from_raw_parts(self.ptr, self.len) };
		Some(String::from_utf8_lossy(bytes).into_owned())
	}
}

/// Converts `len` payload bytes at `data` into XML written to `out`.
///
/// On [`CondXmlStatus::Ok`] `out` holds the document; on failure it may hold a message.
pub type CondXmlConvertFn = unsafe extern "C" fn(data: *const u8, len: usize, out: *mut CondXmlOwnedStr) -> CondXmlStatus;

/// Host callback registering `convert` for `payload_type`. Only valid during the entry call.
pub type CondXmlRegisterFn = unsafe extern "C" fn(registrar: *mut c_void, payload_type: CondXmlStr, convert: CondXmlConvertFn) -> CondXmlStatus;

/// Host services offered to a module during its entry call.
#[repr(C)]
pub struct CondXmlHostV1 {
	pub struct_size: usize,
	pub abi_version: u32,
	pub register_converter: CondXmlRegisterFn,
	pub log: Option<extern "C" fn(msg: CondXmlStr)>,
}

/// Module description filled in by the entry point.
#[repr(C)]
pub struct CondXmlModuleV1 {
	pub abi_version: u32,
	pub free_str: Option<unsafe extern "C" fn(s: CondXmlOwnedStr)>,
}

/// Signature of [`MODULE_ENTRY_SYMBOL`].
pub type CondXmlModuleEntryV1 = unsafe extern "C" fn(host: *const CondXmlHostV1, registrar: *mut c_void, out_module: *mut CondXmlModuleV1) -> CondXmlStatus;
