//! Converter modules backed by shared libraries.

use std::collections::HashMap;
use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use condxml_cabi::{
	CONDXML_ABI_VERSION, CondXmlConvertFn, CondXmlHostV1, CondXmlModuleEntryV1, CondXmlModuleV1, CondXmlOwnedStr, CondXmlStatus, CondXmlStr,
	MODULE_ENTRY_SYMBOL,
};
use libloading::Library;
use parking_lot::Mutex;

use super::{ConverterModule, LoadError, Loader};
use crate::converter::{ConversionError, Converter, ConverterFactory, ConverterHandle};
use crate::sanitize::converter_symbol;

static HOST_V1: CondXmlHostV1 = CondXmlHostV1 {
	struct_size: std::mem::size_of::<CondXmlHostV1>(),
	abi_version: CONDXML_ABI_VERSION,
	register_converter: host_register_converter,
	log: Some(host_log),
};

/// Collects registrations made by a module during its entry call.
#[derive(Default)]
struct Registrar {
	entries: Vec<(String, CondXmlConvertFn)>,
}

unsafe extern "C" fn host_register_converter(registrar: *mut c_void, payload_type: CondXmlStr, convert: CondXmlConvertFn) -> CondXmlStatus {
	if registrar.is_null() {
		return CondXmlStatus::InvalidArgument;
	}
	let Some(name) = (unsafe { payload_type.as_str() }).filter(|name| !name.is_empty()) else {
		return CondXmlStatus::InvalidArgument;
	};
	// SAFETY: the only registrar handed to modules is the one `open_module` passes to the entry call.
	let registrar = unsafe { &mut *registrar.cast::<Registrar>() };
	registrar.entries.push((name.to_string(), convert));
	CondXmlStatus::Ok
}

extern "C" fn host_log(msg: CondXmlStr) {
	let text = unsafe { msg.as_str() }.unwrap_or("<invalid utf-8>");
	tracing::info!(target: "condxml::plugin", "{text}");
}

/// Converter calling into a loaded module. Keeps the library mapped while alive.
#[derive(Clone)]
struct DylibConverter {
	_library: Arc<Library>,
	convert: CondXmlConvertFn,
	free_str: Option<unsafe extern "C" fn(CondXmlOwnedStr)>,
}

impl Converter for DylibConverter {
	fn write(&self, payload: &[u8]) -> Result<String, ConversionError> {
		let mut out = CondXmlOwnedStr::EMPTY;
		let status = unsafe { (self.convert)(payload.as_ptr(), payload.len(), &mut out) };

		let bytes = if out.is_null() {
			None
		} else {
			let copy = unsafe { std::slice::from_raw_parts(out.ptr, out.len) }.to_vec();
			// Without `free_str` the module keeps ownership and the buffer is not ours to release.
			if let Some(free) = self.free_str {
				unsafe { free(out) };
			}
			Some(copy)
		};

		match status {
			CondXmlStatus::Ok => {
				let bytes = bytes.ok_or_else(|| ConversionError::Failed("converter returned no output".into()))?;
				String::from_utf8(bytes).map_err(|_| ConversionError::InvalidUtf8)
			}
			status => Err(ConversionError::Failed(match bytes {
				Some(message) => String::from_utf8_lossy(&message).into_owned(),
				None => format!("converter returned {status:?}"),
			})),
		}
	}
}

impl ConverterFactory for DylibConverter {
	fn instantiate(&self) -> Box<dyn Converter> {
		Box::new(self.clone())
	}
}

/// [`Loader`] opening converter modules with the platform dynamic loader.
///
/// Modules are cached per path for the lifetime of the loader, so a library's entry
/// point runs once no matter how often discovery tries it.
#[derive(Default)]
pub struct DylibLoader {
	modules: Mutex<HashMap<PathBuf, Arc<ConverterModule>>>,
}

impl DylibLoader {
	pub fn new() -> Self {
		Self::default()
	}
}

impl Loader for DylibLoader {
	fn load(&self, path: &Path) -> Result<Arc<ConverterModule>, LoadError> {
		if let Some(module) = self.modules.lock().get(path) {
			return Ok(Arc::clone(module));
		}
		if !path.exists() {
			return Err(LoadError::LibraryNotFound(path.to_path_buf()));
		}

		let module = Arc::new(open_module(path)?);
		tracing::debug!(
			path = %path.display(),
			converters = module.len(),
			"Loaded converter module"
		);
		self.modules.lock().insert(path.to_path_buf(), Arc::clone(&module));
		Ok(module)
	}
}

fn open_module(path: &Path) -> Result<ConverterModule, LoadError> {
	// SAFETY: loading runs the library's initializers; converter libraries are build outputs of the configured areas.
	let library = unsafe { Library::new(path) }.map_err(|e| LoadError::Open {
		path: path.to_path_buf(),
		reason: e.to_string(),
	})?;

	let entry: CondXmlModuleEntryV1 = unsafe { library.get::<CondXmlModuleEntryV1>(MODULE_ENTRY_SYMBOL) }
		.map(|symbol| *symbol)
		.map_err(|e| LoadError::EntryPointMissing {
			path: path.to_path_buf(),
			reason: e.to_string(),
		})?;

	initialize(path, Arc::new(library), entry)
}

/// Runs a module's entry point and wraps every converter it registers.
///
/// `library` must be the library `entry` lives in; each converter keeps it mapped.
fn initialize(path: &Path, library: Arc<Library>, entry: CondXmlModuleEntryV1) -> Result<ConverterModule, LoadError> {
	let mut registrar = Registrar::default();
	let mut descriptor = CondXmlModuleV1 {
		abi_version: 0,
		free_str: None,
	};
	let status = unsafe { entry(&HOST_V1, (&mut registrar as *mut Registrar).cast(), &mut descriptor) };
	if status != CondXmlStatus::Ok {
		return Err(LoadError::EntryPointFailed {
			path: path.to_path_buf(),
			status,
		});
	}
	if descriptor.abi_version != CONDXML_ABI_VERSION {
		return Err(LoadError::Incompatible {
			path: path.to_path_buf(),
			expected: CONDXML_ABI_VERSION,
			actual: descriptor.abi_version,
		});
	}

	let free_str = descriptor.free_str;
	let converters = registrar.entries.into_iter().map(|(payload_type, convert)| {
		let converter = DylibConverter {
			_library: Arc::clone(&library),
			convert,
			free_str,
		};
		let handle = ConverterHandle::new(converter_symbol(&payload_type), Arc::new(converter));
		(payload_type, handle)
	});
	Ok(ConverterModule::new(path, converters))
}
