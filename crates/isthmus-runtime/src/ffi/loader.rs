//! Dynamic library loading for the native side
//!
//! [`LibraryLoader`] resolves a library name against platform naming
//! conventions and search paths. [`DynamicRuntime`] binds the fixed entry
//! points of a loaded library under its namespace prefix:
//! - `ffi_{ns}_rustbuffer_from_bytes`
//! - `ffi_{ns}_rustbuffer_free`
//! - `ffi_{ns}_uniffi_contract_version`
//! - `uniffi_{ns}_fn_init_callback_vtable_{interface}` (interface lowercased)
//!
//! Checksum symbols are looked up by their full names.

use crate::error::{Fault, ProtocolError};
use crate::ffi::native::NativeRuntime;
use crate::ffi::types::{CallStatus, CallbackVTable, ForeignBytes, TransferBuffer};
use libloading::Library;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Library loading errors
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("library not found: {name} (searched {searched} paths)")]
    LibraryNotFound { name: String, searched: usize },

    #[error("symbol '{symbol}' not found in library '{library}'")]
    SymbolNotFound { library: String, symbol: String },

    #[error("failed to load library {path}: {source}")]
    LoadFailed {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
}

/// Resolves library names to files on disk.
pub struct LibraryLoader {
    search_paths: Vec<PathBuf>,
}

impl LibraryLoader {
    /// Create a loader with the platform's default search paths
    pub fn new() -> Self {
        Self {
            search_paths: Self::default_search_paths(),
        }
    }

    /// Platform library directories, current working directory first:
    /// - Linux: /usr/lib, /usr/local/lib, /lib (and lib64 variants)
    /// - macOS: /usr/lib, /usr/local/lib, /opt/homebrew/lib
    /// - Windows: System32
    fn default_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        #[cfg(target_os = "linux")]
        {
            paths.push(PathBuf::from("/usr/lib"));
            paths.push(PathBuf::from("/usr/local/lib"));
            paths.push(PathBuf::from("/lib"));
            if cfg!(target_pointer_width = "64") {
                paths.push(PathBuf::from("/usr/lib64"));
                paths.push(PathBuf::from("/lib64"));
            }
        }

        #[cfg(target_os = "macos")]
        {
            paths.push(PathBuf::from("/usr/lib"));
            paths.push(PathBuf::from("/usr/local/lib"));
            paths.push(PathBuf::from("/opt/homebrew/lib"));
        }

        #[cfg(target_os = "windows")]
        {
            if let Ok(system_root) = std::env::var("SystemRoot") {
                paths.push(PathBuf::from(format!("{}\\System32", system_root)));
            }
        }

        if let Ok(cwd) = std::env::current_dir() {
            paths.insert(0, cwd);
        }

        paths
    }

    /// Add a search path ahead of the existing ones
    pub fn add_search_path(&mut self, path: impl Into<PathBuf>) {
        self.search_paths.insert(0, path.into());
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Resolve a short name (`torii` → `libtorii.so`) or a path.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        let path = Path::new(name);
        if path.components().count() > 1 || path.extension().is_some() {
            return path.exists().then(|| path.to_path_buf());
        }

        let extensions: &[&str] = if cfg!(target_os = "windows") {
            &["dll"]
        } else if cfg!(target_os = "macos") {
            &["dylib", "so"]
        } else {
            &["so"]
        };
        let prefixes: &[&str] = if cfg!(target_os = "windows") {
            &["", "lib"]
        } else {
            &["lib", ""]
        };

        for dir in &self.search_paths {
            for prefix in prefixes {
                for ext in extensions {
                    let candidate = dir.join(format!("{}{}.{}", prefix, name, ext));
                    if candidate.exists() {
                        return Some(candidate);
                    }
                }
            }
        }
        None
    }

    /// Resolve and open a library, binding its fixed entry points.
    ///
    /// # Safety
    ///
    /// Loading runs the library's initializers. The library must be trusted
    /// and must export the fixed entry points with the expected signatures.
    pub unsafe fn open(&self, name: &str, namespace: &str) -> Result<DynamicRuntime, LoadError> {
        let path = self.resolve(name).ok_or_else(|| LoadError::LibraryNotFound {
            name: name.to_string(),
            searched: self.search_paths.len(),
        })?;
        DynamicRuntime::open(&path, namespace)
    }
}

impl Default for LibraryLoader {
    fn default() -> Self {
        Self::new()
    }
}

type BufferFromBytesFn = unsafe extern "C" fn(ForeignBytes, *mut CallStatus) -> TransferBuffer;
type BufferFreeFn = unsafe extern "C" fn(TransferBuffer, *mut CallStatus);
type ContractVersionFn = unsafe extern "C" fn() -> u32;
type ChecksumFn = unsafe extern "C" fn() -> u16;
type InitVTableFn = unsafe extern "C" fn(*const CallbackVTable);

/// [`NativeRuntime`] backed by a dynamically loaded library.
pub struct DynamicRuntime {
    namespace: String,
    path: PathBuf,
    buffer_from_bytes: BufferFromBytesFn,
    buffer_free: BufferFreeFn,
    contract_version: ContractVersionFn,
    // Keeps the function pointers above valid; declared last so it drops last.
    library: Library,
}

impl DynamicRuntime {
    /// Open the library at `path` and bind the fixed entry points.
    ///
    /// # Safety
    ///
    /// See [`LibraryLoader::open`].
    pub unsafe fn open(path: &Path, namespace: &str) -> Result<Self, LoadError> {
        let library = Library::new(path).map_err(|source| LoadError::LoadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let runtime = Self {
            namespace: namespace.to_string(),
            path: path.to_path_buf(),
            buffer_from_bytes: symbol(&library, path, &format!("ffi_{}_rustbuffer_from_bytes", namespace))?,
            buffer_free: symbol(&library, path, &format!("ffi_{}_rustbuffer_free", namespace))?,
            contract_version: symbol(&library, path, &format!("ffi_{}_uniffi_contract_version", namespace))?,
            library,
        };
        tracing::debug!(path = %path.display(), namespace, "loaded native library");
        Ok(runtime)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up an arbitrary symbol, for per-operation entry points.
    ///
    /// # Safety
    ///
    /// `T` must match the symbol's actual type.
    pub unsafe fn symbol<T: Copy>(&self, name: &str) -> Result<T, LoadError> {
        symbol(&self.library, &self.path, name)
    }
}

unsafe fn symbol<T: Copy>(library: &Library, path: &Path, name: &str) -> Result<T, LoadError> {
    library
        .get::<T>(name.as_bytes())
        .map(|sym| *sym)
        .map_err(|_| LoadError::SymbolNotFound {
            library: path.display().to_string(),
            symbol: name.to_string(),
        })
}

impl NativeRuntime for DynamicRuntime {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    unsafe fn buffer_from_bytes(&self, bytes: ForeignBytes, status: &mut CallStatus) -> TransferBuffer {
        (self.buffer_from_bytes)(bytes, status)
    }

    unsafe fn buffer_free(&self, buffer: TransferBuffer, status: &mut CallStatus) {
        (self.buffer_free)(buffer, status)
    }

    fn contract_version(&self) -> u32 {
        // Safety: bound at open time with this signature
        unsafe { (self.contract_version)() }
    }

    fn checksum(&self, symbol: &str) -> Option<u16> {
        // Safety: checksum symbols are `uint16_t fn(void)`
        let checksum_fn = unsafe { self.symbol::<ChecksumFn>(symbol) }.ok()?;
        Some(unsafe { checksum_fn() })
    }

    fn init_callback_vtable(&self, interface: &str, vtable: &'static CallbackVTable) -> Result<(), Fault> {
        let name = format!(
            "uniffi_{}_fn_init_callback_vtable_{}",
            self.namespace,
            interface.to_lowercase()
        );
        // Safety: init symbols take a pointer to a vtable that outlives the library
        let init = unsafe { self.symbol::<InitVTableFn>(&name) }
            .map_err(|_| ProtocolError::MissingEntryPoint(name.clone()))?;
        unsafe { init(vtable) };
        Ok(())
    }
}

impl std::fmt::Debug for DynamicRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicRuntime")
            .field("namespace", &self.namespace)
            .field("path", &self.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_search_paths_start_with_cwd() {
        let paths = LibraryLoader::default_search_paths();
        assert!(!paths.is_empty());
        if let Ok(cwd) = std::env::current_dir() {
            assert_eq!(paths[0], cwd);
        }
    }

    #[test]
    fn test_platform_specific_paths() {
        let paths = LibraryLoader::default_search_paths();

        #[cfg(target_os = "linux")]
        assert!(paths.iter().any(|p| p == Path::new("/usr/lib")));

        #[cfg(target_os = "macos")]
        assert!(paths.iter().any(|p| p == Path::new("/usr/lib")));

        let _ = paths;
    }

    #[test]
    fn test_library_not_found() {
        let loader = LibraryLoader::new();
        let result = unsafe { loader.open("nonexistent_library_xyz", "xyz") };
        assert!(matches!(result, Err(LoadError::LibraryNotFound { .. })));
    }

    #[test]
    fn test_add_search_path_takes_priority() {
        let mut loader = LibraryLoader::new();
        loader.add_search_path("/custom/path");
        assert_eq!(loader.search_paths()[0], PathBuf::from("/custom/path"));
    }

    #[test]
    fn test_resolve_in_search_path() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().to_path_buf();
        let file_name = if cfg!(target_os = "windows") {
            "torii.dll"
        } else if cfg!(target_os = "macos") {
            "libtorii.dylib"
        } else {
            "libtorii.so"
        };
        let file = dir.join(file_name);
        std::fs::write(&file, b"").unwrap();

        let mut loader = LibraryLoader::new();
        loader.add_search_path(&dir);
        assert_eq!(loader.resolve("torii"), Some(file.clone()));
        assert_eq!(loader.resolve(file.to_str().unwrap()), Some(file));
    }

    #[test]
    fn test_open_non_library_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("libbroken.so");
        std::fs::write(&file, b"not a shared object").unwrap();

        let result = unsafe { DynamicRuntime::open(&file, "broken") };
        assert!(matches!(result, Err(LoadError::LoadFailed { .. })));
    }
}
