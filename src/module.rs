//! Module identity, loader flags, and loaded-module handles.

use std::ffi::OsStr;
use std::fmt;
use std::os::raw::{c_int, c_void};
use std::path::{Path, PathBuf};

use libloading::os::unix::Library;

use crate::error::{BridgeError, Result};

/// Reserved module name meaning "resolve against the current process image"
/// rather than a file on disk.
pub const SENTINEL_MODULE: &str = "__Internal";

/// A requested module, after classification.
///
/// The sentinel spelling is recognized here, once; call sites dispatch on the
/// variant instead of comparing strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModuleName {
    /// The current process image.
    Sentinel,
    /// An ordinary shared library, loaded by name or path.
    Named(String),
}

impl ModuleName {
    /// Classify a requested module name.
    pub fn parse(name: &str) -> ModuleName {
        if name == SENTINEL_MODULE {
            ModuleName::Sentinel
        } else {
            ModuleName::Named(name.to_string())
        }
    }

    /// The requested spelling.
    pub fn as_str(&self) -> &str {
        match self {
            ModuleName::Sentinel => SENTINEL_MODULE,
            ModuleName::Named(name) => name,
        }
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When symbols are bound, and whether they become visible to later lookups
/// by other modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindFlags {
    /// Resolve all symbols at open time instead of on first use
    /// (`RTLD_NOW` vs `RTLD_LAZY`).
    pub immediate_bind: bool,
    /// Make resolved symbols available to subsequent lookups from other
    /// modules (`RTLD_GLOBAL` vs `RTLD_LOCAL`).
    pub global_visibility: bool,
}

impl BindFlags {
    /// Flags the process image is opened with: bind now, visible globally.
    pub const fn process_default() -> BindFlags {
        BindFlags {
            immediate_bind: true,
            global_visibility: true,
        }
    }

    /// Flags for an ordinary shared library: bind on first use, visible
    /// globally.
    pub const fn lazy_global() -> BindFlags {
        BindFlags {
            immediate_bind: false,
            global_visibility: true,
        }
    }

    pub(crate) fn to_raw(self) -> c_int {
        let mut flags = if self.immediate_bind {
            libc::RTLD_NOW
        } else {
            libc::RTLD_LAZY
        };
        flags |= if self.global_visibility {
            libc::RTLD_GLOBAL
        } else {
            libc::RTLD_LOCAL
        };
        flags
    }
}

impl Default for BindFlags {
    fn default() -> BindFlags {
        BindFlags::process_default()
    }
}

/// Where a handle's symbol table came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleOrigin {
    /// The running process image and its dependency set.
    ProcessImage,
    /// A shared library opened by name or path.
    Shared(String),
}

impl fmt::Display for ModuleOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleOrigin::ProcessImage => f.write_str("process image"),
            ModuleOrigin::Shared(name) => write!(f, "module `{name}`"),
        }
    }
}

/// An opened symbol table: the process image or a shared library.
///
/// Dropping a handle releases the loader's reference. Handles cached by the
/// resolver live for the rest of the process and are never dropped.
pub struct ModuleHandle {
    lib: Library,
    raw: *mut c_void,
    origin: ModuleOrigin,
}

// The loader owns the underlying handle; lookups through it are thread-safe.
unsafe impl Send for ModuleHandle {}
unsafe impl Sync for ModuleHandle {}

impl ModuleHandle {
    /// Open the current process image as a symbol table.
    ///
    /// This is `dlopen(NULL, flags)`: the program itself plus every library
    /// already loaded into it.
    pub fn open_process_image(flags: BindFlags) -> Result<ModuleHandle> {
        let lib = unsafe { Library::open(None::<&OsStr>, flags.to_raw()) }.map_err(|err| {
            BridgeError::ResolutionFailed {
                module: SENTINEL_MODULE.to_string(),
                reason: err.to_string(),
            }
        })?;
        log::debug!("opened process image as a symbol table");
        Ok(ModuleHandle::wrap(lib, ModuleOrigin::ProcessImage))
    }

    /// Open a shared library by name or path.
    ///
    /// A bare name is joined onto `hint` when one is given; names containing
    /// a path separator are passed to the loader untouched.
    pub fn open_named(name: &str, flags: BindFlags, hint: Option<&Path>) -> Result<ModuleHandle> {
        let path: PathBuf = match hint {
            Some(dir) if !name.contains('/') => dir.join(name),
            _ => PathBuf::from(name),
        };
        let lib =
            unsafe { Library::open(Some(&path), flags.to_raw()) }.map_err(|err| {
                BridgeError::ResolutionFailed {
                    module: name.to_string(),
                    reason: err.to_string(),
                }
            })?;
        log::debug!("opened module `{name}`");
        Ok(ModuleHandle::wrap(lib, ModuleOrigin::Shared(name.to_string())))
    }

    fn wrap(lib: Library, origin: ModuleOrigin) -> ModuleHandle {
        // Round-trip through the raw handle so its value can be exposed.
        let raw = lib.into_raw();
        let lib = unsafe { Library::from_raw(raw) };
        ModuleHandle { lib, raw, origin }
    }

    /// The platform loader's raw handle value.
    pub fn raw(&self) -> *mut c_void {
        self.raw
    }

    /// Whether the open produced a usable handle.
    pub fn is_valid(&self) -> bool {
        !self.raw.is_null()
    }

    pub fn origin(&self) -> &ModuleOrigin {
        &self.origin
    }

    pub fn is_process_image(&self) -> bool {
        self.origin == ModuleOrigin::ProcessImage
    }

    /// Look up `symbol` and reinterpret its address as `T`.
    ///
    /// # Safety
    /// - `T` must be the symbol's real type (an `extern "C"` function pointer
    ///   or `*mut c_void` for the bare address); the declared type is
    ///   trusted, not checked.
    /// - The returned value is only valid while this handle stays loaded.
    pub unsafe fn symbol<T: Copy>(&self, symbol: &str) -> Result<T> {
        if symbol.contains('\0') {
            return Err(BridgeError::InvalidName(symbol.to_string()));
        }
        let sym = self
            .lib
            .get::<T>(symbol.as_bytes())
            .map_err(|_| BridgeError::SymbolNotFound {
                symbol: symbol.to_string(),
                module: self.origin.to_string(),
            })?;
        Ok(*sym)
    }

    /// Look up `symbol` and return its bare address.
    pub fn symbol_address(&self, symbol: &str) -> Result<*mut c_void> {
        unsafe { self.symbol::<*mut c_void>(symbol) }
    }
}

impl fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("raw", &self.raw)
            .field("origin", &self.origin)
            .finish()
    }
}

/// Directory containing the running executable, for use as a search hint
/// when a library is deployed next to the program.
pub fn exe_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe().map_err(|err| BridgeError::ResolutionFailed {
        module: "<current-exe>".to_string(),
        reason: err.to_string(),
    })?;
    exe.parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| BridgeError::ResolutionFailed {
            module: "<current-exe>".to_string(),
            reason: "executable path has no parent directory".to_string(),
        })
}
