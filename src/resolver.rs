//! Sentinel-aware module resolution with install-once state.
//!
//! The resolver answers exactly one question: should a requested module name
//! be satisfied from the current process image, or left to the ordinary
//! load path? The sentinel name resolves to a process-image handle opened at
//! most once; every other name defers.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use crate::error::Result;
use crate::module::{BindFlags, ModuleHandle, ModuleName};

/// Outcome of asking the resolver for a module.
#[derive(Debug)]
pub enum Resolution {
    /// The resolver satisfied the request from the process image.
    Resolved(&'static ModuleHandle),
    /// Not a name the resolver handles; the ordinary load path applies.
    Deferred,
}

/// Process-wide resolver configuration.
///
/// At most one resolver is ever active. Installation is first-wins: the
/// first `install` (or the first resolution, which self-installs the
/// default) decides the sentinel flags, and every later install is a no-op.
#[derive(Debug, Clone, Copy)]
pub struct Resolver {
    /// Flags passed to the process-image open.
    pub sentinel_flags: BindFlags,
}

impl Default for Resolver {
    fn default() -> Resolver {
        Resolver {
            sentinel_flags: BindFlags::process_default(),
        }
    }
}

static INSTALLED: OnceLock<Resolver> = OnceLock::new();
static PROCESS_IMAGE: OnceLock<Result<ModuleHandle>> = OnceLock::new();
static NAMED: OnceLock<Mutex<HashMap<String, &'static ModuleHandle>>> = OnceLock::new();

impl Resolver {
    /// Install this resolver process-wide.
    ///
    /// Returns `true` if this call installed it, `false` if a resolver was
    /// already active. Racing installers are safe; losers change nothing.
    pub fn install(self) -> bool {
        let mut won = false;
        INSTALLED.get_or_init(|| {
            won = true;
            self
        });
        won
    }
}

/// Install the default resolver. See [`Resolver::install`].
pub fn install() -> bool {
    Resolver::default().install()
}

/// Flags the active resolver uses for the sentinel open.
pub fn sentinel_flags() -> BindFlags {
    INSTALLED.get_or_init(Resolver::default).sentinel_flags
}

/// Resolve `name`.
///
/// The sentinel resolves to the cached process-image handle; any other name
/// yields [`Resolution::Deferred`] without touching the loader.
pub fn resolve(name: &ModuleName) -> Result<Resolution> {
    match name {
        ModuleName::Sentinel => process_image().map(Resolution::Resolved),
        ModuleName::Named(_) => Ok(Resolution::Deferred),
    }
}

/// The process-image handle, opened on first use with the active resolver's
/// flags and cached for the life of the process.
///
/// A failed open is not retried: the cause is structural, and every caller
/// observes the same failure at its point of first symbol use.
pub fn process_image() -> Result<&'static ModuleHandle> {
    let flags = sentinel_flags();
    let slot = PROCESS_IMAGE.get_or_init(|| ModuleHandle::open_process_image(flags));
    match slot {
        Ok(handle) => Ok(handle),
        Err(err) => Err(err.clone()),
    }
}

/// Resolve `name`, following a deferral down the ordinary load path.
///
/// Named modules are opened at most once per name and cached for the life of
/// the process; `flags` and `hint` apply only to the open that actually
/// happens.
pub fn load(
    name: &ModuleName,
    flags: BindFlags,
    hint: Option<&Path>,
) -> Result<&'static ModuleHandle> {
    match resolve(name)? {
        Resolution::Resolved(handle) => Ok(handle),
        Resolution::Deferred => load_named(name.as_str(), flags, hint),
    }
}

fn load_named(name: &str, flags: BindFlags, hint: Option<&Path>) -> Result<&'static ModuleHandle> {
    let cache = NAMED.get_or_init(|| Mutex::new(HashMap::new()));
    let mut cache = cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(&handle) = cache.get(name) {
        return Ok(handle);
    }
    // Failures are recomputed on every use, never cached.
    let handle = ModuleHandle::open_named(name, flags, hint)?;
    let handle: &'static ModuleHandle = Box::leak(Box::new(handle));
    cache.insert(name.to_string(), handle);
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_modules_defer() {
        let name = ModuleName::parse("libm.so.6");
        assert!(matches!(resolve(&name).unwrap(), Resolution::Deferred));
    }

    #[test]
    fn test_sentinel_resolves_to_process_image() {
        let name = ModuleName::parse("__Internal");
        match resolve(&name).unwrap() {
            Resolution::Resolved(handle) => {
                assert!(handle.is_valid());
                assert!(handle.is_process_image());
            }
            Resolution::Deferred => panic!("sentinel must not defer"),
        }
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let first = process_image().unwrap();
        let second = process_image().unwrap();
        assert_eq!(first.raw(), second.raw());
    }

    #[test]
    fn test_duplicate_install_is_harmless() {
        // Whichever install wins, later installs no-op and resolution
        // behaves identically.
        install();
        assert!(!install());
        assert!(!Resolver::default().install());

        let before = process_image().unwrap().raw();
        install();
        let after = process_image().unwrap().raw();
        assert_eq!(before, after);
    }

    #[test]
    fn test_concurrent_first_use_yields_one_handle() {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                std::thread::spawn(|| {
                    install();
                    process_image().map(|handle| handle.raw() as usize)
                })
            })
            .collect();

        let mut raws = Vec::new();
        for handle in handles {
            raws.push(handle.join().unwrap().unwrap());
        }
        raws.dedup();
        assert_eq!(raws.len(), 1);
    }

    #[test]
    fn test_load_follows_deferral() {
        let err = load(
            &ModuleName::parse("libprocsym_no_such_lib.so"),
            BindFlags::lazy_global(),
            None,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            crate::error::BridgeError::ResolutionFailed { .. }
        ));
    }

    #[test]
    fn test_load_sentinel_matches_process_image() {
        let via_load = load(&ModuleName::Sentinel, BindFlags::lazy_global(), None).unwrap();
        assert_eq!(via_load.raw(), process_image().unwrap().raw());
    }
}
