//! procsym - in-process symbol resolution and call boundary
//!
//! Maps the reserved module name `"__Internal"` to the current process image
//! so natively linked symbols resolve without a shared-object file on disk,
//! and declares the entry points that cross the C boundary in either
//! direction.
//!
//! The resolver special-cases exactly one name. Everything else defers to
//! the ordinary load path, so a host embedding this crate keeps its normal
//! library loading untouched:
//!
//! ```
//! use procsym::{resolve, ModuleName, Resolution};
//!
//! procsym::install();
//! match resolve(&ModuleName::parse("__Internal")).unwrap() {
//!     Resolution::Resolved(image) => assert!(image.is_process_image()),
//!     Resolution::Deferred => unreachable!(),
//! }
//! ```
//!
//! The C surface lives in [`ffi`]; the resolution machinery is usable as a
//! plain Rust library through [`module`], [`resolver`], and [`registry`].

pub mod error;
pub mod ffi;
pub mod module;
pub mod registry;
pub mod resolver;

pub use error::{BridgeError, Result};
pub use module::{exe_dir, BindFlags, ModuleHandle, ModuleName, ModuleOrigin, SENTINEL_MODULE};
pub use registry::{BoundaryEntry, BoundaryTable, CallConv, Direction, PrimType, Signature};
pub use resolver::{install, process_image, resolve, Resolution, Resolver};

mod tests;
