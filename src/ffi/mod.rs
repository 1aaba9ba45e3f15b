//! C ABI surface of the crate.
//!
//! This module exports the entry points native code may call, all
//! `#[no_mangle]` with `extern "C"` linkage. The actual logic is in
//! `module`, `resolver`, and `registry`; these functions are thin wrappers
//! that handle null checks, C string conversion, and the no-panic boundary
//! contract.

pub mod hello;
pub mod lifecycle;
pub mod simple;

pub use hello::say_hello;
pub use lifecycle::{
    ps_install, ps_last_error, ps_module_close, ps_module_is_process_image, ps_module_open,
    ps_symbol_address,
};
pub use simple::add_numbers;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::OnceLock;

use crate::registry::{BoundaryEntry, BoundaryTable, PrimType, Signature};
use crate::ModuleName;

/// Run `body` without letting a panic escape into native code.
///
/// The caller has no unwind model; a panic is logged and replaced by
/// `default`.
pub(crate) fn guard<T>(default: T, body: impl FnOnce() -> T) -> T {
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(value) => value,
        Err(_) => {
            log::error!("panic reached an exported entry point; returning default value");
            default
        }
    }
}

/// The crate's declared boundary entries, both directions.
///
/// Inbound rows are the names this image exports; the outbound row is the
/// in-process symbol the resolved call path imports back.
pub fn bridge_table() -> &'static BoundaryTable {
    static TABLE: OnceLock<BoundaryTable> = OnceLock::new();
    TABLE.get_or_init(|| {
        let int_binop = Signature::new(&[PrimType::I32, PrimType::I32], Some(PrimType::I32));
        let mut table = BoundaryTable::new();
        let entries = [
            BoundaryEntry::inbound("say_hello", Signature::new(&[], None)),
            BoundaryEntry::inbound("add_numbers", int_binop.clone()),
            BoundaryEntry::outbound(ModuleName::Sentinel, "add_numbers", int_binop),
        ];
        for entry in entries {
            if let Err(err) = table.register(entry) {
                debug_assert!(false, "static boundary table: {err}");
                log::error!("skipping boundary entry: {err}");
            }
        }
        table
    })
}
