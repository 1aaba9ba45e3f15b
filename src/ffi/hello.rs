//! Exported greeting entry point.
//!
//! `say_hello` is the native-callable direction of the boundary: native code
//! looks it up by name and calls it as an ordinary C function. Its body runs
//! under the no-panic guard; internal failures are logged and swallowed
//! because the caller has nothing to hand them to.

use std::os::raw::c_int;

use crate::error::Result;
use crate::ffi::{bridge_table, guard};
use crate::registry::Direction;

type AddFn = unsafe extern "C" fn(c_int, c_int) -> c_int;

/// Prints a greeting, then the sum computed through the process-image
/// resolved symbol.
///
/// Emits its greeting line exactly once per invocation and returns nothing.
/// A failed resolution is logged, never propagated.
#[no_mangle]
pub extern "C" fn say_hello() {
    guard((), || {
        println!("Hello from Rust!");
        match round_trip_sum(4, 5) {
            Ok(sum) => println!("Rust called native: 4 + 5 = {sum}"),
            Err(err) => log::warn!("process-image round trip failed: {err}"),
        }
    });
}

/// Resolve `add_numbers` through the sentinel module and call it.
fn round_trip_sum(a: c_int, b: c_int) -> Result<c_int> {
    let entry = bridge_table().require(Direction::Outbound, "add_numbers")?;
    let add = unsafe { entry.typed::<AddFn>()? };
    Ok(unsafe { add(a, b) })
}
