fn main() {
    // Test binaries don't place #[no_mangle] exports in their dynamic symbol
    // table; -rdynamic does, so process-image lookups can find them in tests.
    //
    // The crate's tests are unit tests compiled into the lib's test harness
    // (not a `tests/` integration target), so `rustc-link-arg-tests` — which
    // only applies to `Test`-kind targets — does not reach them and errors
    // that the package has no test target. The general `rustc-link-arg` form
    // reaches every linker-invoking target, including the unit-test binary.
    if std::env::var_os("CARGO_CFG_UNIX").is_some() {
        println!("cargo:rustc-link-arg=-rdynamic");
    }
}
