//! Declared cross-boundary entry points and their resolution state.
//!
//! A [`BoundaryEntry`] is the declaration of one call point crossing the
//! native boundary: a stable exported name, the C calling convention, and a
//! primitive-only signature. Outbound entries resolve their address through
//! the resolver on first use; inbound entries record what this image exports
//! so the set can be verified against the process image.

use std::fmt;
use std::os::raw::c_void;
use std::sync::OnceLock;

use crate::error::{BridgeError, Result};
use crate::module::{BindFlags, ModuleName};
use crate::resolver;

/// Which way a call crosses the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Foreign code calls an entry point exported by this image.
    Inbound,
    /// This crate calls a symbol owned by native code.
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => f.write_str("inbound"),
            Direction::Outbound => f.write_str("outbound"),
        }
    }
}

/// Calling convention of a boundary entry. Only the C convention exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallConv {
    #[default]
    C,
}

/// Primitive types allowed to cross the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimType {
    I32,
    I64,
    U32,
    U64,
    F32,
    F64,
    Ptr,
}

impl fmt::Display for PrimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrimType::I32 => "i32",
            PrimType::I64 => "i64",
            PrimType::U32 => "u32",
            PrimType::U64 => "u64",
            PrimType::F32 => "f32",
            PrimType::F64 => "f64",
            PrimType::Ptr => "ptr",
        };
        f.write_str(name)
    }
}

/// An ordered parameter list and optional return value, primitives only.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Signature {
    params: Vec<PrimType>,
    ret: Option<PrimType>,
}

impl Signature {
    pub fn new(params: &[PrimType], ret: Option<PrimType>) -> Signature {
        Signature {
            params: params.to_vec(),
            ret,
        }
    }

    pub fn params(&self) -> &[PrimType] {
        &self.params
    }

    pub fn ret(&self) -> Option<PrimType> {
        self.ret
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param}")?;
        }
        f.write_str(")")?;
        match self.ret {
            Some(ret) => write!(f, " -> {ret}"),
            None => Ok(()),
        }
    }
}

/// A declared, named, typed cross-boundary call point.
pub struct BoundaryEntry {
    symbol: String,
    module: ModuleName,
    direction: Direction,
    convention: CallConv,
    signature: Signature,
    // Successful resolutions only; failures are recomputed every call.
    address: OnceLock<usize>,
}

impl BoundaryEntry {
    /// Declare a symbol this crate imports from native code.
    pub fn outbound(module: ModuleName, symbol: &str, signature: Signature) -> BoundaryEntry {
        BoundaryEntry {
            symbol: symbol.to_string(),
            module,
            direction: Direction::Outbound,
            convention: CallConv::C,
            signature,
            address: OnceLock::new(),
        }
    }

    /// Declare a symbol this image exports to native code.
    ///
    /// Inbound entries always live in the process image.
    pub fn inbound(symbol: &str, signature: Signature) -> BoundaryEntry {
        BoundaryEntry {
            symbol: symbol.to_string(),
            module: ModuleName::Sentinel,
            direction: Direction::Inbound,
            convention: CallConv::C,
            signature,
            address: OnceLock::new(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn module(&self) -> &ModuleName {
        &self.module
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn convention(&self) -> CallConv {
        self.convention
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Address of the symbol, resolving its module on first use.
    ///
    /// Success is cached; a missing symbol fails on this call and every
    /// call after it. Named modules are opened lazily with their ordinary
    /// flags; the sentinel goes through the installed resolver.
    pub fn address(&self) -> Result<*const ()> {
        if let Some(&addr) = self.address.get() {
            return Ok(addr as *const ());
        }
        let handle = resolver::load(&self.module, BindFlags::lazy_global(), None)?;
        let addr = unsafe { handle.symbol::<*mut c_void>(&self.symbol)? } as usize;
        let addr = *self.address.get_or_init(|| addr);
        Ok(addr as *const ())
    }

    /// Reinterpret the resolved address as a concrete function type.
    ///
    /// # Safety
    /// `T` must be an `extern "C"` function pointer type matching the
    /// declared signature exactly. The declaration is trusted, not checked;
    /// a mismatch is undefined behavior at call time.
    pub unsafe fn typed<T: Copy>(&self) -> Result<T> {
        debug_assert_eq!(std::mem::size_of::<T>(), std::mem::size_of::<*const ()>());
        let addr = self.address()?;
        Ok(std::mem::transmute_copy::<*const (), T>(&addr))
    }
}

impl fmt::Debug for BoundaryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundaryEntry")
            .field("symbol", &self.symbol)
            .field("module", &self.module)
            .field("direction", &self.direction)
            .field("signature", &self.signature.to_string())
            .field("resolved", &self.address.get().is_some())
            .finish()
    }
}

/// The registered set of boundary entries.
///
/// Exported names are unique within their direction; the same name may
/// appear in both directions (a symbol this image exports can also be
/// imported back through the process image).
#[derive(Debug, Default)]
pub struct BoundaryTable {
    entries: Vec<BoundaryEntry>,
}

impl BoundaryTable {
    pub fn new() -> BoundaryTable {
        BoundaryTable::default()
    }

    /// Register an entry. Names must be unique within their direction.
    pub fn register(&mut self, entry: BoundaryEntry) -> Result<()> {
        if self.lookup(entry.direction, &entry.symbol).is_some() {
            return Err(BridgeError::DuplicateEntry {
                direction: entry.direction.to_string(),
                symbol: entry.symbol,
            });
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn lookup(&self, direction: Direction, symbol: &str) -> Option<&BoundaryEntry> {
        self.entries
            .iter()
            .find(|entry| entry.direction == direction && entry.symbol == symbol)
    }

    /// Like [`BoundaryTable::lookup`], but a miss is an error naming the
    /// symbol.
    pub fn require(&self, direction: Direction, symbol: &str) -> Result<&BoundaryEntry> {
        self.lookup(direction, symbol)
            .ok_or_else(|| BridgeError::SymbolNotFound {
                symbol: symbol.to_string(),
                module: format!("{direction} boundary table"),
            })
    }

    pub fn entries(&self) -> impl Iterator<Item = &BoundaryEntry> {
        self.entries.iter()
    }

    /// Resolve every entry in `direction`; the first failure aborts the
    /// batch. All-or-nothing: callers treat a partial set as unusable.
    pub fn resolve_all(&self, direction: Direction) -> Result<()> {
        for entry in self.entries.iter().filter(|e| e.direction == direction) {
            entry.address()?;
        }
        Ok(())
    }

    /// Check that every inbound entry is actually present in the process
    /// image's dynamic symbol table.
    ///
    /// A miss here means the image was linked without making the export
    /// dynamically visible.
    pub fn verify_inbound(&self) -> Result<()> {
        self.resolve_all(Direction::Inbound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::raw::c_int;

    fn int_binop_sig() -> Signature {
        Signature::new(&[PrimType::I32, PrimType::I32], Some(PrimType::I32))
    }

    #[test]
    fn test_signature_display() {
        assert_eq!(int_binop_sig().to_string(), "(i32, i32) -> i32");
        assert_eq!(Signature::new(&[], None).to_string(), "()");
    }

    #[test]
    fn test_duplicate_entries_rejected() {
        let mut table = BoundaryTable::new();
        table
            .register(BoundaryEntry::inbound("say_hello", Signature::new(&[], None)))
            .unwrap();
        let err = table
            .register(BoundaryEntry::inbound("say_hello", Signature::new(&[], None)))
            .unwrap_err();
        assert!(matches!(err, BridgeError::DuplicateEntry { .. }));
    }

    #[test]
    fn test_same_name_both_directions_allowed() {
        let mut table = BoundaryTable::new();
        table
            .register(BoundaryEntry::inbound("add_numbers", int_binop_sig()))
            .unwrap();
        table
            .register(BoundaryEntry::outbound(
                ModuleName::Sentinel,
                "add_numbers",
                int_binop_sig(),
            ))
            .unwrap();
        assert!(table.lookup(Direction::Inbound, "add_numbers").is_some());
        assert!(table.lookup(Direction::Outbound, "add_numbers").is_some());
    }

    #[test]
    fn test_outbound_libc_symbol_is_callable() {
        let entry = BoundaryEntry::outbound(
            ModuleName::Sentinel,
            "abs",
            Signature::new(&[PrimType::I32], Some(PrimType::I32)),
        );
        let first = entry.address().unwrap() as usize;
        let abs = unsafe {
            entry
                .typed::<unsafe extern "C" fn(c_int) -> c_int>()
                .unwrap()
        };
        assert_eq!(unsafe { abs(-5) }, 5);
        // Second use reuses the cached address.
        assert_eq!(entry.address().unwrap() as usize, first);
    }

    #[test]
    fn test_missing_symbol_fails_every_time() {
        let entry = BoundaryEntry::outbound(
            ModuleName::Sentinel,
            "nonexistent_fn",
            Signature::new(&[], None),
        );
        for _ in 0..3 {
            let err = entry.address().unwrap_err();
            assert!(matches!(err, BridgeError::SymbolNotFound { .. }));
        }
    }

    #[test]
    fn test_require_reports_missing_declaration() {
        let table = BoundaryTable::new();
        let err = table.require(Direction::Outbound, "add_numbers").unwrap_err();
        assert!(matches!(err, BridgeError::SymbolNotFound { .. }));
    }

    #[test]
    fn test_resolve_all_is_all_or_nothing() {
        let mut table = BoundaryTable::new();
        table
            .register(BoundaryEntry::outbound(
                ModuleName::Sentinel,
                "getpid",
                Signature::new(&[], Some(PrimType::I32)),
            ))
            .unwrap();
        table
            .register(BoundaryEntry::outbound(
                ModuleName::Sentinel,
                "nonexistent_fn",
                Signature::new(&[], None),
            ))
            .unwrap();
        let err = table.resolve_all(Direction::Outbound).unwrap_err();
        assert!(matches!(err, BridgeError::SymbolNotFound { .. }));
    }
}
