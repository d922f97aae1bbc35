//! Value layer for the tether engine boundary
//!
//! Provides the types shared by everything that talks to the engine heap:
//! - Value representation (tagged, with owned strings)
//! - ValueList, the growable list used for arguments and bulk list transfer
//! - Reference lifecycle (temporary and permanent holds)
//! - The Engine trait and an in-process implementation of it

pub mod value;
pub mod error;
pub mod list;
pub mod string;
pub mod engine;
pub mod refs;
pub mod heap;

pub use value::{RefId, RefKey, RefKind, Value, ValueKind};
pub use error::{Error, ErrorKind, Result};
pub use list::ValueList;
pub use string::{StrId, STR_NONE};
pub use engine::{Engine, Version, Xyz};
pub use refs::{Ownership, ReferenceTable, Tick};
pub use heap::{Continuation, MemoryEngine, ProcFn, ProcOutcome};
