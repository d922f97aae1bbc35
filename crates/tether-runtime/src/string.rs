//! String ids
//!
//! The engine interns strings and hands out stable numeric ids for them.
//! Looking a name up once and passing the id afterwards avoids hashing the
//! same var/proc name on every call.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Raw value of the "not found" sentinel (the engine's 16-bit NONE)
pub const STR_NONE: u32 = u16::MAX as u32;

/// An id into the engine's string table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrId(u32);

impl StrId {
    /// Returned by lookups for strings the engine has never interned
    pub const NONE: StrId = StrId(STR_NONE);

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        StrId(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == STR_NONE
    }

    /// `None` for the sentinel, `Some(self)` otherwise
    #[inline]
    pub const fn found(self) -> Option<StrId> {
        if self.is_none() {
            None
        } else {
            Some(self)
        }
    }
}

impl From<Option<StrId>> for StrId {
    fn from(id: Option<StrId>) -> Self {
        id.unwrap_or(StrId::NONE)
    }
}

impl fmt::Display for StrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "NONE")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}
