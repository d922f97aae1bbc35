//! The contract an engine heap owner provides
//!
//! Everything the boundary layer needs from the scripting engine goes
//! through `Engine`: var storage, proc dispatch, the string table, spatial
//! builtins and liveness/rooting of references. Implementations are owned by
//! the main context and are never shared across threads, so the trait has no
//! `Send` bound and every method takes the engine exclusively.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::list::ValueList;
use crate::string::StrId;
use crate::value::{RefKey, Value};

/// Engine version as reported by the heap owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, build: u32) -> Self {
        Self { major, minor, build }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{} (build {})", self.major, self.minor, self.build)
    }
}

/// Map coordinates used by the spatial builtins
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Xyz {
    pub x: i16,
    pub y: i16,
    pub z: i16,
    #[serde(skip)]
    junk: i16,
}

impl Xyz {
    pub const fn new(x: i16, y: i16, z: i16) -> Self {
        Self { x, y, z, junk: 0 }
    }

    /// True for the 0,0,0 position reported for atoms that are off the map
    pub fn is_off_map(&self) -> bool {
        self.x == 0 && self.y == 0 && self.z == 0
    }
}

impl From<(i16, i16, i16)> for Xyz {
    fn from((x, y, z): (i16, i16, i16)) -> Self {
        Xyz::new(x, y, z)
    }
}

/// Services consumed from the engine.
///
/// Reads that produce values hand them back untracked; the host registers
/// temporary references for anything reference-typed.
pub trait Engine {
    fn version(&self) -> Version;

    /// Look up an existing string. Must never intern.
    fn str_id(&self, s: &str) -> Option<StrId>;

    /// Whether `key` still names a live heap object
    fn is_live(&self, key: RefKey) -> bool;

    /// Root `key` on behalf of the boundary so collection keeps it alive
    fn pin(&mut self, key: RefKey);

    /// Drop the boundary's root for `key`. Unknown keys are ignored.
    fn unpin(&mut self, key: RefKey);

    fn read_var(&mut self, src: &Value, name: StrId) -> Result<Value>;
    fn write_var(&mut self, src: &Value, name: StrId, value: &Value) -> Result<()>;

    fn create_list(&mut self) -> Result<Value>;
    fn read_list(&mut self, list: &Value) -> Result<ValueList>;
    fn write_list(&mut self, list: &Value, values: &[Value]) -> Result<()>;

    /// Each element of `list` paired with its associated value, null where
    /// it has none
    fn read_list_assoc(&mut self, list: &Value) -> Result<Vec<(Value, Value)>> {
        Ok(self
            .read_list(list)?
            .into_iter()
            .map(|key| (key, Value::Null))
            .collect())
    }

    /// A number index is a 1-based position; any other index is a key and
    /// reads or writes the value associated with it.
    fn read_list_index(&mut self, list: &Value, index: &Value) -> Result<Value>;
    fn write_list_index(&mut self, list: &Value, index: &Value, value: &Value) -> Result<()>;

    fn read_pointer(&mut self, ptr: &Value) -> Result<Value>;
    fn write_pointer(&mut self, ptr: &Value, value: &Value) -> Result<()>;

    /// Call a proc on `src`, or a global proc when `src` is `None`.
    ///
    /// Never waits: a proc that suspends returns null and finishes later
    /// under the engine's own scheduler.
    fn call_proc(&mut self, src: Option<&Value>, name: StrId, args: &[Value]) -> Result<Value>;

    /// The engine's own value-to-text conversion
    fn to_text(&mut self, value: &Value) -> Result<String>;

    /// Length of a string in bytes or of a list in elements
    fn length(&mut self, value: &Value) -> Result<Value>;

    fn new_object(&mut self, type_path: &Value, args: &[Value]) -> Result<Value>;

    /// Like `new_object`, taking the arguments from an engine list
    fn new_object_arglist(&mut self, type_path: &Value, arglist: &Value) -> Result<Value> {
        if !arglist.is_list() {
            return Err(Error::type_mismatch("list", arglist));
        }
        let args = self.read_list(arglist)?;
        self.new_object(type_path, args.as_slice())
    }

    /// Number of live references the engine holds to `value`
    fn refcount(&mut self, value: &Value) -> Result<u32>;

    /// Position of an atom; off-map atoms report 0,0,0
    fn xyz(&mut self, value: &Value) -> Result<Xyz>;

    /// Turfs in the box spanned by two corners
    fn block(&mut self, corner1: Xyz, corner2: Xyz) -> Result<ValueList>;

    /// Find an instance of `needle` inside `haystack`, or anywhere when `None`
    fn locate_in(&mut self, needle: &Value, haystack: Option<&Value>) -> Result<Value>;

    /// The turf at `xyz`, or null
    fn locate_xyz(&mut self, xyz: Xyz) -> Result<Value>;

    /// Called once the boundary has released the temporaries of the tick
    /// that just ended.
    fn end_tick(&mut self) {}
}
