//! Tagged value representation
//!
//! A `Value` is the unit exchanged with the engine. It is a closed sum over
//! the five kinds the engine understands:
//! - Null
//! - Number (IEEE single precision, as the engine stores it)
//! - String (owned on our side, released exactly once by `Drop`)
//! - Object / List references (a 32-bit id into the engine heap)
//!
//! Reference payloads are ids only. Copying or dropping a reference value
//! never touches the engine's reference counts; see `refs` for that.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Numeric id naming an object or list inside the engine heap
pub type RefId = u32;

/// Which engine namespace a reference id belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RefKind {
    Object,
    List,
}

/// A reference id qualified by its namespace.
///
/// Object ids and list ids are allocated independently by the engine, so the
/// pair is what identifies a referent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RefKey {
    pub kind: RefKind,
    pub id: RefId,
}

impl RefKey {
    #[inline]
    pub const fn object(id: RefId) -> Self {
        Self { kind: RefKind::Object, id }
    }

    #[inline]
    pub const fn list(id: RefId) -> Self {
        Self { kind: RefKind::List, id }
    }
}

impl fmt::Display for RefKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            RefKind::Object => write!(f, "[object 0x{:x}]", self.id),
            RefKind::List => write!(f, "[list 0x{:x}]", self.id),
        }
    }
}

/// Discriminant of a `Value`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Null,
    Number,
    String,
    Object,
    List,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Object => "object",
            ValueKind::List => "list",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A value exchanged across the engine boundary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum Value {
    #[default]
    Null,
    Number(f32),
    String(String),
    Object(RefId),
    List(RefId),
}

/// # Constructors
impl Value {
    /// Create a null value
    #[inline]
    pub const fn new() -> Self {
        Value::Null
    }

    #[inline]
    pub const fn null() -> Self {
        Value::Null
    }

    #[inline]
    pub const fn number(n: f32) -> Self {
        Value::Number(n)
    }

    /// Create a string value, copying `s`.
    ///
    /// Reports `AllocationFailed` instead of aborting if the copy cannot be
    /// allocated.
    pub fn string(s: &str) -> Result<Self> {
        Ok(Value::String(try_copy_str(s)?))
    }

    /// Create a reference value. Reference counts are not adjusted.
    #[inline]
    pub const fn new_ref(kind: RefKind, id: RefId) -> Self {
        match kind {
            RefKind::Object => Value::Object(id),
            RefKind::List => Value::List(id),
        }
    }

    #[inline]
    pub const fn from_key(key: RefKey) -> Self {
        Self::new_ref(key.kind, key.id)
    }
}

/// # Memory handling
impl Value {
    /// Release any string payload and reset to null.
    ///
    /// References are NOT released; freeing a value is not the same as
    /// letting go of the engine-side reference. Safe to call repeatedly.
    #[inline]
    pub fn free(&mut self) {
        *self = Value::Null;
    }

    /// Replace this value with a deep copy of `src`.
    ///
    /// On allocation failure `self` is left untouched.
    pub fn copy_from(&mut self, src: &Value) -> Result<()> {
        let copied = match src {
            Value::String(s) => Value::String(try_copy_str(s)?),
            other => other.clone(),
        };
        *self = copied;
        Ok(())
    }

    /// Take `src`'s payload, leaving `src` null. Never allocates.
    #[inline]
    pub fn move_from(&mut self, src: &mut Value) {
        *self = std::mem::take(src);
    }
}

/// # Typechecking
impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Number(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::Object(_) => ValueKind::Object,
            Value::List(_) => ValueKind::List,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    #[inline]
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    #[inline]
    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    #[inline]
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    #[inline]
    pub fn is_list(&self) -> bool {
        matches!(self, Value::List(_))
    }

    /// True for object and list references
    #[inline]
    pub fn is_ref(&self) -> bool {
        matches!(self, Value::Object(_) | Value::List(_))
    }

    /// Engine truthiness: null, zero and the empty string are false
    pub fn is_true(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Number(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Object(_) | Value::List(_) => true,
        }
    }
}

/// # Accessors
impl Value {
    pub fn get_number(&self) -> Result<f32> {
        match self {
            Value::Number(n) => Ok(*n),
            other => Err(Error::type_mismatch("number", other)),
        }
    }

    /// Number interpreted as a boolean (anything non-zero is true)
    pub fn get_bool(&self) -> Result<bool> {
        self.get_number().map(|n| n != 0.0)
    }

    pub fn get_string(&self) -> Result<&str> {
        match self {
            Value::String(s) => Ok(s),
            other => Err(Error::type_mismatch("string", other)),
        }
    }

    /// The reference key of an object or list value
    pub fn get_ref(&self) -> Result<RefKey> {
        self.ref_key()
            .ok_or_else(|| Error::type_mismatch("reference", self))
    }

    #[inline]
    pub fn ref_key(&self) -> Option<RefKey> {
        match self {
            Value::Object(id) => Some(RefKey::object(*id)),
            Value::List(id) => Some(RefKey::list(*id)),
            _ => None,
        }
    }
}

/// # In-place modifiers
impl Value {
    pub fn set_number(&mut self, n: f32) {
        *self = Value::Number(n);
    }

    /// Replace this value with a string. On failure `self` is untouched.
    pub fn set_string(&mut self, s: &str) -> Result<()> {
        *self = Value::string(s)?;
        Ok(())
    }

    pub fn set_ref(&mut self, kind: RefKind, id: RefId) {
        *self = Value::new_ref(kind, id);
    }
}

fn try_copy_str(s: &str) -> Result<String> {
    let mut owned = String::new();
    owned
        .try_reserve_exact(s.len())
        .map_err(|_| Error::AllocationFailed)?;
    owned.push_str(s);
    Ok(owned)
}

// Equality: same kind, then numeric value / string content / reference id.
// NaN compares unequal to itself, as in the engine.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Object(id) => write!(f, "{}", RefKey::object(*id)),
            Value::List(id) => write!(f, "{}", RefKey::list(*id)),
        }
    }
}

// From impls
impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Number(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Number(if value { 1.0 } else { 0.0 })
    }
}

impl From<RefKey> for Value {
    fn from(key: RefKey) -> Self {
        Value::from_key(key)
    }
}

impl TryFrom<&str> for Value {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Value::string(value)
    }
}

impl TryFrom<String> for Value {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Ok(Value::String(value))
    }
}

// TryFrom Value -> x impls
impl TryFrom<&Value> for f32 {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self> {
        value.get_number()
    }
}

impl TryFrom<Value> for f32 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        value.get_number()
    }
}

impl TryFrom<&Value> for bool {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self> {
        value.get_bool()
    }
}

impl TryFrom<&Value> for String {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self> {
        value.get_string().map(str::to_owned)
    }
}

impl TryFrom<Value> for String {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(Error::type_mismatch("string", &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_is_idempotent() {
        let mut v = Value::string("meow meow meow").unwrap();
        v.free();
        assert!(v.is_null());
        v.free();
        assert!(v.is_null());

        let mut r = Value::new_ref(RefKind::Object, 7);
        r.free();
        assert!(r.is_null());
    }

    #[test]
    fn test_kinds() {
        let null = Value::new();
        assert!(null.is_null());
        assert!(!null.is_number());
        assert!(!null.is_string());
        assert!(!null.is_ref());

        let number: Value = 42.0f32.into();
        assert!(number.is_number());
        assert_eq!(number.kind(), ValueKind::Number);

        let string: Value = "meow".try_into().unwrap();
        assert!(string.is_string());

        let list = Value::new_ref(RefKind::List, 3);
        assert!(list.is_ref());
        assert!(list.is_list());
        assert!(!list.is_object());
    }

    #[test]
    fn test_equality() {
        assert_eq!(Value::number(42.0), Value::number(42.0));
        assert_ne!(Value::number(f32::NAN), Value::number(f32::NAN));
        assert_eq!(Value::string("meow").unwrap(), Value::string("meow").unwrap());
        assert_eq!(Value::null(), Value::null());
        assert_eq!(Value::Object(5), Value::Object(5));

        // same id, different namespace
        assert_ne!(Value::Object(5), Value::List(5));
        assert_ne!(Value::null(), Value::number(0.0));
        assert_ne!(Value::string("1").unwrap(), Value::number(1.0));
    }

    #[test]
    fn test_accessors_do_not_convert() {
        let n = Value::number(1.0);
        assert!(n.get_string().is_err());
        assert!(n.get_ref().is_err());

        let s = Value::string("1").unwrap();
        match s.get_number() {
            Err(Error::TypeMismatch { expected, found }) => {
                assert_eq!(expected, "number");
                assert_eq!(found, ValueKind::String);
            }
            other => panic!("unexpected {:?}", other),
        }

        let l = Value::List(9);
        assert_eq!(l.get_ref().unwrap(), RefKey::list(9));
    }

    #[test]
    fn test_copy_owns_its_string() {
        let src = Value::string("original").unwrap();
        let mut dst = Value::number(3.0);
        dst.copy_from(&src).unwrap();
        assert_eq!(dst, src);

        dst.set_string("changed").unwrap();
        assert_eq!(src.get_string().unwrap(), "original");
        assert_eq!(dst.get_string().unwrap(), "changed");
    }

    #[test]
    fn test_copy_of_ref_keeps_id() {
        let src = Value::Object(12);
        let mut dst = Value::new();
        dst.copy_from(&src).unwrap();
        assert_eq!(dst.get_ref().unwrap(), RefKey::object(12));
    }

    #[test]
    fn test_move_leaves_source_null() {
        let mut src = Value::string("payload").unwrap();
        let mut dst = Value::string("old").unwrap();
        dst.move_from(&mut src);
        assert!(src.is_null());
        assert_eq!(dst.get_string().unwrap(), "payload");
    }

    #[test]
    fn test_bool_conversions() {
        let t: Value = true.into();
        assert_eq!(t, Value::number(1.0));
        assert!(bool::try_from(&Value::number(2.0)).unwrap());
        assert!(!bool::try_from(&Value::number(0.0)).unwrap());
        assert!(bool::try_from(&Value::null()).is_err());
    }
}
