//! Growable value list
//!
//! `ValueList` owns every value it holds. It is used to pass argument lists
//! to the engine and as the bulk transport for reading and writing whole
//! engine lists. Growth goes through fallible reservation so an allocation
//! failure is reported instead of aborting, and prefers a 25% capacity
//! increase over an exact fit.

use std::ops::Index;

use crate::error::{Error, Result};
use crate::value::Value;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueList {
    items: Vec<Value>,
}

/// Capacity after one growth step: `ceil(capacity * 1.25)`
#[inline]
fn grown_capacity(capacity: usize) -> usize {
    capacity + capacity.div_ceil(4)
}

impl ValueList {
    /// Create an empty list with no storage
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Create a list of `count` null values.
    pub fn with_count(count: usize) -> Result<Self> {
        let mut items = Vec::new();
        items
            .try_reserve_exact(count)
            .map_err(|_| Error::AllocationFailed)?;
        items.resize_with(count, Value::new);
        Ok(Self { items })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    /// Release every value and the storage itself
    pub fn free(&mut self) {
        self.items = Vec::new();
    }

    /// Replace the contents with a deep copy of `src`. All or nothing.
    pub fn copy_from(&mut self, src: &ValueList) -> Result<()> {
        let copied = copy_values(&src.items)?;
        self.items = copied;
        Ok(())
    }

    /// Take `src`'s storage, leaving it empty
    pub fn move_from(&mut self, src: &mut ValueList) {
        self.items = std::mem::take(&mut src.items);
    }

    /// Resize the allocation to hold at least `capacity` values.
    ///
    /// Refuses to shrink below the current count.
    pub fn set_capacity(&mut self, capacity: usize) -> Result<()> {
        let count = self.items.len();
        if capacity < count {
            return Err(Error::CapacityBelowCount { capacity, count });
        }
        if capacity > self.items.capacity() {
            self.items
                .try_reserve_exact(capacity - count)
                .map_err(|_| Error::AllocationFailed)?;
        } else {
            self.items.shrink_to(capacity);
        }
        Ok(())
    }

    /// Set the logical length. New slots are null; removed values are released.
    pub fn set_count(&mut self, count: usize) -> Result<()> {
        self.reserve_for(count)?;
        if count < self.items.len() {
            self.items.truncate(count);
        } else {
            self.items.resize_with(count, Value::new);
        }
        Ok(())
    }

    /// Append a copy of `value`
    pub fn add(&mut self, value: &Value) -> Result<()> {
        self.insert_at(-1, value)
    }

    /// Append `value`, taking ownership
    pub fn push(&mut self, value: Value) -> Result<()> {
        self.reserve_for(self.items.len() + 1)?;
        self.items.push(value);
        Ok(())
    }

    /// Insert a copy of `value` before `idx`. A negative `idx` (or one past
    /// the end) appends.
    pub fn insert_at(&mut self, idx: isize, value: &Value) -> Result<()> {
        let mut copy = Value::new();
        copy.copy_from(value)?;
        let pos = self.clamp_index(idx);
        self.reserve_for(self.items.len() + 1)?;
        self.items.insert(pos, copy);
        Ok(())
    }

    /// Remove `delete_count` values at `idx` and insert copies of `insert` in
    /// their place. A negative `idx` means the end of the list; out of range
    /// positions and counts are clamped to the list bounds.
    pub fn splice(&mut self, idx: isize, delete_count: usize, insert: &[Value]) -> Result<()> {
        let copies = copy_values(insert)?;
        let start = self.clamp_index(idx);
        let end = start + delete_count.min(self.items.len() - start);
        let new_len = self.items.len() - (end - start) + copies.len();
        self.reserve_for(new_len)?;
        self.items.splice(start..end, copies);
        Ok(())
    }

    /// Remove up to `n` values starting at `idx`, returning how many were removed
    pub fn remove_at(&mut self, idx: usize, n: usize) -> usize {
        let len = self.items.len();
        if idx >= len {
            return 0;
        }
        let end = idx.saturating_add(n).min(len);
        self.items.drain(idx..end);
        end - idx
    }

    /// Overwrite the value at `idx`, releasing the old one. Returns false if
    /// `idx` is out of range.
    pub fn set(&mut self, idx: usize, value: Value) -> bool {
        match self.items.get_mut(idx) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    #[inline]
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.items.get(idx)
    }

    #[inline]
    pub fn as_slice(&self) -> &[Value] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.items.iter()
    }

    pub fn into_vec(self) -> Vec<Value> {
        self.items
    }

    fn clamp_index(&self, idx: isize) -> usize {
        if idx < 0 {
            self.items.len()
        } else {
            (idx as usize).min(self.items.len())
        }
    }

    /// Make room for `needed` values, growing by at least 25%
    fn reserve_for(&mut self, needed: usize) -> Result<()> {
        let capacity = self.items.capacity();
        if needed <= capacity {
            return Ok(());
        }
        let target = needed.max(grown_capacity(capacity));
        self.items
            .try_reserve_exact(target - self.items.len())
            .map_err(|_| Error::AllocationFailed)
    }
}

fn copy_values(src: &[Value]) -> Result<Vec<Value>> {
    let mut out = Vec::new();
    out.try_reserve_exact(src.len())
        .map_err(|_| Error::AllocationFailed)?;
    for value in src {
        let mut copy = Value::new();
        copy.copy_from(value)?;
        out.push(copy);
    }
    Ok(out)
}

impl Index<usize> for ValueList {
    type Output = Value;

    fn index(&self, idx: usize) -> &Value {
        &self.items[idx]
    }
}

impl From<Vec<Value>> for ValueList {
    fn from(items: Vec<Value>) -> Self {
        Self { items }
    }
}

impl FromIterator<Value> for ValueList {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for ValueList {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a ValueList {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(text: &str) -> Value {
        Value::string(text).unwrap()
    }

    #[test]
    fn test_new_is_empty() {
        let list = ValueList::new();
        assert_eq!(list.len(), 0);
        assert_eq!(list.capacity(), 0);
    }

    #[test]
    fn test_with_count_is_null_filled() {
        let list = ValueList::with_count(4).unwrap();
        assert_eq!(list.len(), 4);
        assert!(list.iter().all(Value::is_null));
    }

    #[test]
    fn test_set_count_growth_policy() {
        let mut list = ValueList::new();
        list.set_capacity(8).unwrap();
        list.set_count(2).unwrap();
        list.set(0, Value::number(1.0));
        let old_capacity = list.capacity();

        list.set_count(old_capacity + 1).unwrap();
        let expected = (old_capacity + 1).max(old_capacity + old_capacity.div_ceil(4));
        assert!(list.capacity() >= expected);
        assert_eq!(list[0], Value::number(1.0));
        assert!(list.iter().skip(2).all(Value::is_null));
    }

    #[test]
    fn test_set_count_shrink_releases() {
        let mut list: ValueList = vec![s("a"), s("b"), s("c")].into();
        list.set_count(1).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0], s("a"));
    }

    #[test]
    fn test_set_capacity_refuses_below_count() {
        let mut list = ValueList::with_count(5).unwrap();
        assert_eq!(
            list.set_capacity(2),
            Err(Error::CapacityBelowCount { capacity: 2, count: 5 })
        );
        assert_eq!(list.len(), 5);
        list.set_capacity(20).unwrap();
        assert!(list.capacity() >= 20);
    }

    #[test]
    fn test_with_count_reports_allocation_failure() {
        assert_eq!(ValueList::with_count(usize::MAX), Err(Error::AllocationFailed));
    }

    #[test]
    fn test_failed_growth_leaves_list_intact() {
        let mut list: ValueList = vec![s("a"), Value::number(2.0)].into();
        let capacity = list.capacity();

        assert_eq!(list.set_count(usize::MAX), Err(Error::AllocationFailed));
        assert_eq!(list.len(), 2);
        assert_eq!(list.capacity(), capacity);

        assert_eq!(list.set_capacity(usize::MAX), Err(Error::AllocationFailed));
        assert_eq!(list.len(), 2);
        assert_eq!(list.capacity(), capacity);
        assert_eq!(list.as_slice(), &[s("a"), Value::number(2.0)]);

        // still usable afterwards
        list.push(s("c")).unwrap();
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_splice_replaces_in_place() {
        let mut list: ValueList = vec![s("X"), s("Y"), s("Z"), s("W")].into();
        list.splice(2, 1, &[s("A"), s("B")]).unwrap();
        assert_eq!(list.as_slice(), &[s("X"), s("Y"), s("A"), s("B"), s("W")]);
    }

    #[test]
    fn test_splice_clamps() {
        let mut list: ValueList = vec![s("X"), s("Y")].into();
        list.splice(10, 5, &[s("Z")]).unwrap();
        assert_eq!(list.as_slice(), &[s("X"), s("Y"), s("Z")]);

        list.splice(-1, 3, &[s("W")]).unwrap();
        assert_eq!(list.len(), 4);

        list.splice(1, 100, &[]).unwrap();
        assert_eq!(list.as_slice(), &[s("X")]);
    }

    #[test]
    fn test_insert_at() {
        let mut list = ValueList::new();
        list.add(&s("b")).unwrap();
        list.insert_at(0, &s("a")).unwrap();
        list.insert_at(-1, &s("c")).unwrap();
        assert_eq!(list.as_slice(), &[s("a"), s("b"), s("c")]);
    }

    #[test]
    fn test_remove_at_reports_actual_count() {
        let mut list: ValueList = vec![s("a"), s("b"), s("c")].into();
        assert_eq!(list.remove_at(0, 10), 3);
        assert!(list.is_empty());
        assert_eq!(list.remove_at(0, 1), 0);

        let mut list: ValueList = vec![s("a"), s("b"), s("c")].into();
        assert_eq!(list.remove_at(1, 1), 1);
        assert_eq!(list.as_slice(), &[s("a"), s("c")]);
    }

    #[test]
    fn test_copy_and_move() {
        let mut src: ValueList = vec![s("a"), Value::Object(4)].into();
        let mut copy = ValueList::new();
        copy.copy_from(&src).unwrap();
        assert_eq!(copy, src);

        let mut dst = ValueList::with_count(3).unwrap();
        dst.move_from(&mut src);
        assert!(src.is_empty());
        assert_eq!(dst, copy);
    }

    #[test]
    fn test_repeated_adds_amortize() {
        let mut list = ValueList::new();
        let mut reallocations = 0;
        let mut last_capacity = list.capacity();
        for i in 0..1000 {
            list.push(Value::number(i as f32)).unwrap();
            if list.capacity() != last_capacity {
                reallocations += 1;
                last_capacity = list.capacity();
            }
        }
        assert_eq!(list.len(), 1000);
        assert!(reallocations < 100, "{} reallocations", reallocations);
    }
}
