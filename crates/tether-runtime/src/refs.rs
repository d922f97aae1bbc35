//! Reference lifecycle
//!
//! The engine's collector only knows about references held inside its own
//! heap. Every object or list reference handed out across the boundary is
//! rooted here through `Engine::pin`, in one of two modes:
//!
//! - temporary: registered automatically by whatever read produced it and
//!   released when the tick it was produced in ends
//! - permanent: counted `inc_ref`/`dec_ref` holds that outlive ticks
//!
//! A reference never has more than one pin, however it is held.

use std::collections::HashMap;
use std::num::NonZeroU32;

use crate::engine::Engine;
use crate::list::ValueList;
use crate::value::{RefKey, Value};

/// Engine tick counter.
///
/// Temporaries are stamped with the tick they were produced in and survive
/// until `ReferenceTable::end_tick` is called for that tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tick(u64);

impl Tick {
    pub const ZERO: Tick = Tick(0);

    #[inline]
    pub const fn next(self) -> Tick {
        Tick(self.0 + 1)
    }

    #[inline]
    pub const fn epoch(self) -> u64 {
        self.0
    }
}

/// How the boundary is holding a reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Released at the end of `until`
    Temporary { until: Tick },
    /// Held until the count drops to zero
    Permanent { count: NonZeroU32 },
}

/// Side table of every reference the boundary currently roots
#[derive(Debug, Default)]
pub struct ReferenceTable {
    entries: HashMap<RefKey, Ownership>,
}

impl ReferenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ownership(&self, key: RefKey) -> Option<Ownership> {
        self.entries.get(&key).copied()
    }

    /// Number of distinct references rooted by the boundary
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of temporaries still waiting for their tick to end
    pub fn temporaries(&self) -> usize {
        self.entries
            .values()
            .filter(|o| matches!(o, Ownership::Temporary { .. }))
            .count()
    }

    /// Root a reference produced during `tick` until that tick ends.
    ///
    /// Non-reference values are ignored, and so is anything already held:
    /// a permanent hold outlives the temporary anyway and a second temporary
    /// in the same tick would expire at the same time.
    pub fn register_temporary<E: Engine + ?Sized>(
        &mut self,
        engine: &mut E,
        value: &Value,
        tick: Tick,
    ) {
        let Some(key) = value.ref_key() else {
            return;
        };
        if self.entries.contains_key(&key) {
            return;
        }
        engine.pin(key);
        self.entries.insert(key, Ownership::Temporary { until: tick });
    }

    /// `register_temporary` for every element of `list`
    pub fn register_list<E: Engine + ?Sized>(&mut self, engine: &mut E, list: &ValueList, tick: Tick) {
        for value in list {
            self.register_temporary(engine, value, tick);
        }
    }

    /// Check whether `value` still names a live referent.
    ///
    /// A dead reference has its bookkeeping dropped and `value` is reset to
    /// null. Non-reference values are always valid.
    pub fn test_ref<E: Engine + ?Sized>(&mut self, engine: &E, value: &mut Value) -> bool {
        let Some(key) = value.ref_key() else {
            return true;
        };
        if engine.is_live(key) {
            return true;
        }
        if self.entries.remove(&key).is_some() {
            log::trace!("dropped stale hold on {}", key);
        }
        value.free();
        false
    }

    /// Take a permanent hold on `value`. Dead references are ignored.
    ///
    /// A temporary for the same reference becomes the first permanent hold.
    pub fn inc_ref<E: Engine + ?Sized>(&mut self, engine: &mut E, value: &Value) {
        let Some(key) = value.ref_key() else {
            return;
        };
        if !engine.is_live(key) {
            log::debug!("inc_ref on dead reference {}", key);
            return;
        }
        match self.entries.get_mut(&key) {
            Some(Ownership::Permanent { count }) => {
                *count = count.saturating_add(1);
            }
            Some(slot @ Ownership::Temporary { .. }) => {
                *slot = Ownership::Permanent {
                    count: NonZeroU32::MIN,
                };
            }
            None => {
                engine.pin(key);
                self.entries.insert(
                    key,
                    Ownership::Permanent {
                        count: NonZeroU32::MIN,
                    },
                );
            }
        }
    }

    /// Release one hold on `value`; the pin goes away with the last one.
    ///
    /// A temporary counts as a single hold. Releasing a reference that is not
    /// held does nothing.
    pub fn dec_ref<E: Engine + ?Sized>(&mut self, engine: &mut E, value: &Value) {
        let Some(key) = value.ref_key() else {
            return;
        };
        let release = match self.entries.get_mut(&key) {
            None => return,
            Some(Ownership::Permanent { count }) => match NonZeroU32::new(count.get() - 1) {
                Some(lower) => {
                    *count = lower;
                    false
                }
                None => true,
            },
            Some(Ownership::Temporary { .. }) => true,
        };
        if release {
            self.entries.remove(&key);
            engine.unpin(key);
        }
    }

    /// Release every temporary stamped with `tick` or earlier.
    ///
    /// Returns how many were released.
    pub fn end_tick<E: Engine + ?Sized>(&mut self, engine: &mut E, tick: Tick) -> usize {
        let mut expired = Vec::new();
        self.entries.retain(|key, ownership| match ownership {
            Ownership::Temporary { until } if *until <= tick => {
                expired.push(*key);
                false
            }
            _ => true,
        });
        for key in &expired {
            engine.unpin(*key);
        }
        if !expired.is_empty() {
            log::trace!("tick {}: released {} temporaries", tick.epoch(), expired.len());
        }
        expired.len()
    }

    /// Drop every hold, permanent or not
    pub fn clear<E: Engine + ?Sized>(&mut self, engine: &mut E) {
        for (key, _) in self.entries.drain() {
            engine.unpin(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::MemoryEngine;

    fn fresh_object(engine: &mut MemoryEngine) -> Value {
        engine.define_type("/obj/item", &["name"]);
        let path = Value::string("/obj/item").unwrap();
        engine.new_object(&path, &[]).unwrap()
    }

    #[test]
    fn test_temporary_lives_until_tick_end() {
        let mut engine = MemoryEngine::new();
        let mut table = ReferenceTable::new();
        let tick = Tick::ZERO;

        let mut obj = fresh_object(&mut engine);
        table.register_temporary(&mut engine, &obj, tick);
        engine.collect();
        assert!(table.test_ref(&engine, &mut obj));

        assert_eq!(table.end_tick(&mut engine, tick), 1);
        engine.collect();
        assert!(!table.test_ref(&engine, &mut obj));
        assert!(obj.is_null());
        assert!(table.is_empty());
    }

    #[test]
    fn test_permanent_survives_ticks() {
        let mut engine = MemoryEngine::new();
        let mut table = ReferenceTable::new();
        let mut tick = Tick::ZERO;

        let mut obj = fresh_object(&mut engine);
        table.inc_ref(&mut engine, &obj);
        for _ in 0..3 {
            table.end_tick(&mut engine, tick);
            engine.collect();
            tick = tick.next();
        }
        assert!(table.test_ref(&engine, &mut obj));

        table.dec_ref(&mut engine, &obj);
        table.end_tick(&mut engine, tick);
        engine.collect();
        assert!(!table.test_ref(&engine, &mut obj));
        assert!(obj.is_null());
    }

    #[test]
    fn test_counted_holds() {
        let mut engine = MemoryEngine::new();
        let mut table = ReferenceTable::new();
        let mut obj = fresh_object(&mut engine);
        let key = obj.ref_key().unwrap();

        table.inc_ref(&mut engine, &obj);
        table.inc_ref(&mut engine, &obj);
        assert_eq!(
            table.ownership(key),
            Some(Ownership::Permanent {
                count: NonZeroU32::new(2).unwrap()
            })
        );
        assert_eq!(engine.pin_count(), 1);

        table.dec_ref(&mut engine, &obj);
        engine.collect();
        assert!(table.test_ref(&engine, &mut obj));

        table.dec_ref(&mut engine, &obj);
        assert_eq!(engine.pin_count(), 0);
        assert_eq!(table.ownership(key), None);
    }

    #[test]
    fn test_inc_absorbs_temporary() {
        let mut engine = MemoryEngine::new();
        let mut table = ReferenceTable::new();
        let obj = fresh_object(&mut engine);
        let key = obj.ref_key().unwrap();

        table.register_temporary(&mut engine, &obj, Tick::ZERO);
        table.inc_ref(&mut engine, &obj);
        assert_eq!(table.end_tick(&mut engine, Tick::ZERO), 0);
        assert_eq!(engine.pin_count(), 1);
        assert!(matches!(table.ownership(key), Some(Ownership::Permanent { .. })));
    }

    #[test]
    fn test_repeated_reads_do_not_stack() {
        let mut engine = MemoryEngine::new();
        let mut table = ReferenceTable::new();
        let obj = fresh_object(&mut engine);

        table.register_temporary(&mut engine, &obj, Tick::ZERO);
        table.register_temporary(&mut engine, &obj, Tick::ZERO);
        assert_eq!(table.temporaries(), 1);
        assert_eq!(engine.pin_count(), 1);
    }

    #[test]
    fn test_dec_without_hold_is_noop() {
        let mut engine = MemoryEngine::new();
        let mut table = ReferenceTable::new();
        let obj = fresh_object(&mut engine);

        table.dec_ref(&mut engine, &obj);
        table.dec_ref(&mut engine, &Value::number(3.0));
        assert!(table.is_empty());
        assert_eq!(engine.pin_count(), 0);
    }

    #[test]
    fn test_non_refs_always_valid() {
        let engine = MemoryEngine::new();
        let mut table = ReferenceTable::new();
        let mut v = Value::string("text").unwrap();
        assert!(table.test_ref(&engine, &mut v));
        assert!(v.is_string());
    }

    #[test]
    fn test_inc_on_dead_reference_is_ignored() {
        let mut engine = MemoryEngine::new();
        let mut table = ReferenceTable::new();
        let obj = fresh_object(&mut engine);
        engine.collect();

        table.inc_ref(&mut engine, &obj);
        assert!(table.is_empty());
    }
}
