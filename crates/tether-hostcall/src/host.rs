//! The main-context host
//!
//! `Host` owns the engine, the reference side table and the current tick.
//! Every operation that hands a reference back registers it as a temporary
//! for the current tick before returning, so callers can use the result
//! until the tick ends without doing anything themselves.

use tether_runtime::{
    Engine, Error, ReferenceTable, Result, StrId, Tick, Value, ValueList, Version, Xyz,
};

pub struct Host {
    engine: Box<dyn Engine>,
    refs: ReferenceTable,
    tick: Tick,
}

impl Host {
    pub fn new<E: Engine + 'static>(engine: E) -> Self {
        Self {
            engine: Box::new(engine),
            refs: ReferenceTable::new(),
            tick: Tick::ZERO,
        }
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn version(&self) -> Version {
        self.engine.version()
    }

    pub fn engine(&self) -> &dyn Engine {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> &mut dyn Engine {
        self.engine.as_mut()
    }

    pub fn refs(&self) -> &ReferenceTable {
        &self.refs
    }

    /// Lookup-only string resolution
    pub fn str_id(&self, s: &str) -> StrId {
        self.engine.str_id(s).into()
    }

    fn name_id(&self, name: &str) -> Result<StrId> {
        self.engine
            .str_id(name)
            .ok_or_else(|| Error::UnknownString(name.to_string()))
    }

    fn track(&mut self, value: Value) -> Value {
        self.refs
            .register_temporary(self.engine.as_mut(), &value, self.tick);
        value
    }

    fn track_list(&mut self, list: ValueList) -> ValueList {
        self.refs.register_list(self.engine.as_mut(), &list, self.tick);
        list
    }

    // Vars

    pub fn read_var(&mut self, src: &Value, name: &str) -> Result<Value> {
        let name = self.name_id(name)?;
        self.read_var_id(src, name)
    }

    pub fn read_var_id(&mut self, src: &Value, name: StrId) -> Result<Value> {
        let value = self.engine.read_var(src, name)?;
        Ok(self.track(value))
    }

    pub fn write_var(&mut self, src: &Value, name: &str, value: &Value) -> Result<()> {
        let name = self.name_id(name)?;
        self.write_var_id(src, name, value)
    }

    pub fn write_var_id(&mut self, src: &Value, name: StrId, value: &Value) -> Result<()> {
        self.engine.write_var(src, name, value)
    }

    // Procs

    pub fn call_proc(&mut self, src: Option<&Value>, name: &str, args: &[Value]) -> Result<Value> {
        let name = self.name_id(name)?;
        self.call_proc_id(src, name, args)
    }

    pub fn call_proc_id(&mut self, src: Option<&Value>, name: StrId, args: &[Value]) -> Result<Value> {
        let value = self.engine.call_proc(src, name, args)?;
        Ok(self.track(value))
    }

    // Lists

    pub fn create_list(&mut self) -> Result<Value> {
        let list = self.engine.create_list()?;
        Ok(self.track(list))
    }

    pub fn read_list(&mut self, list: &Value) -> Result<ValueList> {
        let items = self.engine.read_list(list)?;
        Ok(self.track_list(items))
    }

    pub fn write_list(&mut self, list: &Value, values: &[Value]) -> Result<()> {
        self.engine.write_list(list, values)
    }

    /// Elements of `list` paired with their associated values
    pub fn read_list_assoc(&mut self, list: &Value) -> Result<Vec<(Value, Value)>> {
        let pairs = self.engine.read_list_assoc(list)?;
        for (key, value) in &pairs {
            self.refs
                .register_temporary(self.engine.as_mut(), key, self.tick);
            self.refs
                .register_temporary(self.engine.as_mut(), value, self.tick);
        }
        Ok(pairs)
    }

    pub fn read_list_index(&mut self, list: &Value, index: &Value) -> Result<Value> {
        let value = self.engine.read_list_index(list, index)?;
        Ok(self.track(value))
    }

    pub fn write_list_index(&mut self, list: &Value, index: &Value, value: &Value) -> Result<()> {
        self.engine.write_list_index(list, index, value)
    }

    /// Append `value` to an engine list
    pub fn push_list(&mut self, list: &Value, value: &Value) -> Result<()> {
        let mut items = self.engine.read_list(list)?;
        items.add(value)?;
        self.engine.write_list(list, items.as_slice())
    }

    /// Remove and return the last element of an engine list, or null if it
    /// is empty
    pub fn pop_list(&mut self, list: &Value) -> Result<Value> {
        let mut items = self.engine.read_list(list)?.into_vec();
        let Some(last) = items.pop() else {
            return Ok(Value::Null);
        };
        // pin before the engine loses its own reference to it
        let last = self.track(last);
        self.engine.write_list(list, &items)?;
        Ok(last)
    }

    // Pointers

    pub fn read_pointer(&mut self, ptr: &Value) -> Result<Value> {
        let value = self.engine.read_pointer(ptr)?;
        Ok(self.track(value))
    }

    pub fn write_pointer(&mut self, ptr: &Value, value: &Value) -> Result<()> {
        self.engine.write_pointer(ptr, value)
    }

    // Builtins

    pub fn to_text(&mut self, value: &Value) -> Result<String> {
        self.engine.to_text(value)
    }

    pub fn length(&mut self, value: &Value) -> Result<Value> {
        self.engine.length(value)
    }

    pub fn new_object(&mut self, type_path: &Value, args: &[Value]) -> Result<Value> {
        let obj = self.engine.new_object(type_path, args)?;
        Ok(self.track(obj))
    }

    pub fn new_object_arglist(&mut self, type_path: &Value, arglist: &Value) -> Result<Value> {
        let obj = self.engine.new_object_arglist(type_path, arglist)?;
        Ok(self.track(obj))
    }

    pub fn refcount(&mut self, value: &Value) -> Result<u32> {
        self.engine.refcount(value)
    }

    pub fn xyz(&mut self, value: &Value) -> Result<Xyz> {
        self.engine.xyz(value)
    }

    pub fn block(&mut self, corner1: Xyz, corner2: Xyz) -> Result<ValueList> {
        let turfs = self.engine.block(corner1, corner2)?;
        Ok(self.track_list(turfs))
    }

    pub fn locate_in(&mut self, needle: &Value, haystack: Option<&Value>) -> Result<Value> {
        let found = self.engine.locate_in(needle, haystack)?;
        Ok(self.track(found))
    }

    pub fn locate_xyz(&mut self, xyz: Xyz) -> Result<Value> {
        let found = self.engine.locate_xyz(xyz)?;
        Ok(self.track(found))
    }

    // Reference lifecycle

    pub fn test_ref(&mut self, value: &mut Value) -> bool {
        self.refs.test_ref(self.engine.as_ref(), value)
    }

    pub fn inc_ref(&mut self, value: &Value) {
        self.refs.inc_ref(self.engine.as_mut(), value);
    }

    pub fn dec_ref(&mut self, value: &Value) {
        self.refs.dec_ref(self.engine.as_mut(), value);
    }

    /// Cross a tick boundary: release this tick's temporaries, let the engine
    /// run its own end-of-tick work, and start the next tick.
    ///
    /// Returns the number of temporaries released.
    pub fn end_tick(&mut self) -> usize {
        let released = self.refs.end_tick(self.engine.as_mut(), self.tick);
        self.engine.end_tick();
        log::debug!("tick {} ended, {} temporaries released", self.tick.epoch(), released);
        self.tick = self.tick.next();
        released
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        self.refs.clear(self.engine.as_mut());
    }
}
