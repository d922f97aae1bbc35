//! In-process engine heap
//!
//! `MemoryEngine` is a small, complete `Engine`: typed objects with declared
//! vars, 1-indexed lists, var pointers, global and per-type procs that may
//! suspend, a turf grid for the spatial builtins, and a mark-and-sweep
//! collector whose roots are the world object, the turf grid and whatever the
//! boundary has pinned. It backs the harness and the test suites, and is what
//! a host runs when no external engine is linked in.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::engine::{Engine, Version, Xyz};
use crate::error::{Error, Result};
use crate::list::ValueList;
use crate::string::{StrId, STR_NONE};
use crate::value::{RefId, RefKey, RefKind, Value};

/// Body of a proc. Receives the engine, `src` (absent for global procs) and
/// the arguments.
pub type ProcFn = Rc<dyn Fn(&mut MemoryEngine, Option<&Value>, &[Value]) -> Result<ProcOutcome>>;

/// Work left over by a proc that went to sleep
pub type Continuation = Box<dyn FnOnce(&mut MemoryEngine) -> Result<()>>;

pub enum ProcOutcome {
    /// The proc finished with a value
    Return(Value),
    /// The proc suspended; the rest runs when the current tick ends
    Sleep(Continuation),
}

impl ProcOutcome {
    pub fn sleep(rest: impl FnOnce(&mut MemoryEngine) -> Result<()> + 'static) -> Self {
        ProcOutcome::Sleep(Box::new(rest))
    }
}

const WORLD_TYPE: &str = "/world";
const TURF_TYPE: &str = "/turf";

#[derive(Debug, Default)]
struct StringTable {
    ids: HashMap<String, StrId>,
    names: Vec<String>,
}

impl StringTable {
    fn intern(&mut self, s: &str) -> StrId {
        if let Some(id) = self.ids.get(s) {
            return *id;
        }
        if self.names.len() as u32 == STR_NONE {
            // the sentinel is never handed out
            self.names.push(String::new());
        }
        let id = StrId::from_raw(self.names.len() as u32);
        self.names.push(s.to_string());
        self.ids.insert(s.to_string(), id);
        id
    }

    fn lookup(&self, s: &str) -> Option<StrId> {
        self.ids.get(s).copied()
    }

    fn name(&self, id: StrId) -> &str {
        if id.is_none() {
            return "";
        }
        self.names.get(id.raw() as usize).map(String::as_str).unwrap_or("")
    }
}

#[derive(Debug)]
struct Datum {
    type_path: String,
    vars: HashMap<StrId, Value>,
    coords: Option<Xyz>,
}

#[derive(Debug)]
enum Slot {
    Datum(Datum),
    Pointer { owner: RefId, var: StrId },
}

pub struct MemoryEngine {
    version: Version,
    strings: StringTable,
    types: HashMap<String, Vec<StrId>>,
    objects: HashMap<RefId, Slot>,
    lists: HashMap<RefId, Vec<Value>>,
    /// Associated values of keyed list elements, by list id
    assoc: HashMap<RefId, Vec<(Value, Value)>>,
    next_object: RefId,
    next_list: RefId,
    world: RefId,
    turfs: HashMap<Xyz, RefId>,
    pins: HashSet<RefKey>,
    procs: HashMap<StrId, ProcFn>,
    methods: HashMap<String, HashMap<StrId, ProcFn>>,
    sleeping: Vec<Continuation>,
    collect_on_tick: bool,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    pub fn new() -> Self {
        let mut engine = Self {
            version: Version::new(1, 0, 0),
            strings: StringTable::default(),
            types: HashMap::new(),
            objects: HashMap::new(),
            lists: HashMap::new(),
            assoc: HashMap::new(),
            next_object: 0,
            next_list: 0,
            world: 0,
            turfs: HashMap::new(),
            pins: HashSet::new(),
            procs: HashMap::new(),
            methods: HashMap::new(),
            sleeping: Vec::new(),
            collect_on_tick: true,
        };
        engine.define_type(WORLD_TYPE, &[]);
        engine.define_type(TURF_TYPE, &["name", "contents"]);
        engine.world = engine.alloc_datum(WORLD_TYPE, None);
        engine
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Whether `end_tick` runs a collection after waking sleepers
    pub fn with_collect_on_tick(mut self, enabled: bool) -> Self {
        self.collect_on_tick = enabled;
        self
    }

    /// Add `s` to the string table. Only the engine side interns.
    pub fn intern(&mut self, s: &str) -> StrId {
        self.strings.intern(s)
    }

    pub fn string(&self, id: StrId) -> Option<&str> {
        id.found().map(|id| self.strings.name(id))
    }

    /// Declare a type and its vars. Vars of ancestor types are inherited.
    pub fn define_type(&mut self, path: &str, vars: &[&str]) {
        let ids: Vec<StrId> = vars.iter().map(|v| self.strings.intern(v)).collect();
        let entry = self.types.entry(path.to_string()).or_default();
        for id in ids {
            if !entry.contains(&id) {
                entry.push(id);
            }
        }
    }

    /// Declare a var on the world object
    pub fn define_global(&mut self, name: &str, value: Value) -> Result<()> {
        self.check_live(&value)?;
        let id = self.strings.intern(name);
        if let Some(Slot::Datum(world)) = self.objects.get_mut(&self.world) {
            world.vars.insert(id, value);
        }
        Ok(())
    }

    pub fn define_proc<F>(&mut self, name: &str, body: F)
    where
        F: Fn(&mut MemoryEngine, Option<&Value>, &[Value]) -> Result<ProcOutcome> + 'static,
    {
        let id = self.strings.intern(name);
        self.procs.insert(id, Rc::new(body));
    }

    /// Define a proc on `type_path`; subtypes inherit it
    pub fn define_method<F>(&mut self, type_path: &str, name: &str, body: F)
    where
        F: Fn(&mut MemoryEngine, Option<&Value>, &[Value]) -> Result<ProcOutcome> + 'static,
    {
        let id = self.strings.intern(name);
        self.methods
            .entry(type_path.to_string())
            .or_default()
            .insert(id, Rc::new(body));
    }

    /// The world object, which holds the global vars
    pub fn globals(&self) -> Value {
        Value::Object(self.world)
    }

    /// Create a turf of `type_path` at `xyz`, replacing whatever was there
    pub fn place_turf(&mut self, xyz: Xyz, type_path: &str) -> Result<Value> {
        if !self.types.contains_key(type_path) {
            return Err(Error::engine(format!("undefined type {}", type_path)));
        }
        let id = self.alloc_datum(type_path, Some(xyz));
        self.turfs.insert(xyz, id);
        Ok(Value::Object(id))
    }

    /// A pointer to `var` on `owner`, for use with the pointer builtins
    pub fn make_pointer(&mut self, owner: &Value, var: &str) -> Result<Value> {
        let var = self
            .strings
            .lookup(var)
            .ok_or_else(|| Error::UnknownString(var.to_string()))?;
        let (owner_id, datum) = self.datum(owner)?;
        if !datum.vars.contains_key(&var) {
            return Err(self.undefined_var(datum, var));
        }
        let id = self.next_object_id();
        self.objects.insert(id, Slot::Pointer { owner: owner_id, var });
        Ok(Value::Object(id))
    }

    /// Destroy a referent immediately. Other references to it go stale.
    pub fn delete(&mut self, key: RefKey) {
        match key.kind {
            RefKind::Object => {
                if let Some(Slot::Datum(Datum { coords: Some(xyz), .. })) = self.objects.get(&key.id) {
                    let xyz = *xyz;
                    self.turfs.remove(&xyz);
                }
                self.objects.remove(&key.id);
            }
            RefKind::List => {
                self.lists.remove(&key.id);
                self.assoc.remove(&key.id);
            }
        }
        self.pins.remove(&key);
    }

    /// Mark from the roots and free everything unreachable.
    ///
    /// Returns the number of objects and lists freed.
    pub fn collect(&mut self) -> usize {
        let mut marked: HashSet<RefKey> = HashSet::new();
        let mut stack: Vec<RefKey> = Vec::with_capacity(self.pins.len() + self.turfs.len() + 1);
        stack.push(RefKey::object(self.world));
        stack.extend(self.turfs.values().map(|id| RefKey::object(*id)));
        stack.extend(self.pins.iter().copied());

        while let Some(key) = stack.pop() {
            if !self.is_live(key) || !marked.insert(key) {
                continue;
            }
            match key.kind {
                RefKind::Object => match self.objects.get(&key.id) {
                    Some(Slot::Datum(datum)) => {
                        stack.extend(datum.vars.values().filter_map(Value::ref_key));
                    }
                    Some(Slot::Pointer { owner, .. }) => stack.push(RefKey::object(*owner)),
                    None => {}
                },
                RefKind::List => {
                    if let Some(items) = self.lists.get(&key.id) {
                        stack.extend(items.iter().filter_map(Value::ref_key));
                    }
                    if let Some(pairs) = self.assoc.get(&key.id) {
                        stack.extend(pairs.iter().filter_map(|(_, v)| v.ref_key()));
                    }
                }
            }
        }

        let before = self.objects.len() + self.lists.len();
        self.objects.retain(|id, _| marked.contains(&RefKey::object(*id)));
        self.lists.retain(|id, _| marked.contains(&RefKey::list(*id)));
        self.assoc.retain(|id, _| marked.contains(&RefKey::list(*id)));
        let freed = before - self.objects.len() - self.lists.len();
        if freed > 0 {
            log::trace!("collected {} unreachable referents", freed);
        }
        freed
    }

    /// Number of references currently pinned by the boundary
    pub fn pin_count(&self) -> usize {
        self.pins.len()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn list_count(&self) -> usize {
        self.lists.len()
    }

    /// Procs that went to sleep and have not resumed yet
    pub fn sleeping(&self) -> usize {
        self.sleeping.len()
    }

    /// Resume every sleeping proc once
    pub fn wake_sleepers(&mut self) -> usize {
        let ready = std::mem::take(&mut self.sleeping);
        let woken = ready.len();
        for rest in ready {
            if let Err(e) = rest(self) {
                log::warn!("sleeping proc failed on resume: {}", e);
            }
        }
        woken
    }

    fn next_object_id(&mut self) -> RefId {
        let id = self.next_object;
        self.next_object += 1;
        id
    }

    fn alloc_datum(&mut self, type_path: &str, coords: Option<Xyz>) -> RefId {
        let vars = self
            .declared_vars(type_path)
            .into_iter()
            .map(|id| (id, Value::Null))
            .collect();
        let id = self.next_object_id();
        self.objects.insert(
            id,
            Slot::Datum(Datum {
                type_path: type_path.to_string(),
                vars,
                coords,
            }),
        );
        id
    }

    fn declared_vars(&self, type_path: &str) -> Vec<StrId> {
        let mut vars = Vec::new();
        for path in ancestry(type_path) {
            if let Some(own) = self.types.get(path) {
                vars.extend(own.iter().copied());
            }
        }
        vars
    }

    fn find_method(&self, type_path: &str, name: StrId) -> Option<ProcFn> {
        ancestry(type_path).find_map(|path| self.methods.get(path)?.get(&name).cloned())
    }

    fn datum(&self, value: &Value) -> Result<(RefId, &Datum)> {
        let Value::Object(id) = value else {
            return Err(Error::type_mismatch("object", value));
        };
        match self.objects.get(id) {
            Some(Slot::Datum(datum)) => Ok((*id, datum)),
            Some(Slot::Pointer { .. }) => Err(Error::engine("pointers have no vars")),
            None => Err(Error::InvalidReference(RefKey::object(*id))),
        }
    }

    fn datum_mut(&mut self, value: &Value) -> Result<&mut Datum> {
        let Value::Object(id) = value else {
            return Err(Error::type_mismatch("object", value));
        };
        match self.objects.get_mut(id) {
            Some(Slot::Datum(datum)) => Ok(datum),
            Some(Slot::Pointer { .. }) => Err(Error::engine("pointers have no vars")),
            None => Err(Error::InvalidReference(RefKey::object(*id))),
        }
    }

    fn list_items(&self, value: &Value) -> Result<&Vec<Value>> {
        let Value::List(id) = value else {
            return Err(Error::type_mismatch("list", value));
        };
        self.lists
            .get(id)
            .ok_or(Error::InvalidReference(RefKey::list(*id)))
    }

    fn list_items_mut(&mut self, value: &Value) -> Result<&mut Vec<Value>> {
        let Value::List(id) = value else {
            return Err(Error::type_mismatch("list", value));
        };
        self.lists
            .get_mut(id)
            .ok_or(Error::InvalidReference(RefKey::list(*id)))
    }

    fn pointer(&self, value: &Value) -> Result<(Value, StrId)> {
        let Value::Object(id) = value else {
            return Err(Error::type_mismatch("pointer", value));
        };
        match self.objects.get(id) {
            Some(Slot::Pointer { owner, var }) => Ok((Value::Object(*owner), *var)),
            Some(Slot::Datum(_)) => Err(Error::type_mismatch("pointer", value)),
            None => Err(Error::InvalidReference(RefKey::object(*id))),
        }
    }

    fn assoc_value(&self, list: &Value, key: &Value) -> Result<Value> {
        self.list_items(list)?;
        if key.is_null() {
            return Err(Error::type_mismatch("list key", key));
        }
        let found = match list {
            Value::List(id) => self
                .assoc
                .get(id)
                .and_then(|pairs| pairs.iter().find(|(k, _)| k == key)),
            _ => None,
        };
        Ok(found.map(|(_, v)| v.clone()).unwrap_or_default())
    }

    /// `list[key] = value`, appending `key` first if the list lacks it
    fn write_assoc(&mut self, list: &Value, key: &Value, value: &Value) -> Result<()> {
        if key.is_null() {
            return Err(Error::type_mismatch("list key", key));
        }
        self.check_live(key)?;
        self.check_live(value)?;
        let items = self.list_items_mut(list)?;
        if !items.contains(key) {
            items.push(key.clone());
        }
        let Value::List(id) = list else {
            return Err(Error::type_mismatch("list", list));
        };
        let pairs = self.assoc.entry(*id).or_default();
        match pairs.iter_mut().find(|(k, _)| k == key) {
            Some(pair) => pair.1 = value.clone(),
            None => pairs.push((key.clone(), value.clone())),
        }
        Ok(())
    }

    fn check_live(&self, value: &Value) -> Result<()> {
        match value.ref_key() {
            Some(key) if !self.is_live(key) => Err(Error::InvalidReference(key)),
            _ => Ok(()),
        }
    }

    fn undefined_var(&self, datum: &Datum, var: StrId) -> Error {
        Error::engine(format!(
            "undefined var {}.{}",
            datum.type_path,
            self.strings.name(var)
        ))
    }

    fn coords_of(&self, value: &Value) -> Result<Xyz> {
        let (_, datum) = self.datum(value)?;
        if let Some(xyz) = datum.coords {
            return Ok(xyz);
        }
        let loc = self
            .strings
            .lookup("loc")
            .and_then(|id| datum.vars.get(&id));
        match loc {
            Some(Value::Object(id)) => match self.objects.get(id) {
                Some(Slot::Datum(Datum { coords: Some(xyz), .. })) => Ok(*xyz),
                _ => Ok(Xyz::default()),
            },
            _ => Ok(Xyz::default()),
        }
    }
}

/// `path` followed by each of its parent types, most derived first
fn ancestry(path: &str) -> impl Iterator<Item = &str> {
    std::iter::successors(Some(path), |&p| match p.rfind('/') {
        Some(0) | None => None,
        Some(i) => Some(&p[..i]),
    })
}

fn is_subtype(path: &str, parent: &str) -> bool {
    ancestry(path).any(|p| p == parent)
}

fn list_index(index: &Value, len: usize) -> Result<usize> {
    let n = index.get_number()?;
    if n.fract() != 0.0 || n < 1.0 || n as usize > len {
        return Err(Error::engine(format!("list index {} out of bounds", n)));
    }
    Ok(n as usize - 1)
}

impl Engine for MemoryEngine {
    fn version(&self) -> Version {
        self.version
    }

    fn str_id(&self, s: &str) -> Option<StrId> {
        self.strings.lookup(s)
    }

    fn is_live(&self, key: RefKey) -> bool {
        match key.kind {
            RefKind::Object => self.objects.contains_key(&key.id),
            RefKind::List => self.lists.contains_key(&key.id),
        }
    }

    fn pin(&mut self, key: RefKey) {
        if self.is_live(key) {
            self.pins.insert(key);
        }
    }

    fn unpin(&mut self, key: RefKey) {
        self.pins.remove(&key);
    }

    fn read_var(&mut self, src: &Value, name: StrId) -> Result<Value> {
        let (_, datum) = self.datum(src)?;
        match datum.vars.get(&name) {
            Some(value) => Ok(value.clone()),
            None => Err(self.undefined_var(datum, name)),
        }
    }

    fn write_var(&mut self, src: &Value, name: StrId, value: &Value) -> Result<()> {
        self.check_live(value)?;
        let var_name = self.strings.name(name).to_string();
        let datum = self.datum_mut(src)?;
        match datum.vars.get_mut(&name) {
            Some(slot) => {
                *slot = value.clone();
                Ok(())
            }
            None => Err(Error::engine(format!(
                "undefined var {}.{}",
                datum.type_path, var_name
            ))),
        }
    }

    fn create_list(&mut self) -> Result<Value> {
        let id = self.next_list;
        self.next_list += 1;
        self.lists.insert(id, Vec::new());
        Ok(Value::List(id))
    }

    fn read_list(&mut self, list: &Value) -> Result<ValueList> {
        Ok(self.list_items(list)?.iter().cloned().collect())
    }

    fn write_list(&mut self, list: &Value, values: &[Value]) -> Result<()> {
        for value in values {
            self.check_live(value)?;
        }
        *self.list_items_mut(list)? = values.to_vec();
        if let Value::List(id) = list {
            self.assoc.remove(id);
        }
        Ok(())
    }

    fn read_list_assoc(&mut self, list: &Value) -> Result<Vec<(Value, Value)>> {
        let items = self.list_items(list)?;
        let pairs = match list {
            Value::List(id) => self.assoc.get(id),
            _ => None,
        };
        Ok(items
            .iter()
            .map(|key| {
                let value = pairs
                    .and_then(|pairs| pairs.iter().find(|(k, _)| k == key))
                    .map(|(_, v)| v.clone())
                    .unwrap_or_default();
                (key.clone(), value)
            })
            .collect())
    }

    fn read_list_index(&mut self, list: &Value, index: &Value) -> Result<Value> {
        if !index.is_number() {
            return self.assoc_value(list, index);
        }
        let items = self.list_items(list)?;
        let idx = list_index(index, items.len())?;
        Ok(items[idx].clone())
    }

    fn write_list_index(&mut self, list: &Value, index: &Value, value: &Value) -> Result<()> {
        if !index.is_number() {
            return self.write_assoc(list, index, value);
        }
        self.check_live(value)?;
        let items = self.list_items_mut(list)?;
        let idx = list_index(index, items.len())?;
        items[idx] = value.clone();
        Ok(())
    }

    fn read_pointer(&mut self, ptr: &Value) -> Result<Value> {
        let (owner, var) = self.pointer(ptr)?;
        self.read_var(&owner, var)
    }

    fn write_pointer(&mut self, ptr: &Value, value: &Value) -> Result<()> {
        let (owner, var) = self.pointer(ptr)?;
        self.write_var(&owner, var, value)
    }

    fn call_proc(&mut self, src: Option<&Value>, name: StrId, args: &[Value]) -> Result<Value> {
        let body = match src {
            Some(src) => {
                let (_, datum) = self.datum(src)?;
                self.find_method(&datum.type_path, name)
            }
            None => self.procs.get(&name).cloned(),
        };
        let Some(body) = body else {
            return Err(Error::engine(format!(
                "undefined proc {}",
                self.strings.name(name)
            )));
        };
        match body(self, src, args)? {
            ProcOutcome::Return(value) => Ok(value),
            ProcOutcome::Sleep(rest) => {
                self.sleeping.push(rest);
                Ok(Value::Null)
            }
        }
    }

    fn to_text(&mut self, value: &Value) -> Result<String> {
        Ok(match value {
            Value::Null => String::new(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            Value::Object(id) => match self.objects.get(id) {
                Some(Slot::Datum(datum)) => datum.type_path.clone(),
                Some(Slot::Pointer { .. }) => "/pointer".to_string(),
                None => return Err(Error::InvalidReference(RefKey::object(*id))),
            },
            Value::List(_) => {
                self.list_items(value)?;
                "/list".to_string()
            }
        })
    }

    fn length(&mut self, value: &Value) -> Result<Value> {
        match value {
            Value::String(s) => Ok(Value::number(s.len() as f32)),
            Value::List(_) => Ok(Value::number(self.list_items(value)?.len() as f32)),
            _ => Err(Error::type_mismatch("string or list", value)),
        }
    }

    fn new_object(&mut self, type_path: &Value, args: &[Value]) -> Result<Value> {
        let path = type_path.get_string()?;
        if !self.types.contains_key(path) {
            return Err(Error::engine(format!("undefined type {}", path)));
        }
        for arg in args {
            self.check_live(arg)?;
        }
        let obj = Value::Object(self.alloc_datum(path, None));
        let ctor = self
            .strings
            .lookup("New")
            .and_then(|name| self.find_method(path, name));
        if let Some(ctor) = ctor {
            if let ProcOutcome::Sleep(rest) = ctor(self, Some(&obj), args)? {
                self.sleeping.push(rest);
            }
        }
        Ok(obj)
    }

    fn refcount(&mut self, value: &Value) -> Result<u32> {
        let key = value.get_ref()?;
        if !self.is_live(key) {
            return Err(Error::InvalidReference(key));
        }
        let held = |v: &Value| v.ref_key() == Some(key);
        let mut count = self.pins.contains(&key) as u32;
        for slot in self.objects.values() {
            count += match slot {
                Slot::Datum(datum) => datum.vars.values().filter(|v| held(v)).count() as u32,
                Slot::Pointer { owner, .. } => (RefKey::object(*owner) == key) as u32,
            };
        }
        for items in self.lists.values() {
            count += items.iter().filter(|v| held(v)).count() as u32;
        }
        for pairs in self.assoc.values() {
            count += pairs.iter().filter(|(_, v)| held(v)).count() as u32;
        }
        Ok(count)
    }

    fn xyz(&mut self, value: &Value) -> Result<Xyz> {
        self.coords_of(value)
    }

    fn block(&mut self, corner1: Xyz, corner2: Xyz) -> Result<ValueList> {
        let mut turfs = ValueList::new();
        for z in corner1.z.min(corner2.z)..=corner1.z.max(corner2.z) {
            for y in corner1.y.min(corner2.y)..=corner1.y.max(corner2.y) {
                for x in corner1.x.min(corner2.x)..=corner1.x.max(corner2.x) {
                    if let Some(id) = self.turfs.get(&Xyz::new(x, y, z)) {
                        turfs.push(Value::Object(*id))?;
                    }
                }
            }
        }
        Ok(turfs)
    }

    fn locate_in(&mut self, needle: &Value, haystack: Option<&Value>) -> Result<Value> {
        let candidates: Vec<Value> = match haystack {
            None => {
                let mut ids: Vec<RefId> = self.objects.keys().copied().collect();
                ids.sort_unstable();
                ids.into_iter().map(Value::Object).collect()
            }
            Some(list @ Value::List(_)) => self.list_items(list)?.clone(),
            Some(container) => {
                let (_, datum) = self.datum(container)?;
                let contents = self
                    .strings
                    .lookup("contents")
                    .and_then(|id| datum.vars.get(&id));
                match contents {
                    Some(list @ Value::List(_)) => self.list_items(list)?.clone(),
                    _ => Vec::new(),
                }
            }
        };

        match needle {
            Value::String(path) => Ok(candidates
                .into_iter()
                .find(|c| matches!(self.datum(c), Ok((_, d)) if is_subtype(&d.type_path, path)))
                .unwrap_or(Value::Null)),
            Value::Object(_) => {
                self.check_live(needle)?;
                Ok(if candidates.contains(needle) {
                    needle.clone()
                } else {
                    Value::Null
                })
            }
            _ => Err(Error::type_mismatch("type path or object", needle)),
        }
    }

    fn locate_xyz(&mut self, xyz: Xyz) -> Result<Value> {
        Ok(self
            .turfs
            .get(&xyz)
            .map(|id| Value::Object(*id))
            .unwrap_or(Value::Null))
    }

    fn end_tick(&mut self) {
        self.wake_sleepers();
        if self.collect_on_tick {
            self.collect();
        }
    }
}
