//! Engine operations callable from any thread
//!
//! Each operation is classified and routed through the dispatcher:
//! - read: var reads, list reads, pointer reads, string resolution, builtins,
//!   object construction and `test_ref` block off the main context
//! - write: var, list and pointer writes, `inc_ref` and `dec_ref` are
//!   deferred off the main context and report success immediately
//! - proc calls run on the main context and return null off it
//!
//! Every call records its outcome in the calling thread's last-error slot.

use tether_runtime::{Error, Result, StrId, Value, ValueList, Version, Xyz};

use crate::dispatch::Dispatcher;
use crate::status::record;

impl Dispatcher {
    pub fn version(&self) -> Result<Version> {
        record(self.read(|host| Ok(host.version())))
    }

    /// Look up `s` in the engine's string table without interning it.
    ///
    /// Returns `StrId::NONE` for strings the engine has never seen.
    pub fn resolve(&self, s: &str) -> StrId {
        if let Some(id) = self.resolver().cached(s) {
            return id;
        }
        let owned = s.to_string();
        match record(self.read(move |host| Ok(host.str_id(&owned)))) {
            Ok(id) => {
                self.resolver().remember(s, id);
                id
            }
            Err(_) => StrId::NONE,
        }
    }

    // Vars

    pub fn read_var(&self, src: &Value, name: &str) -> Result<Value> {
        let (src, name) = (src.clone(), name.to_string());
        record(self.read(move |host| host.read_var(&src, &name)))
    }

    pub fn read_var_id(&self, src: &Value, name: StrId) -> Result<Value> {
        let src = src.clone();
        record(self.read(move |host| host.read_var_id(&src, name)))
    }

    pub fn write_var(&self, src: &Value, name: &str, value: &Value) -> Result<()> {
        let (src, name, value) = (src.clone(), name.to_string(), value.clone());
        record(self.write(move |host| host.write_var(&src, &name, &value)))
    }

    pub fn write_var_id(&self, src: &Value, name: StrId, value: &Value) -> Result<()> {
        let (src, value) = (src.clone(), value.clone());
        record(self.write(move |host| host.write_var_id(&src, name, &value)))
    }

    pub fn read_number(&self, src: &Value, name: &str) -> Result<f32> {
        record(self.read_var(src, name).and_then(|v| v.get_number()))
    }

    pub fn read_string(&self, src: &Value, name: &str) -> Result<String> {
        record(self.read_var(src, name).and_then(String::try_from))
    }

    pub fn read_number_id(&self, src: &Value, name: StrId) -> Result<f32> {
        record(self.read_var_id(src, name).and_then(|v| v.get_number()))
    }

    pub fn read_string_id(&self, src: &Value, name: StrId) -> Result<String> {
        record(self.read_var_id(src, name).and_then(String::try_from))
    }

    /// `read_list_var` by resolved name
    pub fn read_list_id(&self, src: &Value, name: StrId) -> Result<ValueList> {
        let src = src.clone();
        record(self.read(move |host| {
            let list = host.read_var_id(&src, name)?;
            if !list.is_list() {
                return Err(Error::type_mismatch("list", &list));
            }
            host.read_list(&list)
        }))
    }

    /// Read a list-typed var and fetch its contents in one main-context visit
    pub fn read_list_var(&self, src: &Value, name: &str) -> Result<ValueList> {
        let (src, name) = (src.clone(), name.to_string());
        record(self.read(move |host| {
            let list = host.read_var(&src, &name)?;
            if !list.is_list() {
                return Err(Error::type_mismatch("list", &list));
            }
            host.read_list(&list)
        }))
    }

    // Procs

    pub fn call_proc(&self, src: &Value, name: &str, args: &[Value]) -> Result<Value> {
        let (src, name, args) = (src.clone(), name.to_string(), args.to_vec());
        record(self.call(move |host| host.call_proc(Some(&src), &name, &args)))
    }

    pub fn call_proc_id(&self, src: &Value, name: StrId, args: &[Value]) -> Result<Value> {
        let (src, args) = (src.clone(), args.to_vec());
        record(self.call(move |host| host.call_proc_id(Some(&src), name, &args)))
    }

    pub fn call_global(&self, name: &str, args: &[Value]) -> Result<Value> {
        let (name, args) = (name.to_string(), args.to_vec());
        record(self.call(move |host| host.call_proc(None, &name, &args)))
    }

    pub fn call_global_id(&self, name: StrId, args: &[Value]) -> Result<Value> {
        let args = args.to_vec();
        record(self.call(move |host| host.call_proc_id(None, name, &args)))
    }

    // Lists

    pub fn create_list(&self) -> Result<Value> {
        record(self.read(|host| host.create_list()))
    }

    pub fn read_list(&self, list: &Value) -> Result<ValueList> {
        let list = list.clone();
        record(self.read(move |host| host.read_list(&list)))
    }

    pub fn write_list(&self, list: &Value, values: &ValueList) -> Result<()> {
        let (list, values) = (list.clone(), values.clone());
        record(self.write(move |host| host.write_list(&list, values.as_slice())))
    }

    /// Every element of `list` with its associated value, null where it has
    /// none
    pub fn read_list_assoc(&self, list: &Value) -> Result<Vec<(Value, Value)>> {
        let list = list.clone();
        record(self.read(move |host| host.read_list_assoc(&list)))
    }

    pub fn read_list_index(&self, list: &Value, index: &Value) -> Result<Value> {
        let (list, index) = (list.clone(), index.clone());
        record(self.read(move |host| host.read_list_index(&list, &index)))
    }

    pub fn write_list_index(&self, list: &Value, index: &Value, value: &Value) -> Result<()> {
        let (list, index, value) = (list.clone(), index.clone(), value.clone());
        record(self.write(move |host| host.write_list_index(&list, &index, &value)))
    }

    /// Number of elements in an engine list
    pub fn list_len(&self, list: &Value) -> Result<usize> {
        record(self.length(list).and_then(|n| n.get_number()).map(|n| n as usize))
    }

    pub fn push_list(&self, list: &Value, value: &Value) -> Result<()> {
        let (list, value) = (list.clone(), value.clone());
        record(self.write(move |host| host.push_list(&list, &value)))
    }

    pub fn pop_list(&self, list: &Value) -> Result<Value> {
        let list = list.clone();
        record(self.read(move |host| host.pop_list(&list)))
    }

    // Pointers

    pub fn read_pointer(&self, ptr: &Value) -> Result<Value> {
        let ptr = ptr.clone();
        record(self.read(move |host| host.read_pointer(&ptr)))
    }

    pub fn write_pointer(&self, ptr: &Value, value: &Value) -> Result<()> {
        let (ptr, value) = (ptr.clone(), value.clone());
        record(self.write(move |host| host.write_pointer(&ptr, &value)))
    }

    // Builtins

    /// The engine's text conversion of `value`
    pub fn to_text(&self, value: &Value) -> Result<String> {
        let value = value.clone();
        record(self.read(move |host| host.to_text(&value)))
    }

    pub fn length(&self, value: &Value) -> Result<Value> {
        let value = value.clone();
        record(self.read(move |host| host.length(&value)))
    }

    pub fn new_object(&self, type_path: &Value, args: &[Value]) -> Result<Value> {
        let (type_path, args) = (type_path.clone(), args.to_vec());
        record(self.read(move |host| host.new_object(&type_path, &args)))
    }

    pub fn new_object_arglist(&self, type_path: &Value, arglist: &Value) -> Result<Value> {
        let (type_path, arglist) = (type_path.clone(), arglist.clone());
        record(self.read(move |host| host.new_object_arglist(&type_path, &arglist)))
    }

    pub fn refcount(&self, value: &Value) -> Result<u32> {
        let value = value.clone();
        record(self.read(move |host| host.refcount(&value)))
    }

    pub fn xyz(&self, value: &Value) -> Result<Xyz> {
        let value = value.clone();
        record(self.read(move |host| host.xyz(&value)))
    }

    pub fn block(&self, corner1: Xyz, corner2: Xyz) -> Result<ValueList> {
        record(self.read(move |host| host.block(corner1, corner2)))
    }

    pub fn locate_in(&self, needle: &Value, haystack: Option<&Value>) -> Result<Value> {
        let (needle, haystack) = (needle.clone(), haystack.cloned());
        record(self.read(move |host| host.locate_in(&needle, haystack.as_ref())))
    }

    pub fn locate_xyz(&self, xyz: Xyz) -> Result<Value> {
        record(self.read(move |host| host.locate_xyz(xyz)))
    }

    // Reference lifecycle

    /// Whether `value` still names a live referent.
    ///
    /// Only a reference the engine reports dead is reset to null. When the
    /// host cannot be reached the answer is `false` and `value` is left as it
    /// was, with the failure in the last-error slot.
    pub fn test_ref(&self, value: &mut Value) -> bool {
        if !value.is_ref() {
            return true;
        }
        let copy = value.clone();
        let checked = record(self.read(move |host| {
            let mut copy = copy;
            Ok(host.test_ref(&mut copy))
        }));
        match checked {
            Ok(true) => true,
            Ok(false) => {
                value.free();
                false
            }
            Err(_) => false,
        }
    }

    pub fn inc_ref(&self, value: &Value) -> Result<()> {
        if !value.is_ref() {
            return Ok(());
        }
        let value = value.clone();
        record(self.write(move |host| {
            host.inc_ref(&value);
            Ok(())
        }))
    }

    pub fn dec_ref(&self, value: &Value) -> Result<()> {
        if !value.is_ref() {
            return Ok(());
        }
        let value = value.clone();
        record(self.write(move |host| {
            host.dec_ref(&value);
            Ok(())
        }))
    }

    /// Cross a tick boundary on the main context
    pub fn end_tick(&self) -> Result<()> {
        record(self.write(|host| {
            host.end_tick();
            Ok(())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostConfig;
    use crate::dispatch::{attach, HostThread};
    use crate::status::last_error;
    use tether_runtime::{Engine, ErrorKind, MemoryEngine, Ownership, ProcOutcome};

    fn s(text: &str) -> Value {
        Value::string(text).unwrap()
    }

    /// The world object is the first thing a MemoryEngine allocates
    const WORLD: Value = Value::Object(0);

    fn engine() -> MemoryEngine {
        let mut engine = MemoryEngine::new();
        engine.define_type("/obj", &["name", "loc", "contents"]);
        engine.define_type("/obj/item", &["weight"]);
        engine.define_global("score", Value::number(10.0)).unwrap();
        engine.define_global("title", s("tether")).unwrap();
        engine.define_global("inventory", Value::Null).unwrap();
        engine.define_proc("double", |_, _, args| {
            Ok(ProcOutcome::Return(Value::number(args[0].get_number()? * 2.0)))
        });
        engine.define_proc("spawn_item", |engine, _, _| {
            let item = engine.new_object(&Value::string("/obj/item")?, &[])?;
            Ok(ProcOutcome::Return(item))
        });
        engine.define_proc("learn", |engine, _, args| {
            engine.intern(args[0].get_string()?);
            Ok(ProcOutcome::Return(Value::Null))
        });
        engine.define_proc("build_row", |engine, _, _| {
            for x in 1..=3 {
                engine.place_turf(Xyz::new(x, 1, 1), "/turf")?;
            }
            Ok(ProcOutcome::Return(Value::Null))
        });
        engine.define_proc("pointer_to", |engine, _, args| {
            let ptr = engine.make_pointer(&args[0], args[1].get_string()?)?;
            Ok(ProcOutcome::Return(ptr))
        });
        engine.define_method("/obj", "rename", |engine, src, args| {
            let name = engine.intern("name");
            let src = src.ok_or_else(|| Error::engine("no src"))?;
            engine.write_var(src, name, &args[0])?;
            Ok(ProcOutcome::Return(Value::Null))
        });
        engine
    }

    /// Run `f` on a worker thread and hand back its result
    fn off_main<R: Send + 'static>(f: impl FnOnce() -> R + Send + 'static) -> R {
        std::thread::spawn(f).join().unwrap()
    }

    #[test]
    fn test_reads_match_across_threads() {
        let host = HostThread::spawn(&HostConfig::default(), engine).unwrap();
        let dispatcher = host.dispatcher().clone();

        let on_main = dispatcher
            .sync(|host| host.read_var(&WORLD, "title"))
            .unwrap();
        let worker = dispatcher.clone();
        let off = off_main(move || worker.read_var(&WORLD, "title").unwrap());
        assert_eq!(off, on_main);

        let worker = dispatcher.clone();
        let score = off_main(move || worker.read_number(&WORLD, "score").unwrap());
        assert_eq!(score, 10.0);

        let worker = dispatcher.clone();
        let err = off_main(move || worker.read_var(&WORLD, "nonexistent").unwrap_err());
        assert_eq!(err, Error::UnknownString("nonexistent".to_string()));
    }

    #[test]
    fn test_off_main_write_reports_success() {
        let (dispatcher, mut pump) = attach(engine(), &HostConfig::default()).unwrap();

        let worker = dispatcher.clone();
        let (undeclared, declared, last) = off_main(move || {
            let undeclared = worker.write_var(&WORLD, "no_such_var", &Value::number(1.0));
            let declared = worker.write_var(&WORLD, "score", &Value::number(99.0));
            (undeclared, declared, last_error())
        });
        assert_eq!(undeclared, Ok(()));
        assert_eq!(declared, Ok(()));
        assert_eq!(last, None);

        // nothing applied until the main context gets to it
        assert_eq!(dispatcher.read_number(&WORLD, "score").unwrap(), 10.0);
        assert_eq!(pump.run_pending(), 2);
        assert_eq!(dispatcher.read_number(&WORLD, "score").unwrap(), 99.0);

        // on the main context the same write fails synchronously
        let err = dispatcher
            .write_var(&WORLD, "no_such_var", &Value::number(1.0))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Engine);
        assert_eq!(last_error(), Some(err));
    }

    #[test]
    fn test_off_main_proc_returns_null_then_runs() {
        let (dispatcher, mut pump) = attach(engine(), &HostConfig::default()).unwrap();
        let item = dispatcher.new_object(&s("/obj/item"), &[]).unwrap();
        dispatcher.inc_ref(&item).unwrap();

        let worker = dispatcher.clone();
        let target = item.clone();
        let result = off_main(move || worker.call_proc(&target, "rename", &[s("lamp")]).unwrap());
        assert!(result.is_null());

        assert_eq!(pump.run_pending(), 1);
        assert_eq!(dispatcher.read_string(&item, "name").unwrap(), "lamp");

        let on_main = dispatcher
            .call_global("double", &[Value::number(1.5)])
            .unwrap();
        assert_eq!(on_main, Value::number(3.0));
    }

    #[test]
    fn test_resolve_is_lookup_only() {
        let (dispatcher, mut pump) = attach(engine(), &HostConfig::default()).unwrap();
        assert_eq!(dispatcher.resolve("fresh_name"), StrId::NONE);
        assert_eq!(dispatcher.resolve("fresh_name"), StrId::NONE);
        assert!(dispatcher.resolver().cached("fresh_name").is_none());
        let interned = pump
            .with_host(|host| host.engine().str_id("fresh_name"))
            .unwrap();
        assert_eq!(interned, None);

        // something else makes the engine intern it
        dispatcher.call_global("learn", &[s("fresh_name")]).unwrap();
        let id = dispatcher.resolve("fresh_name");
        assert!(!id.is_none());
        assert_eq!(dispatcher.resolve("fresh_name"), id);
        assert_eq!(dispatcher.resolver().cached("fresh_name"), Some(id));

        let score = dispatcher.resolve("score");
        assert_eq!(
            dispatcher.read_var_id(&WORLD, score).unwrap(),
            Value::number(10.0)
        );
    }

    #[test]
    fn test_temporaries_expire_and_permanents_survive() {
        let host = HostThread::spawn(&HostConfig::default(), engine).unwrap();
        let dispatcher = host.dispatcher().clone();

        let mut temp = dispatcher
            .sync(|host| host.call_proc(None, "spawn_item", &[]))
            .unwrap();
        let mut kept = dispatcher.new_object(&s("/obj"), &[]).unwrap();
        dispatcher.inc_ref(&kept).unwrap();
        assert!(dispatcher.test_ref(&mut temp));

        // deferred, but ordered ahead of the reads that follow
        dispatcher.end_tick().unwrap();
        assert!(!dispatcher.test_ref(&mut temp));
        assert!(temp.is_null());
        assert!(dispatcher.test_ref(&mut kept));

        dispatcher.dec_ref(&kept).unwrap();
        dispatcher.end_tick().unwrap();
        assert!(!dispatcher.test_ref(&mut kept));
    }

    #[test]
    fn test_lists_and_builtins() {
        let (dispatcher, _pump) = attach(engine(), &HostConfig::default()).unwrap();
        let list = dispatcher.create_list().unwrap();
        let values: ValueList = vec![s("a"), Value::number(2.0)].into();
        dispatcher.write_list(&list, &values).unwrap();
        dispatcher.push_list(&list, &s("c")).unwrap();

        assert_eq!(dispatcher.list_len(&list).unwrap(), 3);
        assert_eq!(
            dispatcher.read_list_index(&list, &Value::number(2.0)).unwrap(),
            Value::number(2.0)
        );
        dispatcher
            .write_list_index(&list, &Value::number(1.0), &s("z"))
            .unwrap();
        assert_eq!(dispatcher.pop_list(&list).unwrap(), s("c"));
        assert_eq!(
            dispatcher.read_list(&list).unwrap().as_slice(),
            &[s("z"), Value::number(2.0)]
        );

        dispatcher.write_var(&WORLD, "inventory", &list).unwrap();
        assert_eq!(dispatcher.read_list_var(&WORLD, "inventory").unwrap().len(), 2);
        assert_eq!(
            dispatcher.read_list_var(&WORLD, "score").unwrap_err().kind(),
            ErrorKind::TypeMismatch
        );

        assert_eq!(dispatcher.to_text(&Value::number(7.0)).unwrap(), "7");
        assert_eq!(dispatcher.to_text(&WORLD).unwrap(), "/world");
        assert_eq!(dispatcher.length(&s("four")).unwrap(), Value::number(4.0));
        assert!(dispatcher.version().is_ok());
    }

    #[test]
    fn test_keyed_lists_across_threads() {
        let host = HostThread::spawn(&HostConfig::default(), engine).unwrap();
        let dispatcher = host.dispatcher().clone();
        let (list, item) = dispatcher
            .sync(|host| {
                let list = host.create_list()?;
                host.inc_ref(&list);
                let item = host.new_object(&Value::string("/obj/item")?, &[])?;
                host.write_list_index(&list, &Value::string("hp")?, &Value::number(5.0))?;
                host.write_list_index(&list, &item, &Value::string("spare")?)?;
                host.end_tick();
                Ok((list, item))
            })
            .unwrap();

        let worker = dispatcher.clone();
        let target = list.clone();
        let pairs = off_main(move || worker.read_list_assoc(&target).unwrap());
        assert_eq!(
            pairs,
            vec![(s("hp"), Value::number(5.0)), (item.clone(), s("spare"))]
        );
        // the key came back as a temporary of the current tick
        let held = dispatcher
            .sync(move |host| Ok(host.refs().ownership(item.ref_key().unwrap())))
            .unwrap();
        assert!(matches!(held, Some(Ownership::Temporary { .. })));

        assert_eq!(
            dispatcher.read_list_index(&list, &s("hp")).unwrap(),
            Value::number(5.0)
        );
        assert!(dispatcher.read_list_assoc(&WORLD).is_err());
    }

    #[test]
    fn test_typed_reads_by_id() {
        let host = HostThread::spawn(&HostConfig::default(), engine).unwrap();
        let dispatcher = host.dispatcher().clone();
        let (score, title, inventory) = (
            dispatcher.resolve("score"),
            dispatcher.resolve("title"),
            dispatcher.resolve("inventory"),
        );

        let worker = dispatcher.clone();
        let (number, text, not_a_list) = off_main(move || {
            (
                worker.read_number_id(&WORLD, score).unwrap(),
                worker.read_string_id(&WORLD, title).unwrap(),
                worker.read_list_id(&WORLD, inventory).unwrap_err(),
            )
        });
        assert_eq!(number, 10.0);
        assert_eq!(text, "tether");
        assert_eq!(not_a_list.kind(), ErrorKind::TypeMismatch);

        let list = dispatcher.create_list().unwrap();
        dispatcher.push_list(&list, &s("rope")).unwrap();
        dispatcher.write_var(&WORLD, "inventory", &list).unwrap();
        assert_eq!(
            dispatcher.read_list_id(&WORLD, inventory).unwrap().as_slice(),
            &[s("rope")]
        );
        assert_eq!(
            dispatcher.read_string_id(&WORLD, score).unwrap_err().kind(),
            ErrorKind::TypeMismatch
        );
        assert!(dispatcher.read_number_id(&WORLD, StrId::NONE).is_err());
    }

    #[test]
    fn test_spatial_queries() {
        let (dispatcher, _pump) = attach(engine(), &HostConfig::default()).unwrap();
        let corner = Xyz::new(1, 1, 1);
        assert!(dispatcher.locate_xyz(corner).unwrap().is_null());

        dispatcher.call_global("build_row", &[]).unwrap();
        assert_eq!(dispatcher.block(corner, Xyz::new(3, 3, 1)).unwrap().len(), 3);
        let turf = dispatcher.locate_xyz(Xyz::new(2, 1, 1)).unwrap();
        assert_eq!(dispatcher.xyz(&turf).unwrap(), Xyz::new(2, 1, 1));

        let item = dispatcher.new_object(&s("/obj/item"), &[]).unwrap();
        assert!(dispatcher.xyz(&item).unwrap().is_off_map());
        dispatcher.write_var(&item, "loc", &turf).unwrap();
        assert_eq!(dispatcher.xyz(&item).unwrap(), Xyz::new(2, 1, 1));

        assert_eq!(dispatcher.locate_in(&s("/obj/item"), None).unwrap(), item);
        assert!(dispatcher.locate_in(&s("/obj/item"), Some(&turf)).unwrap().is_null());
        // held once by its temporary pin
        assert_eq!(dispatcher.refcount(&item).unwrap(), 1);
    }

    #[test]
    fn test_pointers_and_arglists() {
        let (dispatcher, _pump) = attach(engine(), &HostConfig::default()).unwrap();
        let obj = dispatcher.new_object(&s("/obj"), &[]).unwrap();
        let ptr = dispatcher
            .call_global("pointer_to", &[obj.clone(), s("name")])
            .unwrap();

        dispatcher.write_pointer(&ptr, &s("crate")).unwrap();
        assert_eq!(dispatcher.read_pointer(&ptr).unwrap(), s("crate"));
        assert_eq!(dispatcher.read_string(&obj, "name").unwrap(), "crate");
        assert!(dispatcher.read_pointer(&obj).is_err());

        let args = dispatcher.create_list().unwrap();
        let created = dispatcher.new_object_arglist(&s("/obj"), &args).unwrap();
        assert!(created.is_object());
    }

    #[test]
    fn test_non_refs_skip_routing() {
        let host = HostThread::spawn(&HostConfig::default(), engine).unwrap();
        let dispatcher = host.dispatcher().clone();
        host.shutdown();

        let mut n = Value::number(1.0);
        assert!(dispatcher.test_ref(&mut n));
        assert_eq!(dispatcher.inc_ref(&n), Ok(()));

        // an unreachable host says nothing about the referent
        let mut obj = Value::Object(1);
        assert!(!dispatcher.test_ref(&mut obj));
        assert_eq!(obj, Value::Object(1));
        assert_eq!(last_error(), Some(Error::HostUnavailable));
    }
}
