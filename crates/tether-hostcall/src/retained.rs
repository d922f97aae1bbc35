//! RAII permanent holds

use std::ops::Deref;

use tether_runtime::{Error, Result, Value};

use crate::dispatch::Dispatcher;

/// A value with a permanent hold on its referent for as long as it lives.
///
/// Dropping it releases the hold through the dispatcher, so a drop off the
/// main context is a deferred write like any other.
#[derive(Debug)]
pub struct Retained {
    value: Value,
    dispatcher: Dispatcher,
}

impl Retained {
    /// Take a permanent hold on `value`.
    ///
    /// Off the main context the `inc_ref` is deferred. If `value` is only
    /// held by a temporary and its tick ends before the deferred write runs,
    /// the referent can be collected first and the hold is silently skipped.
    /// `new_sync` closes that gap.
    pub fn new(dispatcher: &Dispatcher, value: Value) -> Result<Self> {
        dispatcher.inc_ref(&value)?;
        Ok(Self {
            value,
            dispatcher: dispatcher.clone(),
        })
    }

    /// Like `new`, but checks liveness and takes the hold in one blocking
    /// main-context visit. Fails with `InvalidReference` if the referent is
    /// already gone.
    pub fn new_sync(dispatcher: &Dispatcher, value: Value) -> Result<Self> {
        if let Some(key) = value.ref_key() {
            let target = value.clone();
            dispatcher.sync(move |host| {
                let mut check = target.clone();
                if !host.test_ref(&mut check) {
                    return Err(Error::InvalidReference(key));
                }
                host.inc_ref(&target);
                Ok(())
            })?;
        }
        Ok(Self {
            value,
            dispatcher: dispatcher.clone(),
        })
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl Deref for Retained {
    type Target = Value;

    fn deref(&self) -> &Value {
        &self.value
    }
}

impl Clone for Retained {
    fn clone(&self) -> Self {
        if let Err(e) = self.dispatcher.inc_ref(&self.value) {
            log::debug!("failed to retain {}: {}", self.value, e);
        }
        Self {
            value: self.value.clone(),
            dispatcher: self.dispatcher.clone(),
        }
    }
}

impl Drop for Retained {
    fn drop(&mut self) {
        if let Err(e) = self.dispatcher.dec_ref(&self.value) {
            log::debug!("failed to release {}: {}", self.value, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostConfig;
    use crate::dispatch::{attach, HostThread};
    use tether_runtime::{MemoryEngine, Ownership};

    fn engine() -> MemoryEngine {
        let mut engine = MemoryEngine::new();
        engine.define_type("/obj", &["name"]);
        engine
    }

    fn path() -> Value {
        Value::string("/obj").unwrap()
    }

    #[test]
    fn test_hold_follows_scope() {
        let (dispatcher, mut pump) = attach(engine(), &HostConfig::default()).unwrap();
        let obj = dispatcher.new_object(&path(), &[]).unwrap();
        let key = obj.ref_key().unwrap();

        let retained = Retained::new(&dispatcher, obj.clone()).unwrap();
        let copy = retained.clone();
        let held = pump.with_host(move |host| host.refs().ownership(key)).unwrap();
        assert!(matches!(held, Some(Ownership::Permanent { count }) if count.get() == 2));

        drop(retained);
        pump.end_tick();
        let mut check = obj.clone();
        assert!(dispatcher.test_ref(&mut check));
        assert_eq!(*copy, obj);

        drop(copy);
        pump.end_tick();
        assert!(!dispatcher.test_ref(&mut check));
    }

    #[test]
    fn test_drop_off_main_is_deferred() {
        let host = HostThread::spawn(&HostConfig::default(), engine).unwrap();
        let dispatcher = host.dispatcher().clone();
        let obj = dispatcher.new_object(&path(), &[]).unwrap();
        let retained = Retained::new(&dispatcher, obj.clone()).unwrap();
        dispatcher.end_tick().unwrap();

        std::thread::spawn(move || drop(retained)).join().unwrap();
        dispatcher.end_tick().unwrap();

        let mut check = obj;
        assert!(!dispatcher.test_ref(&mut check));
    }

    #[test]
    fn test_new_sync_refuses_collected_referent() {
        let (dispatcher, mut pump) = attach(engine(), &HostConfig::default()).unwrap();
        let obj = dispatcher.new_object(&path(), &[]).unwrap();
        let key = obj.ref_key().unwrap();
        pump.end_tick();

        let err = Retained::new_sync(&dispatcher, obj).unwrap_err();
        assert_eq!(err, Error::InvalidReference(key));
        let held = pump.with_host(move |host| host.refs().ownership(key)).unwrap();
        assert_eq!(held, None);

        let number = Retained::new_sync(&dispatcher, Value::number(3.0)).unwrap();
        assert_eq!(*number, Value::number(3.0));
    }

    #[test]
    fn test_new_sync_holds_before_returning() {
        let host = HostThread::spawn(&HostConfig::default(), engine).unwrap();
        let dispatcher = host.dispatcher().clone();
        let obj = dispatcher.new_object(&path(), &[]).unwrap();
        let key = obj.ref_key().unwrap();

        let worker = dispatcher.clone();
        let target = obj.clone();
        let retained = std::thread::spawn(move || Retained::new_sync(&worker, target).unwrap())
            .join()
            .unwrap();

        // no deferred write to wait for
        let held = dispatcher
            .sync(move |host| Ok(host.refs().ownership(key)))
            .unwrap();
        assert!(matches!(held, Some(Ownership::Permanent { count }) if count.get() == 1));

        dispatcher.end_tick().unwrap();
        let mut check = obj.clone();
        assert!(dispatcher.test_ref(&mut check));

        drop(retained);
        dispatcher.end_tick().unwrap();
        assert!(!dispatcher.test_ref(&mut check));
    }
}
