//! Thread-affinity layer for the tether engine boundary
//!
//! The engine heap belongs to one main context. This crate installs a
//! `Host` on that context and hands out cloneable `Dispatcher`s that any
//! thread can call through:
//! - on the main context, calls run synchronously
//! - off it, reads block until the main context has serviced them
//! - off it, writes and proc calls are queued and return immediately
//!
//! The main context is either a dedicated owner thread (`HostThread`) or the
//! embedder's own thread (`attach` plus a `Pump` it services).

mod config;
mod dispatch;
mod host;
mod interop;
mod resolver;
mod retained;
mod status;
pub mod ffi;

pub use config::{ConfigError, HostConfig, HostSection, LogSection, StringsSection};
pub use dispatch::{attach, Dispatcher, HostThread, Pump};
pub use host::Host;
pub use resolver::Resolver;
pub use retained::Retained;
pub use status::{clear_last_error, last_error};

pub use tether_runtime as runtime;

use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicU64, Ordering};

use tether_runtime::{Error, Result};

/// Identifies one installed host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct HostId(u64);

static NEXT_HOST_ID: AtomicU64 = AtomicU64::new(1);

impl HostId {
    fn next() -> Self {
        HostId(NEXT_HOST_ID.fetch_add(1, Ordering::Relaxed))
    }
}

thread_local! {
    /// The host owned by this thread, if this thread is a main context.
    /// `Host` is not Send, so it never leaves the thread it was installed on.
    static HOST: RefCell<Option<Host>> = const { RefCell::new(None) };

    /// Id of the host in `HOST`, readable while the host is borrowed
    static HOST_ID: Cell<Option<HostId>> = const { Cell::new(None) };
}

/// Make the current thread the main context for `host`
pub(crate) fn install_host(host: Host) -> Result<HostId> {
    if HOST_ID.with(Cell::get).is_some() {
        return Err(Error::engine("this thread already hosts an engine"));
    }
    let id = HostId::next();
    HOST.with(|cell| *cell.borrow_mut() = Some(host));
    HOST_ID.with(|cell| cell.set(Some(id)));
    Ok(id)
}

/// Remove the host installed on this thread, if it is `id`
pub(crate) fn uninstall_host(id: HostId) -> Option<Host> {
    if HOST_ID.with(Cell::get) != Some(id) {
        return None;
    }
    HOST_ID.with(|cell| cell.set(None));
    HOST.with(|cell| cell.borrow_mut().take())
}

/// Whether the current thread is the main context of host `id`
pub(crate) fn is_host_thread(id: HostId) -> bool {
    HOST_ID.with(Cell::get) == Some(id)
}

/// Whether the host on this thread is in the middle of servicing a call
pub(crate) fn host_busy() -> bool {
    HOST.with(|cell| cell.try_borrow_mut().is_err())
}

/// Run `f` against the host installed on this thread
pub(crate) fn with_host<R>(id: HostId, f: impl FnOnce(&mut Host) -> Result<R>) -> Result<R> {
    if !is_host_thread(id) {
        return Err(Error::HostUnavailable);
    }
    HOST.with(|cell| {
        let mut slot = cell.try_borrow_mut().map_err(|_| Error::Reentrant)?;
        let host = slot.as_mut().ok_or(Error::HostUnavailable)?;
        f(host)
    })
}
