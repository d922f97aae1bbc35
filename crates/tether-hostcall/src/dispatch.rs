//! Call routing between worker threads and the main context
//!
//! Work for the main context travels as boxed closures over an unbounded
//! channel. Reads carry a oneshot reply the caller waits on; writes and
//! off-main proc calls carry nothing and the caller moves on. The inbox is a
//! single FIFO, so deferred writes apply in the order they were issued.
//!
//! Off-main reads block the calling thread with `blocking_recv`, so they must
//! not be issued from inside an async runtime.

use std::marker::PhantomData;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, Interval, MissedTickBehavior};

use tether_runtime::{Engine, Error, Result, Value};

use crate::config::HostConfig;
use crate::host::Host;
use crate::resolver::Resolver;
use crate::status::record;
use crate::{host_busy, install_host, is_host_thread, uninstall_host, with_host, HostId};

pub(crate) type Job = Box<dyn FnOnce(&mut Host) + Send>;

/// Cloneable handle for calling into a host from any thread
#[derive(Clone)]
pub struct Dispatcher {
    id: HostId,
    inbox: mpsc::UnboundedSender<Job>,
    resolver: Arc<Resolver>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("id", &self.id)
            .field("closed", &self.inbox.is_closed())
            .finish()
    }
}

impl Dispatcher {
    fn new(id: HostId, inbox: mpsc::UnboundedSender<Job>, config: &HostConfig) -> Self {
        Self {
            id,
            inbox,
            resolver: Arc::new(Resolver::new(config.strings.cache)),
        }
    }

    /// Whether the calling thread is this host's main context
    pub fn is_main(&self) -> bool {
        is_host_thread(self.id)
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Whether the host is still accepting work
    pub fn is_running(&self) -> bool {
        !self.inbox.is_closed()
    }

    /// Run `f` on the main context and wait for its result
    pub fn sync<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Host) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        record(self.read(f))
    }

    /// Run `f` on the main context without waiting. Off-main, failures of
    /// `f` are logged and otherwise dropped.
    pub fn post<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Host) -> Result<()> + Send + 'static,
    {
        record(self.write(f))
    }

    pub(crate) fn read<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Host) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        if self.is_main() {
            log::trace!("read on main context");
            return with_host(self.id, f);
        }
        log::trace!("read routed to main context");
        let (reply, response) = oneshot::channel();
        self.send(Box::new(move |host: &mut Host| {
            // the caller may have gone away; nothing to do then
            let _ = reply.send(f(host));
        }))?;
        response.blocking_recv().map_err(|_| Error::HostUnavailable)?
    }

    pub(crate) fn write<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Host) -> Result<()> + Send + 'static,
    {
        if self.is_main() && !host_busy() {
            return with_host(self.id, f);
        }
        log::trace!("write deferred to main context");
        self.defer(f)
    }

    /// Proc calls: synchronous on the main context, fire-and-forget off it
    pub(crate) fn call<F>(&self, f: F) -> Result<Value>
    where
        F: FnOnce(&mut Host) -> Result<Value> + Send + 'static,
    {
        if self.is_main() {
            return with_host(self.id, f);
        }
        log::trace!("proc call deferred to main context");
        self.defer(move |host| f(host).map(drop))?;
        Ok(Value::Null)
    }

    fn defer<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Host) -> Result<()> + Send + 'static,
    {
        self.send(Box::new(move |host: &mut Host| {
            if let Err(e) = f(host) {
                log::debug!("deferred call failed: {}", e);
            }
        }))
    }

    fn send(&self, job: Job) -> Result<()> {
        self.inbox.send(job).map_err(|_| Error::HostUnavailable)
    }
}

/// Run one queued job against the host on this thread
fn run_job(id: HostId, job: Job) {
    let ran = with_host(id, |host| {
        job(host);
        Ok(())
    });
    if let Err(e) = ran {
        log::error!("dropped queued job: {}", e);
    }
}

/// A dedicated owner thread acting as the main context
pub struct HostThread {
    dispatcher: Dispatcher,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl HostThread {
    /// Start an owner thread. `factory` builds the engine on that thread.
    pub fn spawn<E, F>(config: &HostConfig, factory: F) -> Result<Self>
    where
        E: Engine + 'static,
        F: FnOnce() -> E + Send + 'static,
    {
        let (inbox, jobs) = mpsc::unbounded_channel();
        let (shutdown, stop) = oneshot::channel();
        let (ready, started) = std::sync::mpsc::channel();
        let tick_interval = config.tick_interval();

        let thread = std::thread::Builder::new()
            .name(config.host.thread_name.clone())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        log::error!("failed to build host runtime: {}", e);
                        return;
                    }
                };
                let id = match install_host(Host::new(factory())) {
                    Ok(id) => id,
                    Err(e) => {
                        log::error!("failed to install host: {}", e);
                        return;
                    }
                };
                if ready.send(id).is_err() {
                    uninstall_host(id);
                    return;
                }
                log::info!("engine host started");
                runtime.block_on(serve(id, jobs, stop, tick_interval));
                drop(uninstall_host(id));
                log::info!("engine host stopped");
            })
            .map_err(|e| {
                log::error!("failed to spawn host thread: {}", e);
                Error::HostUnavailable
            })?;

        let id = started.recv().map_err(|_| Error::HostUnavailable)?;
        Ok(Self {
            dispatcher: Dispatcher::new(id, inbox, config),
            shutdown: Some(shutdown),
            thread: Some(thread),
        })
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Stop the owner thread and wait for it. Queued work that has not run
    /// yet is dropped; waiting readers get `HostUnavailable`.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("engine host thread panicked");
            }
        }
    }
}

impl Drop for HostThread {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn serve(
    id: HostId,
    mut jobs: mpsc::UnboundedReceiver<Job>,
    mut stop: oneshot::Receiver<()>,
    tick_interval: Option<Duration>,
) {
    let mut ticker = tick_interval.map(|period| {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    // ticks before jobs: a non-empty inbox must not delay a due tick
    loop {
        tokio::select! {
            biased;
            _ = &mut stop => break,
            _ = next_tick(&mut ticker) => {
                let _ = with_host(id, |host| Ok(host.end_tick()));
            }
            job = jobs.recv() => match job {
                Some(job) => run_job(id, job),
                None => break,
            },
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Make the current thread the main context for `engine`.
///
/// Work queued by other threads waits until the returned `Pump` is serviced.
pub fn attach<E: Engine + 'static>(engine: E, config: &HostConfig) -> Result<(Dispatcher, Pump)> {
    let id = install_host(Host::new(engine))?;
    let (inbox, jobs) = mpsc::unbounded_channel();
    log::info!("engine host attached to the current thread");
    Ok((
        Dispatcher::new(id, inbox, config),
        Pump {
            id,
            jobs,
            _main: PhantomData,
        },
    ))
}

/// Services a host attached to the current thread
pub struct Pump {
    id: HostId,
    jobs: mpsc::UnboundedReceiver<Job>,
    // must stay on the thread the host was attached to
    _main: PhantomData<*const ()>,
}

impl Pump {
    /// Run everything queued so far. Returns the number of jobs run.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.jobs.try_recv() {
            run_job(self.id, job);
            ran += 1;
        }
        ran
    }

    /// Cross a tick boundary, returning the number of temporaries released
    pub fn end_tick(&mut self) -> usize {
        with_host(self.id, |host| Ok(host.end_tick())).unwrap_or(0)
    }

    /// Direct access to the host from the main context
    pub fn with_host<R>(&mut self, f: impl FnOnce(&mut Host) -> R) -> Result<R> {
        with_host(self.id, |host| Ok(f(host)))
    }
}

impl Drop for Pump {
    fn drop(&mut self) {
        self.jobs.close();
        drop(uninstall_host(self.id));
        log::info!("engine host detached");
    }
}
