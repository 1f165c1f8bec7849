use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::config::RuntimeConfig;
use super::domain::{Group, LocalDomain};
use super::logging::{LogLevel, LogRecord, LogSink, Logger, TracingSink};
use crate::engine::background::Background;
use crate::engine::Delivery;
use crate::error::{EngineResult, NodeError};
use crate::event::{DomainEvent, DomainHandler, EventEmitter};
use crate::graph::{Net, NetData};
use crate::nodes::{CoreId, NodeCore};

/// Tags every [`CoreId`] with the runtime that minted it.
static NEXT_RUNTIME_SERIAL: AtomicU64 = AtomicU64::new(0);

/// Integration object attached to the local domain, e.g. a monitor bridge.
pub trait DomainMonitor: Send + Sync {
    /// Called from [`Runtime::boot`].
    fn on_boot(&self, _runtime: &Runtime) {}
}

/// Live cores by index. Entries are weak; a core removes itself on drop.
pub(crate) type CoreRegistry = Mutex<HashMap<u64, Weak<NodeCore>>>;

struct RuntimeInner {
    config: RuntimeConfig,
    domain: LocalDomain,
    logger: Logger,
    serial: u64,
    next_core: AtomicU64,
    cores: Arc<CoreRegistry>,
    background: Arc<Background>,
    domain_events: Mutex<EventEmitter<DomainEvent, DomainHandler>>,
    monitor: Mutex<Option<Arc<dyn DomainMonitor>>>,
}

/// The local domain: id counters, logger, domain events and the driver for
/// detached downstream work.
///
/// Cheap to clone; clones share the same domain. Nodes, cores and nets are
/// owned by the handles that use them, not by the runtime. Several runtimes
/// can coexist in one process without sharing any ids.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    pub fn new() -> Self {
        Self::from_parts(RuntimeConfig::default(), Vec::new())
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    pub fn with_config(config: RuntimeConfig) -> EngineResult<Self> {
        Self::builder().config(config).build()
    }

    fn from_parts(config: RuntimeConfig, sinks: Vec<Arc<dyn LogSink>>) -> Self {
        let logger = Logger::new(config.log_level);
        if config.tracing_sink {
            logger.register(Arc::new(TracingSink));
        }
        for sink in sinks {
            logger.register(sink);
        }
        let domain = LocalDomain::new(config.domain_id.clone());
        Self {
            inner: Arc::new(RuntimeInner {
                config,
                domain,
                logger,
                serial: NEXT_RUNTIME_SERIAL.fetch_add(1, Ordering::Relaxed),
                next_core: AtomicU64::new(0),
                cores: Arc::new(CoreRegistry::default()),
                background: Arc::new(Background::default()),
                domain_events: Mutex::new(EventEmitter::new()),
                monitor: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn domain(&self) -> &LocalDomain {
        &self.inner.domain
    }

    pub fn logger(&self) -> &Logger {
        &self.inner.logger
    }

    pub fn create_group(&self) -> EngineResult<Group> {
        self.inner.domain.create_group()
    }

    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ---- cores ----

    pub(crate) fn insert_core<F>(&self, build: F) -> Arc<NodeCore>
    where
        F: FnOnce(CoreId, Weak<CoreRegistry>) -> NodeCore,
    {
        let index = self.inner.next_core.fetch_add(1, Ordering::SeqCst);
        let id = CoreId::new(self.inner.serial, index);
        let core = Arc::new(build(id, Arc::downgrade(&self.inner.cores)));
        self.inner.cores.lock().insert(index, Arc::downgrade(&core));
        core
    }

    /// A live core minted by this runtime.
    pub(crate) fn find_core(&self, id: CoreId) -> Option<Arc<NodeCore>> {
        if id.runtime_serial() != self.inner.serial {
            return None;
        }
        self.inner.cores.lock().get(&id.index()).and_then(Weak::upgrade)
    }

    /// Cores that still have at least one owner.
    pub fn core_count(&self) -> usize {
        self.inner
            .cores
            .lock()
            .values()
            .filter(|core| core.strong_count() > 0)
            .count()
    }

    /// A fresh root net with no parent and no members.
    pub fn create_net(&self) -> Net {
        Net::from_data(self.clone(), Arc::new(NetData::default()))
    }

    // ---- detached work ----

    /// Hand a delivery off so it completes without anyone awaiting it.
    ///
    /// Inside a tokio runtime the work is spawned right away; otherwise it is
    /// kept until [`Runtime::settle`] runs it.
    pub fn detach(&self, delivery: Delivery) {
        self.inner.background.detach(delivery);
    }

    /// Detached deliveries that have not finished yet.
    pub fn pending_deliveries(&self) -> usize {
        self.inner.background.pending()
    }

    /// Wait until every detached delivery, and everything it started in
    /// turn, has finished. Resumes a panic raised inside one of them.
    pub async fn settle(&self) {
        self.inner.background.settle().await;
    }

    // ---- domain events ----

    pub fn on(&self, event: DomainEvent, handler: DomainHandler) {
        self.inner.domain_events.lock().on(event, handler);
    }

    pub fn on_named(&self, event: &str, handler: DomainHandler) -> EngineResult<()> {
        self.on(DomainEvent::from_name(event)?, handler);
        Ok(())
    }

    pub fn off(&self, event: DomainEvent, handler: &DomainHandler) -> bool {
        self.inner
            .domain_events
            .lock()
            .off(&event, |h| h.same_as(handler))
    }

    /// Last stop of error propagation. An error nobody handles is fatal.
    pub(crate) fn throw_uncaught_node_error(&self, err: NodeError) {
        let handlers = self
            .inner
            .domain_events
            .lock()
            .snapshot(&DomainEvent::UncaughtNodeError);
        for handler in handlers {
            if handler.call(&err) {
                return;
            }
        }
        self.inner
            .logger
            .log(LogLevel::Error, LogRecord::NodeError(err.clone()));
        panic!("uncaught node error: {}", err);
    }

    // ---- monitor ----

    /// Store the monitor and boot the domain.
    pub fn attach_monitor(&self, monitor: Arc<dyn DomainMonitor>) {
        *self.inner.monitor.lock() = Some(monitor);
        self.boot();
    }

    pub fn monitor(&self) -> Option<Arc<dyn DomainMonitor>> {
        self.inner.monitor.lock().clone()
    }

    pub fn boot(&self) {
        self.inner.logger.debug(LogRecord::with_node(
            format!("booting domain {}", self.inner.domain.id()),
            None,
            Some("Runtime::boot"),
        ));
        if let Some(monitor) = self.monitor() {
            monitor.on_boot(self);
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("domain", self.inner.domain.identity())
            .field("cores", &self.core_count())
            .finish()
    }
}

#[derive(Default)]
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    sinks: Vec<Arc<dyn LogSink>>,
}

impl RuntimeBuilder {
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn domain_id(mut self, id: impl Into<String>) -> Self {
        self.config.domain_id = Some(id.into());
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.log_level = level;
        self
    }

    pub fn log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn build(self) -> EngineResult<Runtime> {
        self.config.validate()?;
        Ok(Runtime::from_parts(self.config, self.sinks))
    }
}
