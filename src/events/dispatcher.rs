//! Ordered, failure-isolated handler invocation.
//!
//! A [`Dispatcher`] is the handler registry for one extension host. Handlers are stored per
//! event type in a [`SkipMap`] keyed by `(priority, sequence)`, so iteration order is the
//! invocation order: lower priority first, registration order among equal priorities.
//!
//! Firing is synchronous on the caller's thread. The registry lock is not held while handlers
//! run, so a handler may subscribe or unsubscribe; such changes take effect on the next firing.
//!
//! # Examples
//!
//! ```rust
//! use hookscope::events::{BinaryGate, Dispatcher, Event};
//!
//! struct Spawning {
//!     gate: BinaryGate,
//! }
//!
//! impl Event for Spawning {
//!     const NAME: &'static str = "Spawning";
//!     type Outcome = bool;
//!
//!     fn outcome(&self) -> bool {
//!         self.gate.is_allowed()
//!     }
//! }
//!
//! let dispatcher = Dispatcher::new();
//! dispatcher.subscribe::<Spawning, _>(0, |ev| {
//!     ev.gate.deny();
//!     Ok(())
//! });
//!
//! let mut event = Spawning { gate: BinaryGate::new(true) };
//! assert!(!dispatcher.fire(&mut event));
//! ```

use std::{
    any::{Any, TypeId},
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use crossbeam_skiplist::SkipMap;
use dashmap::DashMap;

use crate::{
    metadata::diagnostics::{Diagnostic, DiagnosticCategory, DiagnosticSeverity, Diagnostics},
    Error, Result,
};

/// Handler ordering key; lower values run first.
pub type Priority = i32;

/// A payload that handlers receive by mutable reference.
///
/// The payload is constructed once per firing, passed through every handler and dropped after
/// the firing routine reads [`Event::outcome`].
pub trait Event: Send + 'static {
    /// Name used in diagnostics
    const NAME: &'static str;

    /// What the firing routine reads back after all handlers ran
    type Outcome;

    /// Reads the outcome from the (possibly mutated) payload.
    fn outcome(&self) -> Self::Outcome;
}

/// Identifies one registration, for [`Dispatcher::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    /// The raw registration sequence number.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler#{}", self.0)
    }
}

type HandlerFn<E> = dyn Fn(&mut E) -> Result<()> + Send + Sync;

struct Registration<E> {
    owner: Option<String>,
    handler: Arc<HandlerFn<E>>,
}

/// Type-erased view of a per-event handler list.
trait HandlerTable: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn remove(&self, id: HandlerId) -> bool;
    fn remove_owner(&self, owner: &str) -> usize;
    fn len(&self) -> usize;
}

struct HandlerList<E> {
    entries: SkipMap<(Priority, u64), Registration<E>>,
}

impl<E: Event> HandlerTable for HandlerList<E> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn remove(&self, id: HandlerId) -> bool {
        let key = self
            .entries
            .iter()
            .find(|entry| entry.key().1 == id.0)
            .map(|entry| *entry.key());
        key.is_some_and(|key| self.entries.remove(&key).is_some())
    }

    fn remove_owner(&self, owner: &str) -> usize {
        let keys: Vec<(Priority, u64)> = self
            .entries
            .iter()
            .filter(|entry| entry.value().owner.as_deref() == Some(owner))
            .map(|entry| *entry.key())
            .collect();
        keys.iter()
            .filter(|key| self.entries.remove(*key).is_some())
            .count()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Process-wide handler registry with an explicit lifecycle.
///
/// Create one at extension host start-up, register handlers while loading extensions, call
/// [`Dispatcher::unsubscribe_owner`] when an extension unloads and [`Dispatcher::clear`] when
/// the host shuts down.
pub struct Dispatcher {
    tables: DashMap<TypeId, Arc<dyn HandlerTable>>,
    sequence: AtomicU64,
    diagnostics: Arc<Diagnostics>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("event_types", &self.tables.len())
            .field("handlers", &self.len())
            .finish()
    }
}

impl Dispatcher {
    /// Creates an empty registry with its own diagnostics sink.
    #[must_use]
    pub fn new() -> Self {
        Self::with_diagnostics(Arc::new(Diagnostics::new()))
    }

    /// Creates an empty registry reporting handler failures into `diagnostics`.
    #[must_use]
    pub fn with_diagnostics(diagnostics: Arc<Diagnostics>) -> Self {
        Self {
            tables: DashMap::new(),
            sequence: AtomicU64::new(0),
            diagnostics,
        }
    }

    /// The sink receiving handler failures.
    #[must_use]
    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diagnostics
    }

    /// Registers `handler` for events of type `E`.
    pub fn subscribe<E, F>(&self, priority: Priority, handler: F) -> HandlerId
    where
        E: Event,
        F: Fn(&mut E) -> Result<()> + Send + Sync + 'static,
    {
        self.register(None, priority, Arc::new(handler))
    }

    /// Registers `handler` under an owning extension's name.
    pub fn subscribe_owned<E, F>(&self, owner: &str, priority: Priority, handler: F) -> HandlerId
    where
        E: Event,
        F: Fn(&mut E) -> Result<()> + Send + Sync + 'static,
    {
        self.register(Some(owner.to_string()), priority, Arc::new(handler))
    }

    fn register<E: Event>(
        &self,
        owner: Option<String>,
        priority: Priority,
        handler: Arc<HandlerFn<E>>,
    ) -> HandlerId {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let table = self
            .tables
            .entry(TypeId::of::<E>())
            .or_insert_with(|| -> Arc<dyn HandlerTable> {
                Arc::new(HandlerList::<E> {
                    entries: SkipMap::new(),
                })
            })
            .value()
            .clone();

        if let Some(list) = table.as_any().downcast_ref::<HandlerList<E>>() {
            list.entries
                .insert((priority, seq), Registration { owner, handler });
        }

        log::debug!("subscribed handler#{seq} to {} at priority {priority}", E::NAME);
        HandlerId(seq)
    }

    /// Removes one registration. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: HandlerId) -> bool {
        self.snapshot_tables().iter().any(|table| table.remove(id))
    }

    /// Removes every registration made under `owner`. Returns how many were removed.
    pub fn unsubscribe_owner(&self, owner: &str) -> usize {
        let removed = self
            .snapshot_tables()
            .iter()
            .map(|table| table.remove_owner(owner))
            .sum();
        log::debug!("unsubscribed {removed} handlers owned by {owner}");
        removed
    }

    /// Removes every registration.
    pub fn clear(&self) {
        self.tables.clear();
    }

    /// Number of handlers registered for `E`.
    #[must_use]
    pub fn handler_count<E: Event>(&self) -> usize {
        self.table::<E>().map_or(0, |table| table.len())
    }

    /// Total number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot_tables().iter().map(|table| table.len()).sum()
    }

    /// Returns true if no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs every handler registered for `E` and returns the event's outcome.
    ///
    /// A handler that returns an error or panics is recorded as an error diagnostic and the
    /// remaining handlers still run.
    pub fn fire<E: Event>(&self, event: &mut E) -> E::Outcome {
        let handlers: Vec<(u64, Arc<HandlerFn<E>>)> = match self.table::<E>() {
            Some(table) => match table.as_any().downcast_ref::<HandlerList<E>>() {
                Some(list) => list
                    .entries
                    .iter()
                    .map(|entry| (entry.key().1, Arc::clone(&entry.value().handler)))
                    .collect(),
                None => Vec::new(),
            },
            None => Vec::new(),
        };

        for (seq, handler) in handlers {
            let failure = match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => continue,
                Ok(Err(error)) => error,
                Err(payload) => Error::Handler(panic_message(payload.as_ref())),
            };
            self.report(E::NAME, HandlerId(seq), &failure);
        }

        event.outcome()
    }

    fn report(&self, event: &'static str, id: HandlerId, error: &Error) {
        self.diagnostics.push(
            Diagnostic::new(
                DiagnosticSeverity::Error,
                DiagnosticCategory::Dispatch,
                format!("{id} failed: {error}"),
            )
            .with_event(event),
        );
    }

    fn table<E: Event>(&self) -> Option<Arc<dyn HandlerTable>> {
        self.tables
            .get(&TypeId::of::<E>())
            .map(|table| Arc::clone(table.value()))
    }

    fn snapshot_tables(&self) -> Vec<Arc<dyn HandlerTable>> {
        self.tables
            .iter()
            .map(|table| Arc::clone(table.value()))
            .collect()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}
