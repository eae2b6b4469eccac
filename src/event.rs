//! Typed publish/subscribe dispatcher.
//!
//! Every component of the viewer signals its lifecycle through an
//! [`EventDispatcher`]. Listeners are registered per event type (a string key)
//! and receive an [`Event`] carrying a reference back to the dispatcher, so a
//! listener can deregister itself or others while a dispatch is running.
//!
//! # Dispatch order
//!
//! [`EventDispatcher::trigger`] invokes listeners most-recently-registered
//! first. Later registrations can therefore intercept an event before the
//! listeners that were installed earlier.
//!
//! # Failure isolation
//!
//! A listener returning `Err` is logged and skipped; the remaining listeners
//! still run and the caller of `trigger` never sees the error.

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    fmt,
    rc::Rc,
};

/// Unique handle of a registered listener.
///
/// Ids come from a per-dispatcher counter and are never reused by the same
/// dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

/// What a listener receives when its event type is triggered.
pub struct Event<'a, D> {
    /// The dispatcher that is delivering this event.
    pub target: &'a EventDispatcher<D>,
    /// The event type that was triggered.
    pub event_type: &'a str,
    /// The payload passed to `trigger`, or the listener's own registration data
    /// when `trigger` was called without one.
    pub data: Option<D>,
}

type Callback<D> = Rc<dyn Fn(&Event<'_, D>) -> anyhow::Result<()>>;

struct Listener<D> {
    id: ListenerId,
    callback: Callback<D>,
    once: bool,
    data: Option<D>,
    paused: bool,
}

/// Listener registry keyed by event type.
///
/// All methods take `&self`; the registry lives behind a `RefCell` that is
/// never borrowed while a callback runs.
pub struct EventDispatcher<D> {
    registry: RefCell<HashMap<String, Vec<Listener<D>>>>,
    next_id: Cell<u64>,
}

impl<D> Default for EventDispatcher<D> {
    fn default() -> Self {
        Self {
            registry: RefCell::new(HashMap::new()),
            next_id: Cell::new(0),
        }
    }
}

impl<D> fmt::Debug for EventDispatcher<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.borrow();
        let mut types: Vec<(&String, usize)> =
            registry.iter().map(|(ty, list)| (ty, list.len())).collect();
        types.sort();
        f.debug_struct("EventDispatcher")
            .field("listeners", &types)
            .finish()
    }
}

impl<D: Clone + 'static> EventDispatcher<D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `event_type`.
    ///
    /// When `once` is set the listener is removed right before its first
    /// invocation. `data` is handed to the callback whenever `trigger` is
    /// called without a payload.
    pub fn on<F>(&self, event_type: &str, callback: F, once: bool, data: Option<D>) -> ListenerId
    where
        F: Fn(&Event<'_, D>) -> anyhow::Result<()> + 'static,
    {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.registry
            .borrow_mut()
            .entry(event_type.to_string())
            .or_default()
            .push(Listener {
                id,
                callback: Rc::new(callback),
                once,
                data,
                paused: false,
            });
        id
    }

    /// Shorthand for [`on`](Self::on) with `once = true`.
    pub fn once<F>(&self, event_type: &str, callback: F, data: Option<D>) -> ListenerId
    where
        F: Fn(&Event<'_, D>) -> anyhow::Result<()> + 'static,
    {
        self.on(event_type, callback, true, data)
    }

    /// Synchronously deliver `event_type` to every active listener, newest first.
    ///
    /// The set of listeners is fixed when the call starts. A listener that is
    /// removed or paused by an earlier callback of the same dispatch is skipped;
    /// a listener added during the dispatch only sees later triggers.
    pub fn trigger(&self, event_type: &str, data: Option<D>) {
        let snapshot: Vec<ListenerId> = match self.registry.borrow().get(event_type) {
            Some(list) => list.iter().rev().map(|listener| listener.id).collect(),
            None => return,
        };

        for id in snapshot {
            let Some((callback, listener_data, once)) = self.claim(event_type, id) else {
                continue;
            };
            if once {
                self.off(id);
            }
            let event = Event {
                target: self,
                event_type,
                data: data.clone().or(listener_data),
            };
            if let Err(err) = callback(&event) {
                log::error!("listener {id} for '{event_type}' failed: {err:#}");
            }
        }
    }

    fn claim(&self, event_type: &str, id: ListenerId) -> Option<(Callback<D>, Option<D>, bool)> {
        let registry = self.registry.borrow();
        let listener = registry
            .get(event_type)?
            .iter()
            .find(|listener| listener.id == id)?;
        if listener.paused {
            return None;
        }
        Some((
            Rc::clone(&listener.callback),
            listener.data.clone(),
            listener.once,
        ))
    }

    /// Remove the listener with `id`, whatever its type. Unknown ids are ignored.
    pub fn off(&self, id: ListenerId) {
        let removed = {
            let mut registry = self.registry.borrow_mut();
            let found = registry.iter_mut().find_map(|(event_type, list)| {
                let index = list.iter().position(|listener| listener.id == id)?;
                Some((event_type.clone(), list.remove(index)))
            });
            if let Some((event_type, _)) = &found {
                if registry.get(event_type).is_some_and(|list| list.is_empty()) {
                    registry.remove(event_type);
                }
            }
            found
        };
        drop(removed);
    }

    /// Remove every listener registered for `event_type`.
    pub fn off_type(&self, event_type: &str) {
        // Callbacks are dropped only after the borrow is released.
        let removed = self.registry.borrow_mut().remove(event_type);
        drop(removed);
    }

    /// Remove every listener. The dispatcher stays usable.
    pub fn off_all(&self) {
        let removed = std::mem::take(&mut *self.registry.borrow_mut());
        drop(removed);
    }

    /// Suppress the given listeners until [`resume`](Self::resume).
    pub fn pause(&self, ids: &[ListenerId]) {
        self.set_paused(ids, true);
    }

    pub fn resume(&self, ids: &[ListenerId]) {
        self.set_paused(ids, false);
    }

    fn set_paused(&self, ids: &[ListenerId], paused: bool) {
        self.registry
            .borrow_mut()
            .values_mut()
            .flat_map(|list| list.iter_mut())
            .filter(|listener| ids.contains(&listener.id))
            .for_each(|listener| listener.paused = paused);
    }

    pub fn is_registered(&self, id: ListenerId) -> bool {
        self.registry
            .borrow()
            .values()
            .any(|list| list.iter().any(|listener| listener.id == id))
    }

    /// `None` if the listener is not registered.
    pub fn is_paused(&self, id: ListenerId) -> Option<bool> {
        self.registry
            .borrow()
            .values()
            .flat_map(|list| list.iter())
            .find(|listener| listener.id == id)
            .map(|listener| listener.paused)
    }

    /// Number of listeners for `event_type`, paused ones included.
    pub fn listener_count(&self, event_type: &str) -> usize {
        self.registry
            .borrow()
            .get(event_type)
            .map_or(0, |list| list.len())
    }

    /// Total number of registered listeners.
    pub fn len(&self) -> usize {
        self.registry.borrow().values().map(|list| list.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
