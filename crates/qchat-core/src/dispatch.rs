//! Type-indexed publish/subscribe for decoded frames.
//!
//! Listeners subscribe to one [`FrameType`] or to every frame ([`Topic::Any`]).
//! A frame is delivered to the listeners of its own type first, then to the
//! wildcard listeners, each group in registration order.
//!
//! # Invariants
//!
//! - Snapshot: the set of listeners for a frame is fixed before the first one
//!   runs. A listener subscribed during dispatch does not see that frame.
//! - Removal wins: a listener unsubscribed during dispatch (by an earlier
//!   listener) is not invoked for that frame.
//! - Isolation: a listener returning an error, or one that is already running
//!   because of a re-entrant dispatch, is skipped and logged. Delivery to the
//!   remaining listeners continues.

use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::{Rc, Weak},
};

use qchat_proto::{FrameType, InboundFrame};

use crate::error::ListenerError;

/// What a listener subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Frames of one type
    Frame(FrameType),
    /// Every frame
    Any,
}

impl From<FrameType> for Topic {
    fn from(frame_type: FrameType) -> Self {
        Self::Frame(frame_type)
    }
}

type Listener = dyn FnMut(&InboundFrame) -> Result<(), ListenerError>;

struct Entry {
    id: u64,
    topic: Topic,
    active: Rc<Cell<bool>>,
    listener: Rc<RefCell<Box<Listener>>>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: Vec<Entry>,
}

/// Outcome of delivering one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Listeners that handled the frame
    pub delivered: usize,
    /// Listeners that returned an error
    pub failed: usize,
    /// Listeners skipped because they were removed or already running
    pub skipped: usize,
}

/// Shared handle to the listener registry.
///
/// Cloning the handle shares the registry.
#[derive(Clone, Default)]
pub struct DispatchRegistry {
    inner: Rc<RefCell<Registry>>,
}

impl DispatchRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `topic`.
    ///
    /// The registration lives until [`Subscription::unsubscribe`] is called.
    /// Dropping the [`Subscription`] without unsubscribing leaves the listener
    /// registered for the lifetime of the registry.
    pub fn subscribe<F>(&self, topic: impl Into<Topic>, listener: F) -> Subscription
    where
        F: FnMut(&InboundFrame) -> Result<(), ListenerError> + 'static,
    {
        let topic = topic.into();
        let active = Rc::new(Cell::new(true));

        let mut registry = self.inner.borrow_mut();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.entries.push(Entry {
            id,
            topic,
            active: Rc::clone(&active),
            listener: Rc::new(RefCell::new(Box::new(listener))),
        });

        tracing::trace!(id, ?topic, "listener subscribed");

        Subscription { id, topic, active, registry: Rc::downgrade(&self.inner) }
    }

    /// Deliver `frame` to every matching listener.
    pub fn dispatch(&self, frame: &InboundFrame) -> DispatchReport {
        let frame_type = frame.frame_type();
        let snapshot = self.snapshot(frame_type);
        let mut report = DispatchReport::default();

        for (id, active, listener) in snapshot {
            if !active.get() {
                report.skipped += 1;
                continue;
            }

            let Ok(mut listener) = listener.try_borrow_mut() else {
                tracing::warn!(id, %frame_type, "listener is already running, skipping");
                report.skipped += 1;
                continue;
            };

            match listener(frame) {
                Ok(()) => report.delivered += 1,
                Err(error) => {
                    tracing::warn!(id, %frame_type, %error, "listener failed");
                    report.failed += 1;
                },
            }
        }

        report
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    /// True if no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live registrations for exactly `topic`.
    pub fn listener_count(&self, topic: impl Into<Topic>) -> usize {
        let topic = topic.into();
        self.inner.borrow().entries.iter().filter(|e| e.topic == topic).count()
    }

    #[allow(clippy::type_complexity)]
    fn snapshot(
        &self,
        frame_type: FrameType,
    ) -> Vec<(u64, Rc<Cell<bool>>, Rc<RefCell<Box<Listener>>>)> {
        let registry = self.inner.borrow();
        let typed = registry.entries.iter().filter(|e| e.topic == Topic::Frame(frame_type));
        let wildcard = registry.entries.iter().filter(|e| e.topic == Topic::Any);

        typed
            .chain(wildcard)
            .map(|e| (e.id, Rc::clone(&e.active), Rc::clone(&e.listener)))
            .collect()
    }
}

impl fmt::Debug for DispatchRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(registry) => f
                .debug_struct("DispatchRegistry")
                .field("listeners", &registry.entries.len())
                .finish(),
            Err(_) => f.debug_struct("DispatchRegistry").finish_non_exhaustive(),
        }
    }
}

/// Handle for removing one registration.
#[derive(Debug)]
#[must_use = "a subscription can only be removed through its handle"]
pub struct Subscription {
    id: u64,
    topic: Topic,
    active: Rc<Cell<bool>>,
    registry: Weak<RefCell<Registry>>,
}

impl Subscription {
    /// Topic this subscription listens on.
    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// True while the listener is registered.
    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    /// Remove exactly this registration.
    ///
    /// Safe to call from inside a listener. Returns `false` if the
    /// registration was already gone.
    pub fn unsubscribe(self) -> bool {
        let was_active = self.active.replace(false);

        if let Some(registry) = self.registry.upgrade()
            && let Ok(mut registry) = registry.try_borrow_mut()
        {
            registry.entries.retain(|e| e.id != self.id);
        }

        if was_active {
            tracing::trace!(id = self.id, topic = ?self.topic, "listener unsubscribed");
        }
        was_active
    }
}
