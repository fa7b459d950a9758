/// Bus handle - the per-module view of a channel

use std::any::{type_name, Any, TypeId};
use std::sync::{Arc, Mutex, Weak};
use crate::bus::router::{AnyPayload, BusId, ChannelTable, Delivery, Handler, Producer, PublicationSnapshot};
use crate::bus::{ChannelId, EnrollmentId, Requirement};
use crate::utils::lock;
use crate::{engine_trace, engine_warn};

/// Consecutive pending `wait()` calls before a stall warning is logged
pub const STALL_WARNING_FRAMES: u32 = 120;

/// Build `"<instance>::<port>"`
pub fn signal_name(instance: &str, port: &str) -> String {
    format!("{}::{}", instance, port)
}

/// Result of [`Bus::wait`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitStatus {
    /// Every Required enrollment received a value since the previous `Ready`
    Ready,
    /// Required enrollments still waiting for a value this frame
    Pending { missing: Vec<String> },
}

impl WaitStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, WaitStatus::Ready)
    }
}

struct StallTracker {
    threshold: u32,
    frames: u32,
    reported: bool,
}

struct BusInner {
    id: BusId,
    channel: ChannelId,
    table: Arc<Mutex<ChannelTable>>,
    stall: Mutex<StallTracker>,
}

impl Drop for BusInner {
    fn drop(&mut self) {
        lock(&self.table).remove_owner(self.id);
    }
}

/// A module's handle on one channel
///
/// Clones share identity: enrollments and publications belong to the handle,
/// not to the clone that registered them. They are withdrawn when the last
/// clone is dropped.
///
/// # Example
///
/// ```
/// use loom_engine::loom::bus::{SignalRouter, ChannelId, Requirement};
/// use std::sync::{Arc, Mutex};
///
/// let router = SignalRouter::new();
/// let producer = router.bus(ChannelId(0));
/// let consumer = router.bus(ChannelId(0));
///
/// let seen = Arc::new(Mutex::new(0u32));
/// consumer.enroll_to(&seen, "cam::width", Requirement::Optional, |seen: &mut u32, w: &u32| *seen = *w);
/// producer.emit_value("cam::width", 640u32);
/// assert_eq!(*seen.lock().unwrap(), 640);
/// ```
#[derive(Clone)]
pub struct Bus {
    inner: Arc<BusInner>,
}

/// Non-owning bus handle
#[derive(Clone)]
pub struct WeakBus {
    inner: Weak<BusInner>,
}

impl WeakBus {
    pub fn upgrade(&self) -> Option<Bus> {
        self.inner.upgrade().map(|inner| Bus { inner })
    }
}

impl Bus {
    pub(crate) fn new(id: BusId, channel: ChannelId, table: Arc<Mutex<ChannelTable>>) -> Self {
        Self {
            inner: Arc::new(BusInner {
                id,
                channel,
                table,
                stall: Mutex::new(StallTracker {
                    threshold: STALL_WARNING_FRAMES,
                    frames: 0,
                    reported: false,
                }),
            }),
        }
    }

    /// Concatenate name fragments into one signal name
    pub fn qualify(parts: &[&str]) -> String {
        parts.concat()
    }

    pub fn channel(&self) -> ChannelId {
        self.inner.channel
    }

    pub fn downgrade(&self) -> WeakBus {
        WeakBus { inner: Arc::downgrade(&self.inner) }
    }

    /// Change how many pending frames trigger a stall warning
    pub fn set_stall_threshold(&self, frames: u32) {
        lock(&self.inner.stall).threshold = frames.max(1);
    }

    /// Number of enrollments on `name` across the channel
    pub fn enrollment_count(&self, name: &str) -> usize {
        lock(&self.inner.table).enrollment_count(name)
    }

    // ===== ENROLLMENT =====

    /// Enroll a callback on `name` for payloads of type `T`
    pub fn enroll<T, F>(&self, name: impl Into<String>, requirement: Requirement, callback: F) -> EnrollmentId
    where
        T: Any + Send + Sync,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.enroll_handler::<T>(name.into(), requirement, Arc::new(move |_, payload| {
            if let Some(value) = payload.downcast_ref::<T>() {
                callback(value);
            }
            Delivery::Delivered
        }))
    }

    /// Enroll a callback receiving the slot index threaded by `emit_indexed`
    ///
    /// Plain emissions arrive with index 0.
    pub fn enroll_indexed<T, F>(&self, name: impl Into<String>, requirement: Requirement, callback: F) -> EnrollmentId
    where
        T: Any + Send + Sync,
        F: Fn(usize, &T) + Send + Sync + 'static,
    {
        self.enroll_handler::<T>(name.into(), requirement, Arc::new(move |index, payload| {
            if let Some(value) = payload.downcast_ref::<T>() {
                callback(index, value);
            }
            Delivery::Delivered
        }))
    }

    /// Enroll on `name` whatever payload type it carries
    ///
    /// The callback only observes the arrival and its slot index. Useful for
    /// Required enrollments that gate `wait()` on a signal without reading it.
    pub fn enroll_any<F>(&self, name: impl Into<String>, requirement: Requirement, callback: F) -> EnrollmentId
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.enroll_handler::<AnyPayload>(name.into(), requirement, Arc::new(move |index, _| {
            callback(index);
            Delivery::Delivered
        }))
    }

    /// Enroll a setter on shared subscriber state
    ///
    /// The subscriber is held weakly: once it is dropped, the next delivery
    /// prunes the enrollment instead of reaching freed state.
    pub fn enroll_to<S, T, F>(
        &self,
        target: &Arc<Mutex<S>>,
        name: impl Into<String>,
        requirement: Requirement,
        setter: F,
    ) -> EnrollmentId
    where
        S: Send + 'static,
        T: Any + Send + Sync,
        F: Fn(&mut S, &T) + Send + Sync + 'static,
    {
        let weak = Arc::downgrade(target);
        self.enroll_handler::<T>(name.into(), requirement, Arc::new(move |_, payload| {
            let Some(target) = weak.upgrade() else {
                return Delivery::Dead;
            };
            if let Some(value) = payload.downcast_ref::<T>() {
                setter(&mut lock(&target), value);
            }
            Delivery::Delivered
        }))
    }

    /// Indexed variant of [`Bus::enroll_to`]
    pub fn enroll_indexed_to<S, T, F>(
        &self,
        target: &Arc<Mutex<S>>,
        name: impl Into<String>,
        requirement: Requirement,
        setter: F,
    ) -> EnrollmentId
    where
        S: Send + 'static,
        T: Any + Send + Sync,
        F: Fn(&mut S, usize, &T) + Send + Sync + 'static,
    {
        let weak = Arc::downgrade(target);
        self.enroll_handler::<T>(name.into(), requirement, Arc::new(move |index, payload| {
            let Some(target) = weak.upgrade() else {
                return Delivery::Dead;
            };
            if let Some(value) = payload.downcast_ref::<T>() {
                setter(&mut lock(&target), index, value);
            }
            Delivery::Delivered
        }))
    }

    /// Withdraw one enrollment; returns false if it was already gone
    pub fn withdraw(&self, id: EnrollmentId) -> bool {
        !lock(&self.inner.table).remove_enrollments(&[id]).is_empty()
    }

    fn enroll_handler<T: Any>(&self, name: String, requirement: Requirement, handler: Handler) -> EnrollmentId {
        let (id, duplicate) = lock(&self.inner.table).add_enrollment(
            self.inner.id,
            name.clone(),
            TypeId::of::<T>(),
            type_name::<T>(),
            requirement,
            handler,
        );
        if duplicate {
            engine_warn!("loom::Bus", "Duplicate enrollment on '{}' ({})", name, type_name::<T>());
        }
        id
    }

    // ===== PUBLICATION =====

    /// Register an accessor whose value is pushed to `name` on every `emit()`
    pub fn publish<T, F>(&self, name: impl Into<String>, accessor: F)
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let producer: Producer = Arc::new(move || Some(Box::new(accessor()) as Box<dyn Any + Send>));
        self.add_publication::<T>(name.into(), producer);
    }

    /// Publish a value read from shared state, held weakly
    pub fn publish_from<S, T, F>(&self, source: &Arc<Mutex<S>>, name: impl Into<String>, accessor: F)
    where
        S: Send + 'static,
        T: Any + Send + Sync,
        F: Fn(&S) -> T + Send + Sync + 'static,
    {
        let weak = Arc::downgrade(source);
        let producer: Producer = Arc::new(move || {
            let source = weak.upgrade()?;
            let value = accessor(&lock(&source));
            Some(Box::new(value) as Box<dyn Any + Send>)
        });
        self.add_publication::<T>(name.into(), producer);
    }

    fn add_publication<T: Any>(&self, name: String, producer: Producer) {
        lock(&self.inner.table).add_publication(
            self.inner.id,
            name,
            TypeId::of::<T>(),
            type_name::<T>(),
            producer,
        );
    }

    // ===== EMISSION =====

    /// Push every publication owned by this bus to its enrollments
    ///
    /// Returns the number of deliveries made.
    pub fn emit(&self) -> usize {
        let publications: Vec<PublicationSnapshot> = lock(&self.inner.table).publications_of(self.inner.id);
        let mut delivered = 0;
        for publication in publications {
            match (publication.producer)() {
                Some(value) => {
                    let payload: &dyn Any = &*value;
                    delivered += self.deliver(&publication.name, publication.type_id, publication.type_name, 0, payload);
                }
                None => {
                    lock(&self.inner.table).remove_publication(publication.id);
                    engine_warn!("loom::Bus", "Dropped publication '{}': source no longer exists", publication.name);
                }
            }
        }
        delivered
    }

    /// Push an explicit value to every enrollment on `name`
    pub fn emit_value<T: Any + Send + Sync>(&self, name: &str, value: T) -> usize {
        self.deliver(name, TypeId::of::<T>(), type_name::<T>(), 0, &value)
    }

    /// Push a value tagged with a slot index
    pub fn emit_indexed<T: Any + Send + Sync>(&self, name: &str, value: T, index: usize) -> usize {
        self.deliver(name, TypeId::of::<T>(), type_name::<T>(), index, &value)
    }

    fn deliver(&self, name: &str, type_id: TypeId, carried: &'static str, index: usize, payload: &dyn Any) -> usize {
        // Handlers run with the table unlocked so they may enroll or emit themselves.
        let targets = lock(&self.inner.table).collect_targets(name, type_id);
        if let Some(expected) = targets.mismatch {
            engine_warn!("loom::Bus", "Signal '{}' carries {} but an enrollment expects {}", name, carried, expected);
        }

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, handler) in targets.handlers {
            match handler(index, payload) {
                Delivery::Delivered => delivered += 1,
                Delivery::Dead => dead.push(id),
            }
        }

        if !dead.is_empty() {
            lock(&self.inner.table).remove_enrollments(&dead);
            engine_warn!("loom::Bus", "Pruned {} enrollment(s) on '{}' whose subscriber was dropped", dead.len(), name);
        }
        engine_trace!("loom::Bus", "'{}' delivered to {} enrollment(s)", name, delivered);
        delivered
    }

    // ===== WAIT =====

    /// Cooperative frame gate over this bus's Required enrollments
    pub fn wait(&self) -> WaitStatus {
        let missing = {
            let mut table = lock(&self.inner.table);
            let missing = table.missing_required(self.inner.id);
            if missing.is_empty() {
                table.consume_required(self.inner.id);
            }
            missing
        };

        let mut stall = lock(&self.inner.stall);
        if missing.is_empty() {
            stall.frames = 0;
            stall.reported = false;
            return WaitStatus::Ready;
        }

        stall.frames += 1;
        if stall.frames >= stall.threshold && !stall.reported {
            stall.reported = true;
            engine_warn!(
                "loom::Bus",
                "Required input(s) {:?} missing for {} consecutive frames",
                missing,
                stall.frames
            );
        }
        WaitStatus::Pending { missing }
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
