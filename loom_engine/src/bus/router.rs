/// Signal router - per-channel enrollment and publication tables

use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use crate::bus::Bus;
use crate::utils::lock;

/// Integer namespace isolating one bus graph from another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ChannelId(pub u32);

/// Identity of one `Bus` handle (shared by its clones)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct BusId(pub(crate) u64);

/// Identity of one enrollment, usable to withdraw it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnrollmentId(u64);

/// Whether an enrollment gates `Bus::wait()`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// `wait()` stays pending until this enrollment received a value this frame
    Required,
    /// Never blocks
    Optional,
}

/// Outcome of invoking a handler
pub(crate) enum Delivery {
    Delivered,
    /// The subscriber behind the handler no longer exists
    Dead,
}

/// Enrollment type accepting a payload of any type
pub(crate) struct AnyPayload;

pub(crate) type Handler = Arc<dyn Fn(usize, &dyn Any) -> Delivery + Send + Sync>;
pub(crate) type Producer = Arc<dyn Fn() -> Option<Box<dyn Any + Send>> + Send + Sync>;

pub(crate) struct Enrollment {
    id: EnrollmentId,
    owner: BusId,
    type_id: TypeId,
    type_name: &'static str,
    requirement: Requirement,
    handler: Handler,
    delivered: bool,
}

pub(crate) struct Publication {
    id: u64,
    owner: BusId,
    name: String,
    type_id: TypeId,
    type_name: &'static str,
    producer: Producer,
}

/// A publication snapshot taken out of the table so it can run unlocked
pub(crate) struct PublicationSnapshot {
    pub id: u64,
    pub name: String,
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub producer: Producer,
}

/// Handlers selected for one delivery
pub(crate) struct Targets {
    pub handlers: Vec<(EnrollmentId, Handler)>,
    /// Enrolled type name, set the first time a payload reaches a name whose
    /// enrollments all expect another type
    pub mismatch: Option<&'static str>,
}

#[derive(Default)]
pub(crate) struct ChannelTable {
    enrollments: FxHashMap<String, Vec<Enrollment>>,
    publications: Vec<Publication>,
    reported_mismatch: FxHashSet<String>,
    next_id: u64,
}

impl ChannelTable {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Returns the new id and whether the same owner already enrolled this name and type
    pub(crate) fn add_enrollment(
        &mut self,
        owner: BusId,
        name: String,
        type_id: TypeId,
        type_name: &'static str,
        requirement: Requirement,
        handler: Handler,
    ) -> (EnrollmentId, bool) {
        let id = EnrollmentId(self.next_id());
        let list = self.enrollments.entry(name).or_default();
        let duplicate = list.iter().any(|e| e.owner == owner && e.type_id == type_id);
        list.push(Enrollment {
            id,
            owner,
            type_id,
            type_name,
            requirement,
            handler,
            delivered: false,
        });
        (id, duplicate)
    }

    pub(crate) fn add_publication(
        &mut self,
        owner: BusId,
        name: String,
        type_id: TypeId,
        type_name: &'static str,
        producer: Producer,
    ) {
        let id = self.next_id();
        self.publications.push(Publication { id, owner, name, type_id, type_name, producer });
    }

    /// Select every enrollment on `name` expecting `type_id` (or any type) and mark it delivered
    pub(crate) fn collect_targets(&mut self, name: &str, type_id: TypeId) -> Targets {
        let mut handlers = Vec::new();
        let mut mismatch = None;
        if let Some(list) = self.enrollments.get_mut(name) {
            for enrollment in list.iter_mut() {
                if enrollment.type_id == type_id || enrollment.type_id == TypeId::of::<AnyPayload>() {
                    enrollment.delivered = true;
                    handlers.push((enrollment.id, enrollment.handler.clone()));
                } else if mismatch.is_none() {
                    mismatch = Some(enrollment.type_name);
                }
            }
        }
        // A name may carry several payload types; only an unclaimed type is suspicious.
        if !handlers.is_empty() || (mismatch.is_some() && !self.reported_mismatch.insert(name.to_string())) {
            mismatch = None;
        }
        Targets { handlers, mismatch }
    }

    /// Remove enrollments by id, returning the names they were enrolled on
    pub(crate) fn remove_enrollments(&mut self, ids: &[EnrollmentId]) -> Vec<String> {
        let mut names = Vec::new();
        for (name, list) in self.enrollments.iter_mut() {
            let before = list.len();
            list.retain(|e| !ids.contains(&e.id));
            if list.len() != before {
                names.push(name.clone());
            }
        }
        self.enrollments.retain(|_, list| !list.is_empty());
        names
    }

    pub(crate) fn remove_publication(&mut self, id: u64) {
        self.publications.retain(|p| p.id != id);
    }

    pub(crate) fn remove_owner(&mut self, owner: BusId) {
        for list in self.enrollments.values_mut() {
            list.retain(|e| e.owner != owner);
        }
        self.enrollments.retain(|_, list| !list.is_empty());
        self.publications.retain(|p| p.owner != owner);
    }

    pub(crate) fn publications_of(&self, owner: BusId) -> Vec<PublicationSnapshot> {
        self.publications
            .iter()
            .filter(|p| p.owner == owner)
            .map(|p| PublicationSnapshot {
                id: p.id,
                name: p.name.clone(),
                type_id: p.type_id,
                type_name: p.type_name,
                producer: p.producer.clone(),
            })
            .collect()
    }

    /// Names of the owner's Required enrollments that have not received a value
    pub(crate) fn missing_required(&self, owner: BusId) -> Vec<String> {
        let mut missing: Vec<String> = self
            .enrollments
            .iter()
            .flat_map(|(name, list)| {
                list.iter()
                    .filter(move |e| e.owner == owner && e.requirement == Requirement::Required && !e.delivered)
                    .map(move |_| name.clone())
            })
            .collect();
        missing.sort();
        missing
    }

    /// Consume the deliveries of the owner's Required enrollments (one logical frame)
    pub(crate) fn consume_required(&mut self, owner: BusId) {
        for list in self.enrollments.values_mut() {
            for enrollment in list.iter_mut() {
                if enrollment.owner == owner && enrollment.requirement == Requirement::Required {
                    enrollment.delivered = false;
                }
            }
        }
    }

    pub(crate) fn enrollment_count(&self, name: &str) -> usize {
        self.enrollments.get(name).map_or(0, Vec::len)
    }
}

/// Owns the per-channel tables
///
/// Cloning is cheap; every clone routes into the same tables. Each engine owns
/// its own router, so independent graphs never see each other's signals.
#[derive(Clone, Default)]
pub struct SignalRouter {
    inner: Arc<RouterInner>,
}

#[derive(Default)]
struct RouterInner {
    channels: Mutex<FxHashMap<ChannelId, Arc<Mutex<ChannelTable>>>>,
    next_bus: AtomicU64,
}

impl SignalRouter {
    /// Create an empty router
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new bus handle bound to `channel`
    pub fn bus(&self, channel: ChannelId) -> Bus {
        let id = BusId(self.inner.next_bus.fetch_add(1, Ordering::Relaxed) + 1);
        Bus::new(id, channel, self.table(channel))
    }

    /// Number of enrollments on `name` in `channel`
    pub fn enrollment_count(&self, channel: ChannelId, name: &str) -> usize {
        lock(&self.table(channel)).enrollment_count(name)
    }

    /// Number of channels that have been opened
    pub fn channel_count(&self) -> usize {
        lock(&self.inner.channels).len()
    }

    fn table(&self, channel: ChannelId) -> Arc<Mutex<ChannelTable>> {
        lock(&self.inner.channels)
            .entry(channel)
            .or_insert_with(|| Arc::new(Mutex::new(ChannelTable::default())))
            .clone()
    }
}
