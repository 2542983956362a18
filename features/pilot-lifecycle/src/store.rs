use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::{Mutex, RwLock};

use crate::{
    enhancer::EnhancedInstance,
    errors::LifecycleError,
    filter::{PointFilter, PointSet},
    lazy::LazyCell,
    point::{InjectionPoint, PointKey},
    types::{Configuration, Instance},
};

/// Kind of value a store holds for a point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    Configuration,
    Callable,
    Enhanced,
}
impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotKind::Configuration => f.write_str("configuration"),
            SlotKind::Callable => f.write_str("instance callable"),
            SlotKind::Enhanced => f.write_str("enhanced instance"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SlotValue {
    Configuration(Configuration),
    Callable(LazyCell<Instance>),
    Enhanced(EnhancedInstance),
}
impl SlotValue {
    pub fn kind(&self) -> SlotKind {
        match self {
            SlotValue::Configuration(_) => SlotKind::Configuration,
            SlotValue::Callable(_) => SlotKind::Callable,
            SlotValue::Enhanced(_) => SlotKind::Enhanced,
        }
    }
}

/// Lifecycle position of a point
///
/// Points only move forward one state at a time. Destroyed is reachable from anywhere
/// and final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LifecycleState {
    Unconfigured,
    Configured,
    CallableReady,
    Instantiated,
    Enhanced,
    Destroyed,
}
impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Unconfigured => f.write_str("UNCONFIGURED"),
            LifecycleState::Configured => f.write_str("CONFIGURED"),
            LifecycleState::CallableReady => f.write_str("CALLABLE_READY"),
            LifecycleState::Instantiated => f.write_str("INSTANTIATED"),
            LifecycleState::Enhanced => f.write_str("ENHANCED"),
            LifecycleState::Destroyed => f.write_str("DESTROYED"),
        }
    }
}
impl LifecycleState {
    pub fn next(self) -> Option<LifecycleState> {
        match self {
            LifecycleState::Unconfigured => Some(LifecycleState::Configured),
            LifecycleState::Configured => Some(LifecycleState::CallableReady),
            LifecycleState::CallableReady => Some(LifecycleState::Instantiated),
            LifecycleState::Instantiated => Some(LifecycleState::Enhanced),
            LifecycleState::Enhanced => Some(LifecycleState::Destroyed),
            LifecycleState::Destroyed => None,
        }
    }

    pub fn can_advance_to(self, to: LifecycleState) -> bool {
        match to {
            LifecycleState::Destroyed => self != LifecycleState::Destroyed,
            to => self.next() == Some(to),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Class,
    Method,
}
impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKind::Class => f.write_str("class"),
            ScopeKind::Method => f.write_str("method"),
        }
    }
}

#[derive(Debug, Clone)]
struct PointRecord {
    point: InjectionPoint,
    state: LifecycleState,
    failure: Option<LifecycleError>,
}

#[derive(Debug, Default)]
struct StoreContent {
    slots: HashMap<(PointKey, SlotKind), SlotValue>,
    records: HashMap<PointKey, PointRecord>,
    /// Preparation order, teardown walks it backwards
    order: Vec<PointKey>,
    enhance_locks: HashMap<PointKey, Arc<Mutex<()>>>,
}

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// Values of one active scope instance
///
/// A store is owned by its scope. Reads and inserts are safe from any thread, sequencing
/// the lifecycle steps is left to the orchestrator.
pub struct ScopedStore {
    id: u64,
    kind: ScopeKind,
    label: String,
    content: RwLock<StoreContent>,
}
impl fmt::Debug for ScopedStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedStore")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("points", &self.content.read().order.len())
            .finish()
    }
}

impl ScopedStore {
    pub fn new(kind: ScopeKind, label: impl Into<String>) -> Self {
        Self {
            id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
            kind,
            label: label.into(),
            content: RwLock::new(StoreContent::default()),
        }
    }

    pub fn class(label: impl Into<String>) -> Self {
        Self::new(ScopeKind::Class, label)
    }

    pub fn method(label: impl Into<String>) -> Self {
        Self::new(ScopeKind::Method, label)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn put(&self, point: &InjectionPoint, value: SlotValue) {
        self.content
            .write()
            .slots
            .insert((point.key(), value.kind()), value);
    }

    pub fn get(&self, point: &InjectionPoint, slot: SlotKind) -> Option<SlotValue> {
        self.content.read().slots.get(&(point.key(), slot)).cloned()
    }

    pub fn remove(&self, point: &InjectionPoint, slot: SlotKind) -> Option<SlotValue> {
        self.content.write().slots.remove(&(point.key(), slot))
    }

    pub fn contains(&self, point: &InjectionPoint, slot: SlotKind) -> bool {
        self.content.read().slots.contains_key(&(point.key(), slot))
    }

    pub fn configuration(&self, point: &InjectionPoint) -> Option<Configuration> {
        match self.get(point, SlotKind::Configuration)? {
            SlotValue::Configuration(configuration) => Some(configuration),
            _ => None,
        }
    }

    pub fn callable(&self, point: &InjectionPoint) -> Option<LazyCell<Instance>> {
        match self.get(point, SlotKind::Callable)? {
            SlotValue::Callable(cell) => Some(cell),
            _ => None,
        }
    }

    pub fn enhanced(&self, point: &InjectionPoint) -> Option<EnhancedInstance> {
        match self.get(point, SlotKind::Enhanced)? {
            SlotValue::Enhanced(enhanced) => Some(enhanced),
            _ => None,
        }
    }

    /// Starts tracking a point, returns false if its key is already tracked
    pub fn track(&self, point: &InjectionPoint) -> bool {
        let mut content = self.content.write();
        let key = point.key();
        if content.records.contains_key(&key) {
            return false;
        }
        content.records.insert(
            key.clone(),
            PointRecord {
                point: point.clone(),
                state: LifecycleState::Unconfigured,
                failure: None,
            },
        );
        content.order.push(key);
        true
    }

    pub fn is_tracked(&self, point: &InjectionPoint) -> bool {
        self.content.read().records.contains_key(&point.key())
    }

    /// The tracked point with the same key, carrying its original metadata
    pub fn tracked(&self, point: &InjectionPoint) -> Option<InjectionPoint> {
        self.content
            .read()
            .records
            .get(&point.key())
            .map(|record| record.point.clone())
    }

    pub fn state(&self, point: &InjectionPoint) -> Option<LifecycleState> {
        self.content
            .read()
            .records
            .get(&point.key())
            .map(|record| record.state)
    }

    /// Moves a point forward, checked against the lifecycle order
    pub fn advance(
        &self,
        point: &InjectionPoint,
        to: LifecycleState,
    ) -> Result<(), LifecycleError> {
        let mut content = self.content.write();
        let record = content
            .records
            .get_mut(&point.key())
            .ok_or_else(|| LifecycleError::InvalidTransition {
                point: point.clone(),
                from: LifecycleState::Unconfigured,
                to,
            })?;

        if !record.state.can_advance_to(to) {
            return Err(LifecycleError::InvalidTransition {
                point: point.clone(),
                from: record.state,
                to,
            });
        }
        record.state = to;
        Ok(())
    }

    /// Drops every slot of the point and marks it destroyed
    pub(crate) fn retire(&self, point: &InjectionPoint) {
        let mut content = self.content.write();
        let key = point.key();
        for slot in [SlotKind::Configuration, SlotKind::Callable, SlotKind::Enhanced] {
            content.slots.remove(&(key.clone(), slot));
        }
        if let Some(record) = content.records.get_mut(&key) {
            record.state = LifecycleState::Destroyed;
        }
    }

    /// Stops tracking a destroyed point so the key can be prepared again
    pub(crate) fn forget(&self, point: &InjectionPoint) -> bool {
        let mut content = self.content.write();
        let key = point.key();
        match content.records.get(&key).map(|record| record.state) {
            Some(LifecycleState::Destroyed) => {
                content.records.remove(&key);
                content.order.retain(|tracked| *tracked != key);
                content.enhance_locks.remove(&key);
                true
            }
            _ => false,
        }
    }

    /// Remembers a fatal failure, replayed on later requests for the point
    pub fn record_failure(&self, point: &InjectionPoint, failure: LifecycleError) {
        if let Some(record) = self.content.write().records.get_mut(&point.key()) {
            record.failure = Some(failure);
        }
    }

    pub fn failure(&self, point: &InjectionPoint) -> Option<LifecycleError> {
        self.content
            .read()
            .records
            .get(&point.key())
            .and_then(|record| record.failure.clone())
    }

    /// Tracked points in preparation order
    pub fn points(&self) -> Vec<InjectionPoint> {
        let content = self.content.read();
        content
            .order
            .iter()
            .filter_map(|key| content.records.get(key))
            .map(|record| record.point.clone())
            .collect()
    }

    pub fn find(&self, filter: &dyn PointFilter) -> PointSet {
        PointSet::new(self.points()).filter(filter)
    }

    pub fn len(&self) -> usize {
        self.content.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lock serializing the enhancement of one point
    ///
    /// Points are locked independently, so enhancing one point may request another.
    pub(crate) fn enhance_lock(&self, point: &InjectionPoint) -> Arc<Mutex<()>> {
        self.content
            .write()
            .enhance_locks
            .entry(point.key())
            .or_default()
            .clone()
    }
}
