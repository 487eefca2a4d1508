use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    hash::Hash,
    rc::Rc,
};

use derive_ex::derive_ex;
use serde::{Deserialize, Serialize};

use super::TriggerOp;
use crate::{
    cell::HasChanged,
    core::{Dep, SignalContext},
};

#[cfg(test)]
mod tests;

struct MapNode<K, V> {
    entries: RefCell<HashMap<K, V>>,
    key_deps: RefCell<HashMap<K, Dep>>,
    iter_dep: Dep,
    /// Invalidated only when the key set changes; `keys()` readers are not
    /// re-run by value-only writes.
    keys_dep: Dep,
    version: Cell<u64>,
}

/// A reactive hash map.
///
/// Reads track at key granularity where possible; whole-map reads track the
/// iteration dependency. Writes invalidate per [`TriggerOp`].
#[derive_ex(Clone, bound())]
pub struct ReactiveMap<K: 'static, V: 'static>(Rc<MapNode<K, V>>);

/// Read-only view sharing a [`ReactiveMap`]'s node.
#[derive_ex(Clone, bound())]
pub struct ReadonlyMap<K: 'static, V: 'static>(Rc<MapNode<K, V>>);

impl<K, V> MapNode<K, V>
where
    K: Hash + Eq + Clone + 'static,
{
    fn track_key(&self, sc: &mut SignalContext, key: &K) {
        self.key_deps
            .borrow_mut()
            .entry(key.clone())
            .or_insert_with(Dep::new)
            .track(sc);
    }

    /// Deps are cloned out before triggering; a triggered effect may re-enter
    /// this map.
    fn trigger(&self, op: TriggerOp, key: Option<&K>) {
        self.version.set(self.version.get() + 1);
        let key_dep = key.and_then(|key| self.key_deps.borrow().get(key).cloned());
        let all_key_deps = if op == TriggerOp::Clear {
            self.key_deps.borrow().values().cloned().collect()
        } else {
            Vec::new()
        };
        if let Some(dep) = key_dep {
            dep.trigger();
        }
        for dep in all_key_deps {
            dep.trigger();
        }
        self.iter_dep.trigger();
        if matches!(op, TriggerOp::Add | TriggerOp::Delete | TriggerOp::Clear) {
            self.keys_dep.trigger();
        }
        // Per-key deps are created lazily on read; drop the ones every
        // subscriber has since left so the table does not grow forever.
        self.key_deps
            .borrow_mut()
            .retain(|_, dep| !dep.is_unobserved());
    }
}

impl<K, V> ReactiveMap<K, V>
where
    K: Hash + Eq + Clone + 'static,
    V: 'static,
{
    pub fn new() -> Self {
        Self::from_map(HashMap::new())
    }

    pub fn from_map(entries: HashMap<K, V>) -> Self {
        Self(Rc::new(MapNode {
            entries: RefCell::new(entries),
            key_deps: RefCell::new(HashMap::new()),
            iter_dep: Dep::new(),
            keys_dep: Dep::new(),
            version: Cell::new(0),
        }))
    }

    pub fn get<'a>(&'a self, sc: &mut SignalContext, key: &K) -> Option<std::cell::Ref<'a, V>> {
        self.0.track_key(sc, key);
        std::cell::Ref::filter_map(self.0.entries.borrow(), |m| m.get(key)).ok()
    }

    pub fn get_cloned(&self, sc: &mut SignalContext, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.get(sc, key).map(|v| v.clone())
    }

    pub fn contains_key(&self, sc: &mut SignalContext, key: &K) -> bool {
        self.0.track_key(sc, key);
        self.0.entries.borrow().contains_key(key)
    }

    pub fn len(&self, sc: &mut SignalContext) -> usize {
        self.0.iter_dep.track(sc);
        self.0.entries.borrow().len()
    }

    pub fn is_empty(&self, sc: &mut SignalContext) -> bool {
        self.len(sc) == 0
    }

    pub fn keys(&self, sc: &mut SignalContext) -> Vec<K> {
        self.0.keys_dep.track(sc);
        self.0.entries.borrow().keys().cloned().collect()
    }

    pub fn values(&self, sc: &mut SignalContext) -> Vec<V>
    where
        V: Clone,
    {
        self.0.iter_dep.track(sc);
        self.0.entries.borrow().values().cloned().collect()
    }

    /// Reads the whole map under the iteration dependency.
    pub fn with<R>(&self, sc: &mut SignalContext, f: impl FnOnce(&HashMap<K, V>) -> R) -> R {
        self.0.iter_dep.track(sc);
        f(&self.0.entries.borrow())
    }

    pub fn entries(&self, sc: &mut SignalContext) -> Vec<(K, V)>
    where
        V: Clone,
    {
        self.with(sc, |m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    /// Monotonic counter bumped by every effective write, tracked through
    /// the iteration dependency.
    pub fn version(&self, sc: &mut SignalContext) -> u64 {
        self.0.iter_dep.track(sc);
        self.0.version.get()
    }

    pub fn insert(&self, key: K, value: V) -> Option<V>
    where
        V: HasChanged,
    {
        let (old, op) = {
            let mut entries = self.0.entries.borrow_mut();
            match entries.insert(key.clone(), value) {
                None => (None, Some(TriggerOp::Add)),
                Some(old) => {
                    let changed = entries[&key].has_changed(&old);
                    (Some(old), changed.then_some(TriggerOp::Set))
                }
            }
        };
        if let Some(op) = op {
            self.0.trigger(op, Some(&key));
        }
        old
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let old = self.0.entries.borrow_mut().remove(key);
        if old.is_some() {
            self.0.trigger(TriggerOp::Delete, Some(key));
        }
        old
    }

    pub fn clear(&self) {
        let was_empty = {
            let mut entries = self.0.entries.borrow_mut();
            let was_empty = entries.is_empty();
            entries.clear();
            was_empty
        };
        if !was_empty {
            self.0.trigger(TriggerOp::Clear, None);
        }
    }

    pub fn read_only(&self) -> ReadonlyMap<K, V> {
        ReadonlyMap(self.0.clone())
    }
}

impl<K, V> ReadonlyMap<K, V>
where
    K: Hash + Eq + Clone + 'static,
    V: 'static,
{
    pub fn get<'a>(&'a self, sc: &mut SignalContext, key: &K) -> Option<std::cell::Ref<'a, V>> {
        self.0.track_key(sc, key);
        std::cell::Ref::filter_map(self.0.entries.borrow(), |m| m.get(key)).ok()
    }
    pub fn get_cloned(&self, sc: &mut SignalContext, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.get(sc, key).map(|v| v.clone())
    }
    pub fn contains_key(&self, sc: &mut SignalContext, key: &K) -> bool {
        self.0.track_key(sc, key);
        self.0.entries.borrow().contains_key(key)
    }
    pub fn len(&self, sc: &mut SignalContext) -> usize {
        self.0.iter_dep.track(sc);
        self.0.entries.borrow().len()
    }
    pub fn is_empty(&self, sc: &mut SignalContext) -> bool {
        self.len(sc) == 0
    }
    pub fn keys(&self, sc: &mut SignalContext) -> Vec<K> {
        self.0.keys_dep.track(sc);
        self.0.entries.borrow().keys().cloned().collect()
    }
    pub fn with<R>(&self, sc: &mut SignalContext, f: impl FnOnce(&HashMap<K, V>) -> R) -> R {
        self.0.iter_dep.track(sc);
        f(&self.0.entries.borrow())
    }
    pub fn version(&self, sc: &mut SignalContext) -> u64 {
        self.0.iter_dep.track(sc);
        self.0.version.get()
    }
    /// Whether two views share the same underlying map.
    pub fn is_same(&self, other: &ReadonlyMap<K, V>) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<K, V> Default for ReactiveMap<K, V>
where
    K: Hash + Eq + Clone + 'static,
    V: 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> std::fmt::Debug for ReactiveMap<K, V>
where
    K: std::fmt::Debug,
    V: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.entries.try_borrow() {
            Ok(entries) => std::fmt::Debug::fmt(&*entries, f),
            Err(_) => write!(f, "<borrowed>"),
        }
    }
}

impl<K, V> Serialize for ReactiveMap<K, V>
where
    K: Hash + Eq + Clone + Serialize + 'static,
    V: Serialize + 'static,
{
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0.entries.try_borrow() {
            Ok(entries) => entries.serialize(serializer),
            Err(_) => Err(serde::ser::Error::custom("map is mutably borrowed")),
        }
    }
}

impl<'de, K, V> Deserialize<'de> for ReactiveMap<K, V>
where
    K: Hash + Eq + Clone + Deserialize<'de> + 'static,
    V: Deserialize<'de> + 'static,
{
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_map(HashMap::deserialize(deserializer)?))
    }
}
