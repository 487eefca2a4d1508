use std::{
    cell::{Cell, RefCell},
    collections::{HashMap, HashSet},
    hash::Hash,
    rc::Rc,
};

use derive_ex::derive_ex;
use serde::{Deserialize, Serialize};

use super::TriggerOp;
use crate::core::{Dep, SignalContext};


struct SetNode<T> {
    items: RefCell<HashSet<T>>,
    value_deps: RefCell<HashMap<T, Dep>>,
    iter_dep: Dep,
    version: Cell<u64>,
}

/// A reactive hash set. `contains` tracks per value; size and iteration
/// reads track the iteration dependency.
#[derive_ex(Clone, bound())]
pub struct ReactiveSet<T: 'static>(Rc<SetNode<T>>);

/// Read-only view sharing a [`ReactiveSet`]'s node.
#[derive_ex(Clone, bound())]
pub struct ReadonlySet<T: 'static>(Rc<SetNode<T>>);

impl<T> SetNode<T>
where
    T: Hash + Eq + Clone + 'static,
{
    fn track_value(&self, sc: &mut SignalContext, value: &T) {
        self.value_deps
            .borrow_mut()
            .entry(value.clone())
            .or_insert_with(Dep::new)
            .track(sc);
    }

    fn trigger(&self, op: TriggerOp, value: Option<&T>) {
        self.version.set(self.version.get() + 1);
        let value_dep = value.and_then(|v| self.value_deps.borrow().get(v).cloned());
        let all_value_deps: Vec<Dep> = if op == TriggerOp::Clear {
            self.value_deps.borrow().values().cloned().collect()
        } else {
            Vec::new()
        };
        if let Some(dep) = value_dep {
            dep.trigger();
        }
        for dep in all_value_deps {
            dep.trigger();
        }
        self.iter_dep.trigger();
        // Per-value deps are created lazily on read; drop the ones every
        // subscriber has since left so the table does not grow forever.
        self.value_deps
            .borrow_mut()
            .retain(|_, dep| !dep.is_unobserved());
    }
}

impl<T> ReactiveSet<T>
where
    T: Hash + Eq + Clone + 'static,
{
    pub fn new() -> Self {
        Self::from_set(HashSet::new())
    }

    pub fn from_set(items: HashSet<T>) -> Self {
        Self(Rc::new(SetNode {
            items: RefCell::new(items),
            value_deps: RefCell::new(HashMap::new()),
            iter_dep: Dep::new(),
            version: Cell::new(0),
        }))
    }

    pub fn contains(&self, sc: &mut SignalContext, value: &T) -> bool {
        self.0.track_value(sc, value);
        self.0.items.borrow().contains(value)
    }

    pub fn len(&self, sc: &mut SignalContext) -> usize {
        self.0.iter_dep.track(sc);
        self.0.items.borrow().len()
    }

    pub fn is_empty(&self, sc: &mut SignalContext) -> bool {
        self.len(sc) == 0
    }

    pub fn with<R>(&self, sc: &mut SignalContext, f: impl FnOnce(&HashSet<T>) -> R) -> R {
        self.0.iter_dep.track(sc);
        f(&self.0.items.borrow())
    }

    pub fn to_vec(&self, sc: &mut SignalContext) -> Vec<T> {
        self.with(sc, |items| items.iter().cloned().collect())
    }

    pub fn version(&self, sc: &mut SignalContext) -> u64 {
        self.0.iter_dep.track(sc);
        self.0.version.get()
    }

    /// Returns whether the value was newly inserted.
    pub fn insert(&self, value: T) -> bool {
        let inserted = self.0.items.borrow_mut().insert(value.clone());
        if inserted {
            self.0.trigger(TriggerOp::Add, Some(&value));
        }
        inserted
    }

    pub fn remove(&self, value: &T) -> bool {
        let removed = self.0.items.borrow_mut().remove(value);
        if removed {
            self.0.trigger(TriggerOp::Delete, Some(value));
        }
        removed
    }

    pub fn clear(&self) {
        let was_empty = {
            let mut items = self.0.items.borrow_mut();
            let was_empty = items.is_empty();
            items.clear();
            was_empty
        };
        if !was_empty {
            self.0.trigger(TriggerOp::Clear, None);
        }
    }

    pub fn read_only(&self) -> ReadonlySet<T> {
        ReadonlySet(self.0.clone())
    }
}

impl<T> ReadonlySet<T>
where
    T: Hash + Eq + Clone + 'static,
{
    pub fn contains(&self, sc: &mut SignalContext, value: &T) -> bool {
        self.0.track_value(sc, value);
        self.0.items.borrow().contains(value)
    }
    pub fn len(&self, sc: &mut SignalContext) -> usize {
        self.0.iter_dep.track(sc);
        self.0.items.borrow().len()
    }
    pub fn is_empty(&self, sc: &mut SignalContext) -> bool {
        self.len(sc) == 0
    }
    pub fn with<R>(&self, sc: &mut SignalContext, f: impl FnOnce(&HashSet<T>) -> R) -> R {
        self.0.iter_dep.track(sc);
        f(&self.0.items.borrow())
    }
    pub fn version(&self, sc: &mut SignalContext) -> u64 {
        self.0.iter_dep.track(sc);
        self.0.version.get()
    }
    pub fn is_same(&self, other: &ReadonlySet<T>) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> Default for ReactiveSet<T>
where
    T: Hash + Eq + Clone + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ReactiveSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.items.try_borrow() {
            Ok(items) => std::fmt::Debug::fmt(&*items, f),
            Err(_) => write!(f, "<borrowed>"),
        }
    }
}

impl<T> Serialize for ReactiveSet<T>
where
    T: Hash + Eq + Serialize + 'static,
{
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0.items.try_borrow() {
            Ok(items) => items.serialize(serializer),
            Err(_) => Err(serde::ser::Error::custom("set is mutably borrowed")),
        }
    }
}

impl<'de, T> Deserialize<'de> for ReactiveSet<T>
where
    T: Hash + Eq + Clone + Deserialize<'de> + 'static,
{
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_set(HashSet::deserialize(deserializer)?))
    }
}
