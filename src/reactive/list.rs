use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    rc::Rc,
};

use derive_ex::derive_ex;
use serde::{Deserialize, Serialize};

use super::TriggerOp;
use crate::{
    cell::HasChanged,
    core::{Dep, SignalContext},
};


struct ListNode<T> {
    items: RefCell<Vec<T>>,
    /// Deps are created lazily per read index, including out-of-bounds reads
    /// so a later growth re-runs the reader.
    index_deps: RefCell<HashMap<usize, Dep>>,
    len_dep: Dep,
    iter_dep: Dep,
    version: Cell<u64>,
}

/// A reactive vector.
///
/// Indexed reads track per index; `len` tracks the length dependency;
/// membership and whole-list reads track the iteration dependency, since
/// their result can be changed by any slot.
#[derive_ex(Clone, bound())]
pub struct ReactiveList<T: 'static>(Rc<ListNode<T>>);

/// Read-only view sharing a [`ReactiveList`]'s node.
#[derive_ex(Clone, bound())]
pub struct ReadonlyList<T: 'static>(Rc<ListNode<T>>);

impl<T> ListNode<T> {
    fn track_index(&self, sc: &mut SignalContext, index: usize) {
        self.index_deps
            .borrow_mut()
            .entry(index)
            .or_insert_with(Dep::new)
            .track(sc);
    }

    /// `from` is the first index whose content the mutation may have moved;
    /// every index dep at or beyond it is invalidated.
    fn trigger(&self, op: TriggerOp, from: usize) {
        self.version.set(self.version.get() + 1);
        let deps: Vec<Dep> = self
            .index_deps
            .borrow()
            .iter()
            .filter(|(i, _)| **i >= from)
            .map(|(_, dep)| dep.clone())
            .collect();
        for dep in deps {
            dep.trigger();
        }
        self.iter_dep.trigger();
        if op != TriggerOp::Set {
            self.len_dep.trigger();
        }
        // Per-index deps are created lazily on read; drop the ones every
        // subscriber has since left so the table does not grow forever.
        self.index_deps
            .borrow_mut()
            .retain(|_, dep| !dep.is_unobserved());
    }
}

impl<T: 'static> ReactiveList<T> {
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn from_vec(items: Vec<T>) -> Self {
        Self(Rc::new(ListNode {
            items: RefCell::new(items),
            index_deps: RefCell::new(HashMap::new()),
            len_dep: Dep::new(),
            iter_dep: Dep::new(),
            version: Cell::new(0),
        }))
    }

    pub fn get<'a>(&'a self, sc: &mut SignalContext, index: usize) -> Option<std::cell::Ref<'a, T>> {
        self.0.track_index(sc, index);
        std::cell::Ref::filter_map(self.0.items.borrow(), |v| v.get(index)).ok()
    }

    pub fn get_cloned(&self, sc: &mut SignalContext, index: usize) -> Option<T>
    where
        T: Clone,
    {
        self.get(sc, index).map(|v| v.clone())
    }

    pub fn len(&self, sc: &mut SignalContext) -> usize {
        self.0.len_dep.track(sc);
        self.0.items.borrow().len()
    }

    pub fn is_empty(&self, sc: &mut SignalContext) -> bool {
        self.len(sc) == 0
    }

    /// Reads the whole list under the iteration dependency.
    pub fn with<R>(&self, sc: &mut SignalContext, f: impl FnOnce(&[T]) -> R) -> R {
        self.0.iter_dep.track(sc);
        f(&self.0.items.borrow())
    }

    pub fn to_vec(&self, sc: &mut SignalContext) -> Vec<T>
    where
        T: Clone,
    {
        self.with(sc, |items| items.to_vec())
    }

    pub fn contains(&self, sc: &mut SignalContext, value: &T) -> bool
    where
        T: PartialEq,
    {
        self.with(sc, |items| items.contains(value))
    }

    pub fn position(&self, sc: &mut SignalContext, pred: impl FnMut(&T) -> bool) -> Option<usize> {
        self.with(sc, |items| items.iter().position(pred))
    }

    pub fn version(&self, sc: &mut SignalContext) -> u64 {
        self.0.iter_dep.track(sc);
        self.0.version.get()
    }

    /// Replaces the element at `index`, returning the old value. Subscribers
    /// are notified only when the value changed.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn set(&self, index: usize, value: T) -> T
    where
        T: HasChanged,
    {
        let (old, changed) = {
            let mut items = self.0.items.borrow_mut();
            let slot = &mut items[index];
            let old = std::mem::replace(slot, value);
            let changed = slot.has_changed(&old);
            (old, changed)
        };
        if changed {
            self.0.trigger(TriggerOp::Set, index);
        }
        old
    }

    pub fn push(&self, value: T) {
        let index = {
            let mut items = self.0.items.borrow_mut();
            items.push(value);
            items.len() - 1
        };
        self.0.trigger(TriggerOp::Add, index);
    }

    pub fn pop(&self) -> Option<T> {
        let (value, index) = {
            let mut items = self.0.items.borrow_mut();
            let value = items.pop();
            (value, items.len())
        };
        if value.is_some() {
            self.0.trigger(TriggerOp::Delete, index);
        }
        value
    }

    /// # Panics
    ///
    /// Panics if `index > len`.
    pub fn insert(&self, index: usize, value: T) {
        self.0.items.borrow_mut().insert(index, value);
        self.0.trigger(TriggerOp::Add, index);
    }

    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn remove(&self, index: usize) -> T {
        let value = self.0.items.borrow_mut().remove(index);
        self.0.trigger(TriggerOp::Delete, index);
        value
    }

    pub fn clear(&self) {
        let was_empty = {
            let mut items = self.0.items.borrow_mut();
            let was_empty = items.is_empty();
            items.clear();
            was_empty
        };
        if !was_empty {
            self.0.trigger(TriggerOp::Clear, 0);
        }
    }

    pub fn read_only(&self) -> ReadonlyList<T> {
        ReadonlyList(self.0.clone())
    }
}

impl<T: 'static> ReadonlyList<T> {
    pub fn get<'a>(&'a self, sc: &mut SignalContext, index: usize) -> Option<std::cell::Ref<'a, T>> {
        self.0.track_index(sc, index);
        std::cell::Ref::filter_map(self.0.items.borrow(), |v| v.get(index)).ok()
    }
    pub fn get_cloned(&self, sc: &mut SignalContext, index: usize) -> Option<T>
    where
        T: Clone,
    {
        self.get(sc, index).map(|v| v.clone())
    }
    pub fn len(&self, sc: &mut SignalContext) -> usize {
        self.0.len_dep.track(sc);
        self.0.items.borrow().len()
    }
    pub fn is_empty(&self, sc: &mut SignalContext) -> bool {
        self.len(sc) == 0
    }
    pub fn with<R>(&self, sc: &mut SignalContext, f: impl FnOnce(&[T]) -> R) -> R {
        self.0.iter_dep.track(sc);
        f(&self.0.items.borrow())
    }
    pub fn to_vec(&self, sc: &mut SignalContext) -> Vec<T>
    where
        T: Clone,
    {
        self.with(sc, |items| items.to_vec())
    }
    pub fn version(&self, sc: &mut SignalContext) -> u64 {
        self.0.iter_dep.track(sc);
        self.0.version.get()
    }
    pub fn is_same(&self, other: &ReadonlyList<T>) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: 'static> Default for ReactiveList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ReactiveList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.items.try_borrow() {
            Ok(items) => std::fmt::Debug::fmt(&*items, f),
            Err(_) => write!(f, "<borrowed>"),
        }
    }
}

impl<T: Serialize + 'static> Serialize for ReactiveList<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0.items.try_borrow() {
            Ok(items) => items.serialize(serializer),
            Err(_) => Err(serde::ser::Error::custom("list is mutably borrowed")),
        }
    }
}

impl<'de, T: Deserialize<'de> + 'static> Deserialize<'de> for ReactiveList<T> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_vec(Vec::deserialize(deserializer)?))
    }
}
