use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use derive_ex::derive_ex;

use crate::core::{next_id, Dep, EffectScheduler, RawEffect, SignalContext};


/// A lazily evaluated, cached derived value.
///
/// The getter runs only when the value is read while dirty. When an upstream
/// dependency changes, the backing effect's scheduler marks the cache dirty
/// and notifies this computed's own subscribers without recomputing;
/// recomputation is deferred to the next read, which keeps diamond-shaped
/// dependency graphs from evaluating the getter more than once per change.
#[derive_ex(Clone, bound())]
pub struct Computed<T: 'static>(Rc<ComputedNode<T>>);

struct ComputedNode<T: 'static> {
    value: RefCell<Option<T>>,
    dirty: Cell<bool>,
    dep: Dep,
    effect: RefCell<Option<Rc<RawEffect>>>,
    setter: Option<Box<dyn Fn(T)>>,
}

/// Creates a read-only computed from a getter.
pub fn computed<T: 'static>(getter: impl FnMut(&mut SignalContext) -> T + 'static) -> Computed<T> {
    Computed::new(getter)
}

impl<T: 'static> Computed<T> {
    pub fn new(getter: impl FnMut(&mut SignalContext) -> T + 'static) -> Self {
        Self::build(getter, None)
    }

    /// Creates a writable computed; writes are delegated to `setter`, which
    /// is expected to update the upstream sources the getter reads.
    pub fn with_setter(
        getter: impl FnMut(&mut SignalContext) -> T + 'static,
        setter: impl Fn(T) + 'static,
    ) -> Self {
        Self::build(getter, Some(Box::new(setter)))
    }

    fn build(
        mut getter: impl FnMut(&mut SignalContext) -> T + 'static,
        setter: Option<Box<dyn Fn(T)>>,
    ) -> Self {
        let node = Rc::new(ComputedNode {
            value: RefCell::new(None),
            dirty: Cell::new(true),
            dep: Dep::new(),
            effect: RefCell::new(None),
            setter,
        });
        let body = {
            let node = Rc::downgrade(&node);
            move |sc: &mut SignalContext| {
                if let Some(node) = node.upgrade() {
                    let value = getter(sc);
                    *node.value.borrow_mut() = Some(value);
                }
            }
        };
        let scheduler = {
            let node = Rc::downgrade(&node);
            EffectScheduler::Custom(Box::new(move || {
                if let Some(node) = node.upgrade() {
                    // Mark stale and propagate; the recompute itself waits
                    // for the next read.
                    if !node.dirty.replace(true) {
                        node.dep.trigger();
                    }
                }
            }))
        };
        let effect = RawEffect::new(next_id(), Box::new(body), scheduler, true);
        *node.effect.borrow_mut() = Some(effect);
        Computed(node)
    }

    fn refresh(&self) {
        if !self.0.dirty.get() {
            return;
        }
        let effect = self.0.effect.borrow().clone();
        if let Some(effect) = effect {
            effect.run();
        }
        if self.0.value.borrow().is_none() {
            panic!("detect cyclic dependency");
        }
        self.0.dirty.set(false);
    }

    /// Borrows the cached value, recomputing first if dirty, and adds a
    /// dependency on this computed.
    pub fn borrow<'a>(&'a self, sc: &mut SignalContext) -> std::cell::Ref<'a, T> {
        self.0.dep.track(sc);
        self.refresh();
        std::cell::Ref::map(self.0.value.borrow(), |v| match v {
            Some(v) => v,
            None => unreachable!(),
        })
    }

    pub fn get(&self, sc: &mut SignalContext) -> T
    where
        T: Clone,
    {
        self.borrow(sc).clone()
    }

    /// Gets the current value (recomputing if dirty) without registering a
    /// dependency.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.refresh();
        match &*self.0.value.borrow() {
            Some(v) => v.clone(),
            None => unreachable!(),
        }
    }

    /// Writes through the setter; a getter-only computed ignores the write.
    pub fn set(&self, value: T) {
        match &self.0.setter {
            Some(setter) => setter(value),
            None => {
                tracing::warn!("write to a computed without a setter was ignored");
            }
        }
    }
}

impl<T: 'static> Drop for ComputedNode<T> {
    fn drop(&mut self) {
        if let Some(effect) = self.effect.get_mut().take() {
            effect.stop();
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.value.try_borrow() {
            Ok(value) => match &*value {
                Some(value) => value.fmt(f),
                None => write!(f, "<uninit>"),
            },
            Err(_) => write!(f, "<borrowed>"),
        }
    }
}
