use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

use slabmap::SlabMap;

use super::{effect::EffectScheduler, innermost_running, RawEffect, SignalContext, MAX_MARKER_DEPTH};

/// The set of effects subscribed to one reactive slot.
///
/// `w` and `n` are per-recursion-depth bitmasks ("was tracked" / "newly
/// tracked" at the depth whose bit is set) that let a re-running effect
/// reconcile its dependency set without rebuilding it, up to
/// [`MAX_MARKER_DEPTH`] levels of effect nesting.
pub(crate) struct Dep(Rc<RefCell<DepInner>>);

pub(crate) struct DepInner {
    subs: SlabMap<Weak<RawEffect>>,
    pub(crate) w: u32,
    pub(crate) n: u32,
}

impl Clone for Dep {
    fn clone(&self) -> Self {
        Dep(self.0.clone())
    }
}

impl Dep {
    pub fn new() -> Self {
        Dep(Rc::new(RefCell::new(DepInner {
            subs: SlabMap::new(),
            w: 0,
            n: 0,
        })))
    }

    /// Registers the context's sink (if any) as a subscriber.
    pub fn track(&self, sc: &mut SignalContext) {
        let Some(sink) = &sc.sink else {
            return;
        };
        if !sink.is_active() {
            return;
        }
        let (depth, bit) = super::track_state();
        let key = {
            let mut inner = self.0.borrow_mut();
            let should_track = if depth <= MAX_MARKER_DEPTH {
                if inner.n & bit == 0 {
                    inner.n |= bit;
                    inner.w & bit == 0
                } else {
                    false
                }
            } else {
                // Beyond the marker depth the effect rebuilt from scratch, so
                // membership must be checked directly.
                !inner.contains(sink)
            };
            if should_track {
                Some(inner.subs.insert(Rc::downgrade(sink)))
            } else {
                None
            }
        };
        if let Some(key) = key {
            sink.push_edge(DepEdge {
                dep: self.clone(),
                key,
            });
        }
    }

    /// Notifies all subscribers that this slot changed.
    ///
    /// Computed effects are invoked before plain effects so that a plain
    /// effect reading a computed downstream of the same write observes the
    /// refreshed derivation, never a stale cache.
    pub fn trigger(&self) {
        let subs: Vec<Rc<RawEffect>> = {
            let mut inner = self.0.borrow_mut();
            inner.subs.optimize();
            inner.subs.values().filter_map(Weak::upgrade).collect()
        };
        for effect in subs.iter().filter(|e| e.is_computed()) {
            trigger_effect(effect);
        }
        for effect in subs.iter().filter(|e| !e.is_computed()) {
            trigger_effect(effect);
        }
    }

    /// Whether no live effect is subscribed to this slot.
    pub fn is_unobserved(&self) -> bool {
        self.0.borrow().subs.values().all(|w| w.strong_count() == 0)
    }

    pub(crate) fn remove_sub(&self, key: usize) {
        self.0.borrow_mut().subs.remove(key);
    }

    pub(crate) fn with_inner<T>(&self, f: impl FnOnce(&mut DepInner) -> T) -> T {
        f(&mut self.0.borrow_mut())
    }
}

impl DepInner {
    pub(crate) fn subs_remove(&mut self, key: usize) {
        self.subs.remove(key);
    }

    fn contains(&self, effect: &Rc<RawEffect>) -> bool {
        self.subs
            .values()
            .any(|w| std::ptr::eq(w.as_ptr(), Rc::as_ptr(effect)))
    }
}

fn trigger_effect(effect: &Rc<RawEffect>) {
    if !effect.is_active() {
        return;
    }
    // An effect does not re-trigger itself while running unless it
    // explicitly allows recursion.
    if let Some(running) = innermost_running() {
        if Rc::ptr_eq(&running, effect) && !effect.allow_recurse() {
            return;
        }
    }
    match effect.scheduler() {
        EffectScheduler::Sync => effect.run(),
        EffectScheduler::Queue => crate::scheduler::queue_effect(effect),
        EffectScheduler::PreQueue => crate::scheduler::queue_effect_pre(effect),
        EffectScheduler::PostQueue => crate::scheduler::queue_effect_post(effect),
        EffectScheduler::Custom(f) => f(),
    }
}

/// One subscription edge between an effect and a [`Dep`], remembering the
/// slab key so unsubscribing is O(1).
pub(crate) struct DepEdge {
    pub(crate) dep: Dep,
    pub(crate) key: usize,
}
