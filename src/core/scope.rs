use std::{
    cell::{Cell, RefCell},
    rc::{Rc, Weak},
};

use derive_ex::derive_ex;

use super::RawEffect;

/// A group of effects and cleanup callbacks that are disposed together.
///
/// Effects, computed values and watchers created inside [`run`](Self::run)
/// are owned by the scope; [`stop`](Self::stop) stops all of them, stops
/// every child scope, and runs the registered cleanups exactly once.
#[derive_ex(Clone)]
pub struct EffectScope(Rc<ScopeNode>);

pub(crate) struct ScopeNode {
    active: Cell<bool>,
    effects: RefCell<Vec<Rc<RawEffect>>>,
    cleanups: RefCell<Vec<Box<dyn FnOnce()>>>,
    children: RefCell<Vec<Rc<ScopeNode>>>,
    parent: Weak<ScopeNode>,
    /// Position in the parent's child list, for O(1) swap-removal on stop.
    index: Cell<usize>,
}

/// Creates a new effect scope.
///
/// A non-detached scope becomes a child of the scope currently running (if
/// any) and is stopped with it; a detached scope is only stopped explicitly.
pub fn effect_scope(detached: bool) -> EffectScope {
    let parent = if detached { None } else { super::active_scope() };
    let node = Rc::new(ScopeNode {
        active: Cell::new(true),
        effects: RefCell::new(Vec::new()),
        cleanups: RefCell::new(Vec::new()),
        children: RefCell::new(Vec::new()),
        parent: parent.as_ref().map(Rc::downgrade).unwrap_or_default(),
        index: Cell::new(0),
    });
    if let Some(parent) = parent {
        let mut children = parent.children.borrow_mut();
        node.index.set(children.len());
        children.push(node.clone());
    }
    EffectScope(node)
}

impl EffectScope {
    /// Runs `f` with this scope active, so effects created inside are owned
    /// by it.
    pub fn run<T>(&self, f: impl FnOnce() -> T) -> T {
        if !self.0.active.get() {
            tracing::warn!("cannot run a stopped effect scope");
            return f();
        }
        struct Restore(Option<Rc<ScopeNode>>);
        impl Drop for Restore {
            fn drop(&mut self) {
                super::set_active_scope(self.0.take());
            }
        }
        let _restore = Restore(super::set_active_scope(Some(self.0.clone())));
        f()
    }

    pub fn is_active(&self) -> bool {
        self.0.active.get()
    }

    /// Stops every owned effect and child scope and runs all cleanups.
    /// Re-stopping is a no-op.
    pub fn stop(&self) {
        self.0.stop();
    }
}

impl ScopeNode {
    pub(crate) fn add_effect(&self, effect: &Rc<RawEffect>) {
        if self.active.get() {
            self.effects.borrow_mut().push(effect.clone());
        }
    }

    pub(crate) fn stop(&self) {
        if !self.active.replace(false) {
            return;
        }
        for effect in self.effects.take() {
            effect.stop();
        }
        for child in self.children.take() {
            child.stop();
        }
        for cleanup in self.cleanups.take() {
            cleanup();
        }
        // Detach from the parent so it does not keep the node alive. The
        // parent's list may already be empty if the stop came from it.
        if let Some(parent) = self.parent.upgrade() {
            let mut children = parent.children.borrow_mut();
            let i = self.index.get();
            if i < children.len() && std::ptr::eq(Rc::as_ptr(&children[i]), self) {
                children.swap_remove(i);
                if i < children.len() {
                    children[i].index.set(i);
                }
            }
        }
    }
}

/// Registers `effect` with the currently active scope, if one is running.
pub(crate) fn record_effect(effect: &Rc<RawEffect>) {
    if let Some(scope) = super::active_scope() {
        scope.add_effect(effect);
    }
}

/// Registers a cleanup callback on the currently active scope.
///
/// Warns and discards the callback when no scope is active.
pub fn on_scope_dispose(f: impl FnOnce() + 'static) {
    if let Some(scope) = super::active_scope() {
        if scope.active.get() {
            scope.cleanups.borrow_mut().push(Box::new(f));
            return;
        }
    }
    tracing::warn!("on_scope_dispose called without an active effect scope");
}
