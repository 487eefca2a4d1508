use std::{cell::RefCell, future::poll_fn, mem::replace, rc::Rc, task::Poll};

use derive_ex::derive_ex;

mod dep;
mod effect;
mod scope;

pub(crate) use dep::Dep;
pub(crate) use effect::{EffectScheduler, RawEffect};
pub use effect::{effect, effect_sync};
pub(crate) use scope::ScopeNode;
pub use scope::{effect_scope, on_scope_dispose, EffectScope};

#[cfg(test)]
mod tests;

use crate::scheduler;

thread_local! {
    static GLOBALS: RefCell<Globals> = RefCell::new(Globals::new());
}

/// Nesting depth up to which per-depth dependency bitmask markers are used.
///
/// Effects nested deeper than this fall back to a full unsubscribe-and-rebuild
/// of their dependency set on every run.
pub(crate) const MAX_MARKER_DEPTH: u32 = 30;

pub(crate) struct Globals {
    is_runtime_exists: bool,
    /// Stack of effects currently executing on this thread, outermost first.
    running: Vec<Rc<RawEffect>>,
    depth: u32,
    track_op_bit: u32,
    active_scope: Option<Rc<ScopeNode>>,
    next_id: u32,
}

impl Globals {
    fn new() -> Self {
        Self {
            is_runtime_exists: false,
            running: Vec::new(),
            depth: 0,
            track_op_bit: 1,
            active_scope: None,
            next_id: 1,
        }
    }
    pub(crate) fn with<T>(f: impl FnOnce(&mut Self) -> T) -> T {
        GLOBALS.with(|g| f(&mut g.borrow_mut()))
    }
}

/// Allocates the next registration id.
///
/// Effects and component instances share one monotonic counter so that
/// scheduler jobs sorted by id run parents before children.
pub(crate) fn next_id() -> u32 {
    Globals::with(|g| {
        let id = g.next_id;
        g.next_id += 1;
        id
    })
}

pub(crate) fn track_state() -> (u32, u32) {
    Globals::with(|g| (g.depth, g.track_op_bit))
}

pub(crate) fn is_running(effect: &Rc<RawEffect>) -> bool {
    Globals::with(|g| g.running.iter().any(|e| Rc::ptr_eq(e, effect)))
}

pub(crate) fn innermost_running() -> Option<Rc<RawEffect>> {
    Globals::with(|g| g.running.last().cloned())
}

/// Pushes `effect` onto the running stack and enters the next marker depth.
/// Returns the new depth.
pub(crate) fn enter_run(effect: &Rc<RawEffect>) -> u32 {
    Globals::with(|g| {
        g.running.push(effect.clone());
        g.depth += 1;
        g.track_op_bit = if g.depth <= MAX_MARKER_DEPTH {
            1 << g.depth
        } else {
            0
        };
        g.depth
    })
}

pub(crate) fn exit_run() {
    Globals::with(|g| {
        g.running.pop();
        g.depth -= 1;
        g.track_op_bit = if g.depth <= MAX_MARKER_DEPTH {
            1 << g.depth
        } else {
            0
        };
    })
}

pub(crate) fn active_scope() -> Option<Rc<ScopeNode>> {
    Globals::with(|g| g.active_scope.clone())
}

pub(crate) fn set_active_scope(scope: Option<Rc<ScopeNode>>) -> Option<Rc<ScopeNode>> {
    Globals::with(|g| replace(&mut g.active_scope, scope))
}

pub(crate) fn assert_runtime_exists() {
    Globals::with(|g| {
        if !g.is_runtime_exists {
            panic!("`Runtime` is not created.");
        }
    })
}

/// Context for retrieving reactive state and tracking dependencies.
///
/// Every tracked read takes `&mut SignalContext`; the context carries the
/// effect (if any) that dependencies are recorded against.
pub struct SignalContext {
    pub(crate) sink: Option<Rc<RawEffect>>,
}

impl SignalContext {
    pub(crate) fn with_sink(sink: Rc<RawEffect>) -> Self {
        Self { sink: Some(sink) }
    }
    pub(crate) fn detached() -> Self {
        Self { sink: None }
    }

    /// Call a function with a [`SignalContext`] that does not track dependencies.
    pub fn untrack<T>(&mut self, f: impl FnOnce(&mut SignalContext) -> T) -> T {
        struct UntrackGuard<'a> {
            sc: &'a mut SignalContext,
            sink: Option<Rc<RawEffect>>,
        }
        impl Drop for UntrackGuard<'_> {
            fn drop(&mut self) {
                self.sc.sink = self.sink.take();
            }
        }
        f(UntrackGuard {
            sink: self.sink.take(),
            sc: self,
        }
        .sc)
    }
}

/// Reactive runtime.
///
/// Owns the flush loop: state writes schedule work into thread-local queues,
/// and [`update`](Runtime::update) drains them. Only one `Runtime` can exist
/// per thread at a time.
#[derive_ex(Default)]
#[default(Self::new())]
pub struct Runtime {
    _not_send: std::marker::PhantomData<*mut ()>,
}

impl Runtime {
    pub fn new() -> Self {
        if Globals::with(|g| replace(&mut g.is_runtime_exists, true)) {
            panic!("Only one `Runtime` can exist in the same thread at the same time.");
        }
        Self {
            _not_send: std::marker::PhantomData,
        }
    }

    /// Returns a [`SignalContext`] that does not track dependencies, for
    /// reads performed outside any effect.
    pub fn sc(&mut self) -> SignalContext {
        SignalContext::detached()
    }

    /// Run flush passes until no scheduled work remains.
    ///
    /// One pass drains the pre-flush callbacks, the main job queue in
    /// ascending id order, the post-flush callbacks, and the `next_tick`
    /// callbacks. Work scheduled by a pass is handled by the next pass,
    /// synchronously, before this method returns.
    pub fn update(&mut self) {
        while scheduler::has_pending_work() {
            scheduler::flush_pass();
        }
    }

    /// Wait until there is work for [`update`](Self::update) to do.
    pub async fn wait_for_ready(&mut self) {
        poll_fn(|cx| {
            if scheduler::has_pending_work() {
                Poll::Ready(())
            } else {
                scheduler::register_waker(cx.waker());
                // Re-check to close the race with a wake between the first
                // check and waker registration.
                if scheduler::has_pending_work() {
                    Poll::Ready(())
                } else {
                    Poll::Pending
                }
            }
        })
        .await
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        Globals::with(|g| g.is_runtime_exists = false);
    }
}
