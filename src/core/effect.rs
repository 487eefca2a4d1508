use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use super::{dep::DepEdge, SignalContext, MAX_MARKER_DEPTH};
use crate::Subscription;

/// Scheduling policy invoked when one of an effect's dependencies changes.
pub(crate) enum EffectScheduler {
    /// Re-run synchronously at the trigger site.
    Sync,
    /// Enqueue into the main job queue, deduplicated per flush.
    Queue,
    /// Enqueue into the pre-flush callback queue.
    PreQueue,
    /// Enqueue into the post-flush callback queue.
    PostQueue,
    /// Arbitrary notification; used by computed values and watchers.
    Custom(Box<dyn Fn()>),
}

/// A function whose reactive reads are tracked so it can be re-run when any
/// of them changes.
pub(crate) struct RawEffect {
    id: u32,
    body: RefCell<Box<dyn FnMut(&mut SignalContext)>>,
    scheduler: EffectScheduler,
    is_computed: bool,
    active: Cell<bool>,
    allow_recurse: Cell<bool>,
    edges: RefCell<Vec<DepEdge>>,
    on_stop: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl RawEffect {
    pub fn new(
        id: u32,
        body: Box<dyn FnMut(&mut SignalContext)>,
        scheduler: EffectScheduler,
        is_computed: bool,
    ) -> Rc<Self> {
        let effect = Rc::new(Self {
            id,
            body: RefCell::new(body),
            scheduler,
            is_computed,
            active: Cell::new(true),
            allow_recurse: Cell::new(false),
            edges: RefCell::new(Vec::new()),
            on_stop: RefCell::new(None),
        });
        super::scope::record_effect(&effect);
        effect
    }

    pub fn id(&self) -> u32 {
        self.id
    }
    pub fn is_active(&self) -> bool {
        self.active.get()
    }
    pub fn is_computed(&self) -> bool {
        self.is_computed
    }
    pub fn allow_recurse(&self) -> bool {
        self.allow_recurse.get()
    }
    pub fn set_allow_recurse(&self, value: bool) {
        self.allow_recurse.set(value);
    }
    pub fn scheduler(&self) -> &EffectScheduler {
        &self.scheduler
    }
    pub fn set_on_stop(&self, f: impl FnOnce() + 'static) {
        *self.on_stop.borrow_mut() = Some(Box::new(f));
    }

    pub(crate) fn push_edge(&self, edge: DepEdge) {
        self.edges.borrow_mut().push(edge);
    }

    /// Runs the body, recording every tracked read as a dependency and
    /// dropping dependencies the run no longer read.
    pub fn run(self: &Rc<Self>) {
        if !self.active.get() {
            // A stopped effect can still be invoked manually; it runs
            // without tracking.
            let mut sc = SignalContext::detached();
            (self.body.borrow_mut().as_mut())(&mut sc);
            return;
        }
        if super::is_running(self) {
            return;
        }

        struct RunGuard<'a> {
            effect: &'a Rc<RawEffect>,
            depth: u32,
        }
        impl Drop for RunGuard<'_> {
            fn drop(&mut self) {
                if self.depth <= MAX_MARKER_DEPTH {
                    self.effect.finalize_markers();
                }
                super::exit_run();
            }
        }

        let depth = super::enter_run(self);
        if depth <= MAX_MARKER_DEPTH {
            self.init_markers();
        } else {
            self.clear_edges();
        }
        let _guard = RunGuard {
            effect: self,
            depth,
        };
        let mut sc = SignalContext::with_sink(self.clone());
        (self.body.borrow_mut().as_mut())(&mut sc);
    }

    /// Marks every current dependency as "was tracked" at this depth.
    fn init_markers(&self) {
        let (_, bit) = super::track_state();
        for edge in self.edges.borrow().iter() {
            edge.dep.with_inner(|inner| inner.w |= bit);
        }
    }

    /// Unsubscribes from dependencies the latest run did not read, then
    /// clears this depth's marker bits.
    fn finalize_markers(&self) {
        let (_, bit) = super::track_state();
        self.edges.borrow_mut().retain(|edge| {
            edge.dep.with_inner(|inner| {
                let keep = !(inner.w & bit != 0 && inner.n & bit == 0);
                inner.w &= !bit;
                inner.n &= !bit;
                if !keep {
                    inner.subs_remove(edge.key);
                }
                keep
            })
        });
    }

    fn clear_edges(&self) {
        for edge in self.edges.borrow_mut().drain(..) {
            edge.dep.remove_sub(edge.key);
        }
    }

    /// Stops the effect: every dep forgets it, `on_stop` fires once, and no
    /// further trigger reaches it.
    pub fn stop(&self) {
        if !self.active.replace(false) {
            return;
        }
        self.clear_edges();
        if let Some(f) = self.on_stop.borrow_mut().take() {
            f();
        }
    }
}

impl Drop for RawEffect {
    fn drop(&mut self) {
        for edge in self.edges.get_mut().drain(..) {
            edge.dep.remove_sub(edge.key);
        }
    }
}

/// Call a function each time one of its dependencies changes.
///
/// The function runs once immediately; afterwards it re-runs at most once per
/// flush when [`Runtime::update`](crate::Runtime::update) drains the job
/// queue. Dropping the returned [`Subscription`] stops it.
pub fn effect(f: impl FnMut(&mut SignalContext) + 'static) -> Subscription {
    let e = RawEffect::new(super::next_id(), Box::new(f), EffectScheduler::Queue, false);
    e.run();
    Subscription::from_effect(e)
}

/// Like [`effect`], but re-runs synchronously at the write site instead of
/// being batched into a flush.
pub fn effect_sync(f: impl FnMut(&mut SignalContext) + 'static) -> Subscription {
    let e = RawEffect::new(super::next_id(), Box::new(f), EffectScheduler::Sync, false);
    e.run();
    Subscription::from_effect(e)
}
