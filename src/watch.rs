use std::{cell::RefCell, pin::Pin, rc::Rc, task::Poll};

use futures::{channel::mpsc, Stream};

use crate::{
    cell::{HasChanged, ReadonlyRef, Ref, ShallowRef},
    computed::Computed,
    core::{next_id, EffectScheduler, RawEffect, SignalContext},
    reactive::{ReactiveList, ReactiveMap, ReactiveSet},
    Subscription,
};


/// When a watcher's callback runs relative to the flush pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FlushMode {
    /// Before the main job queue of the flush pass.
    #[default]
    Pre,
    /// After the main job queue of the flush pass.
    Post,
    /// Synchronously at the write site.
    Sync,
}

#[derive(Default)]
pub struct WatchOptions {
    /// Fire the callback once at creation with no old value.
    pub immediate: bool,
    /// Fire on every source trigger, without comparing old and new values.
    pub deep: bool,
    pub flush: FlushMode,
}

/// Something [`watch`] can observe.
pub trait WatchSource {
    type Value: HasChanged + Clone + 'static;

    fn read(&self, sc: &mut SignalContext, deep: bool) -> Self::Value;
}

impl<T: HasChanged + Clone + 'static> WatchSource for Ref<T> {
    type Value = T;
    fn read(&self, sc: &mut SignalContext, _deep: bool) -> T {
        self.get(sc)
    }
}
impl<T: HasChanged + Clone + 'static> WatchSource for ShallowRef<T> {
    type Value = T;
    fn read(&self, sc: &mut SignalContext, _deep: bool) -> T {
        self.get(sc)
    }
}
impl<T: HasChanged + Clone + 'static> WatchSource for ReadonlyRef<T> {
    type Value = T;
    fn read(&self, sc: &mut SignalContext, _deep: bool) -> T {
        self.get(sc)
    }
}
impl<T: HasChanged + Clone + 'static> WatchSource for Computed<T> {
    type Value = T;
    fn read(&self, sc: &mut SignalContext, _deep: bool) -> T {
        self.get(sc)
    }
}
impl<T, F> WatchSource for F
where
    T: HasChanged + Clone + 'static,
    F: Fn(&mut SignalContext) -> T,
{
    type Value = T;
    fn read(&self, sc: &mut SignalContext, _deep: bool) -> T {
        self(sc)
    }
}

// Collections are watched by structural version; the callback receives the
// version counter, not a snapshot.
impl<K, V> WatchSource for ReactiveMap<K, V>
where
    K: std::hash::Hash + Eq + Clone + 'static,
    V: 'static,
{
    type Value = u64;
    fn read(&self, sc: &mut SignalContext, _deep: bool) -> u64 {
        self.version(sc)
    }
}
impl<T: 'static> WatchSource for ReactiveList<T> {
    type Value = u64;
    fn read(&self, sc: &mut SignalContext, _deep: bool) -> u64 {
        self.version(sc)
    }
}
impl<T> WatchSource for ReactiveSet<T>
where
    T: std::hash::Hash + Eq + Clone + 'static,
{
    type Value = u64;
    fn read(&self, sc: &mut SignalContext, _deep: bool) -> u64 {
        self.version(sc)
    }
}

macro_rules! impl_watch_source_for_tuple {
    ($($t:ident : $i:tt),*) => {
        impl<$($t: WatchSource),*> WatchSource for ($($t,)*) {
            type Value = ($($t::Value,)*);
            fn read(&self, sc: &mut SignalContext, deep: bool) -> Self::Value {
                ($(self.$i.read(sc, deep),)*)
            }
        }
    };
}
impl_watch_source_for_tuple!(S0: 0, S1: 1);
impl_watch_source_for_tuple!(S0: 0, S1: 1, S2: 2);
impl_watch_source_for_tuple!(S0: 0, S1: 1, S2: 2, S3: 3);

/// Registers teardown functions that run before the next callback invocation
/// and when the watcher stops.
pub struct OnCleanup(Rc<RefCell<Vec<Box<dyn FnOnce()>>>>);

impl OnCleanup {
    pub fn set(&mut self, f: impl FnOnce() + 'static) {
        self.0.borrow_mut().push(Box::new(f));
    }
}

fn run_cleanups(cleanups: &Rc<RefCell<Vec<Box<dyn FnOnce()>>>>) {
    for f in take(cleanups) {
        f();
    }
}

fn take(cleanups: &Rc<RefCell<Vec<Box<dyn FnOnce()>>>>) -> Vec<Box<dyn FnOnce()>> {
    std::mem::take(&mut *cleanups.borrow_mut())
}

fn scheduler_for(flush: FlushMode) -> EffectScheduler {
    match flush {
        FlushMode::Pre => EffectScheduler::PreQueue,
        FlushMode::Post => EffectScheduler::PostQueue,
        FlushMode::Sync => EffectScheduler::Sync,
    }
}

/// Watches a source and calls `callback` with the new and previous value when
/// it changes.
///
/// The callback receives `(new, old, on_cleanup)`; `old` is `None` only for
/// the immediate first call. Unless `options.deep` is set, the callback is
/// skipped when the freshly read value [`HasChanged::has_changed`] reports
/// equal to the previous one.
pub fn watch<S: WatchSource + 'static>(
    source: S,
    mut callback: impl FnMut(&S::Value, Option<&S::Value>, &mut OnCleanup) + 'static,
    options: WatchOptions,
) -> Subscription {
    let WatchOptions {
        immediate,
        deep,
        flush,
    } = options;
    let old: RefCell<Option<S::Value>> = RefCell::new(None);
    let cleanups: Rc<RefCell<Vec<Box<dyn FnOnce()>>>> = Rc::new(RefCell::new(Vec::new()));
    let body = {
        let cleanups = cleanups.clone();
        move |sc: &mut SignalContext| {
            let new = source.read(sc, deep);
            let mut old = old.borrow_mut();
            let fire = match &*old {
                None => immediate,
                Some(prev) => deep || new.has_changed(prev),
            };
            if fire {
                run_cleanups(&cleanups);
                let mut on_cleanup = OnCleanup(cleanups.clone());
                callback(&new, old.as_ref(), &mut on_cleanup);
            }
            *old = Some(new);
        }
    };
    let e = RawEffect::new(next_id(), Box::new(body), scheduler_for(flush), false);
    // Batched watchers may write state they watch; the queue's recursion
    // limit is the backstop.
    e.set_allow_recurse(flush != FlushMode::Sync);
    e.set_on_stop(move || run_cleanups(&cleanups));
    e.run();
    Subscription::from_effect(e)
}

/// Runs `f` immediately and again whenever a dependency it read changes,
/// batched per the pre-flush queue.
pub fn watch_effect(f: impl FnMut(&mut SignalContext, &mut OnCleanup) + 'static) -> Subscription {
    watch_effect_with(f, FlushMode::Pre)
}

pub fn watch_effect_with(
    mut f: impl FnMut(&mut SignalContext, &mut OnCleanup) + 'static,
    flush: FlushMode,
) -> Subscription {
    let cleanups: Rc<RefCell<Vec<Box<dyn FnOnce()>>>> = Rc::new(RefCell::new(Vec::new()));
    let body = {
        let cleanups = cleanups.clone();
        move |sc: &mut SignalContext| {
            run_cleanups(&cleanups);
            let mut on_cleanup = OnCleanup(cleanups.clone());
            f(sc, &mut on_cleanup);
        }
    };
    let e = RawEffect::new(next_id(), Box::new(body), scheduler_for(flush), false);
    e.set_allow_recurse(flush != FlushMode::Sync);
    e.set_on_stop(move || run_cleanups(&cleanups));
    e.run();
    Subscription::from_effect(e)
}

/// Converts a source into a [`Stream`] that yields the current value
/// immediately and a new value on each change.
pub fn to_stream<S: WatchSource + 'static>(source: S) -> impl Stream<Item = S::Value> + Unpin {
    let (sender, receiver) = mpsc::unbounded();
    let subscription = watch(
        source,
        move |value, _, _| {
            let _ = sender.unbounded_send(value.clone());
        },
        WatchOptions {
            immediate: true,
            ..WatchOptions::default()
        },
    );
    ValueStream {
        receiver,
        _subscription: subscription,
    }
}

struct ValueStream<T> {
    receiver: mpsc::UnboundedReceiver<T>,
    _subscription: Subscription,
}

impl<T> Stream for ValueStream<T> {
    type Item = T;
    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Option<T>> {
        Pin::new(&mut self.receiver).poll_next(cx)
    }
}
