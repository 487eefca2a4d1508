use std::{
    any::Any,
    cell::RefCell,
    collections::HashMap,
    mem::{replace, take},
    rc::{Rc, Weak},
    task::Waker,
};

use crate::core::{self, RawEffect};

#[cfg(test)]
mod tests;

thread_local! {
    static SCHEDULER: RefCell<Scheduler> = RefCell::new(Scheduler::new());
}

/// A job re-queued more often than this within one flush pass is dropped and
/// reported; it is almost certainly an effect that keeps writing its own
/// dependencies.
const RECURSION_LIMIT: u32 = 100;

/// A schedulable unit of work identified by the registration id of its owner.
pub(crate) struct Job {
    pub id: u32,
    pub allow_recurse: bool,
    pub task: Task,
}

pub(crate) enum Task {
    /// Placeholder left in the queue while (and after) a task runs.
    Taken,
    Once(Box<dyn FnOnce()>),
    Effect(Weak<RawEffect>),
    WeakFn {
        this: Weak<dyn Any>,
        f: Box<dyn Fn(Rc<dyn Any>)>,
    },
}

impl Task {
    pub fn once(f: impl FnOnce() + 'static) -> Task {
        Task::Once(Box::new(f))
    }
    /// A task bound to `this` that silently lapses once `this` is dropped.
    pub fn from_weak_fn<T: Any>(this: &Rc<T>, f: impl Fn(Rc<T>) + Copy + 'static) -> Task {
        let weak: Weak<T> = Rc::downgrade(this);
        Task::WeakFn {
            this: weak,
            f: Box::new(move |this| {
                if let Ok(this) = this.downcast::<T>() {
                    f(this);
                }
            }),
        }
    }

    fn run(self) {
        match self {
            Task::Taken => {}
            Task::Once(f) => f(),
            Task::Effect(weak) => {
                if let Some(effect) = weak.upgrade() {
                    if effect.is_active() {
                        effect.run();
                    }
                }
            }
            Task::WeakFn { this, f } => {
                if let Some(this) = this.upgrade() {
                    f(this);
                }
            }
        }
    }
}

struct Scheduler {
    /// Main job queue, sorted by ascending id from `flush_index` on.
    queue: Vec<Job>,
    flush_index: usize,
    is_flushing_queue: bool,
    pre_pending: Vec<Job>,
    current_pre: Option<u32>,
    post_pending: Vec<Job>,
    post_active: Vec<Job>,
    post_index: usize,
    is_flushing_post: bool,
    next_ticks: Vec<Box<dyn FnOnce()>>,
    seen: HashMap<u32, u32>,
    flush_count: u64,
    waker: Option<Waker>,
}

impl Scheduler {
    fn new() -> Self {
        Self {
            queue: Vec::new(),
            flush_index: 0,
            is_flushing_queue: false,
            pre_pending: Vec::new(),
            current_pre: None,
            post_pending: Vec::new(),
            post_active: Vec::new(),
            post_index: 0,
            is_flushing_post: false,
            next_ticks: Vec::new(),
            seen: HashMap::new(),
            flush_count: 0,
            waker: None,
        }
    }

    fn wake(&mut self) {
        if let Some(waker) = self.waker.take() {
            waker.wake();
        }
    }
}

fn with<T>(f: impl FnOnce(&mut Scheduler) -> T) -> T {
    SCHEDULER.with(|s| f(&mut s.borrow_mut()))
}

/// Enqueues a job into the main queue, keeping it sorted by id and skipping
/// duplicates at or after the flush cursor. The job currently running is
/// allowed back in only if it allows recursion.
pub(crate) fn queue_job(job: Job) {
    core::assert_runtime_exists();
    with(|s| {
        let from = if s.is_flushing_queue && job.allow_recurse {
            s.flush_index + 1
        } else {
            s.flush_index
        };
        let from = from.min(s.queue.len());
        if s.queue[from..].iter().any(|j| j.id == job.id) {
            return;
        }
        let base = s.flush_index.min(s.queue.len());
        let pos = base + s.queue[base..].partition_point(|j| j.id <= job.id);
        s.queue.insert(pos, job);
        s.wake();
    });
}

/// Removes a not-yet-run job from the main queue.
pub(crate) fn invalidate_job(id: u32) {
    with(|s| {
        if let Some(pos) = s.queue.iter().position(|j| j.id == id) {
            if pos > s.flush_index || (!s.is_flushing_queue && pos >= s.flush_index) {
                s.queue.remove(pos);
            }
        }
    });
}

pub(crate) fn queue_pre_cb(job: Job) {
    core::assert_runtime_exists();
    with(|s| {
        if !job.allow_recurse
            && (s.current_pre == Some(job.id) || s.pre_pending.iter().any(|j| j.id == job.id))
        {
            return;
        }
        s.pre_pending.push(job);
        s.wake();
    });
}

pub(crate) fn queue_post_cb(job: Job) {
    core::assert_runtime_exists();
    with(|s| {
        if s.is_flushing_post {
            if !job.allow_recurse && s.post_active[s.post_index..].iter().any(|j| j.id == job.id)
            {
                return;
            }
            s.post_active.push(job);
        } else {
            if !job.allow_recurse && s.post_pending.iter().any(|j| j.id == job.id) {
                return;
            }
            s.post_pending.push(job);
        }
        s.wake();
    });
}

pub(crate) fn queue_effect(effect: &Rc<RawEffect>) {
    queue_job(Job {
        id: effect.id(),
        allow_recurse: effect.allow_recurse(),
        task: Task::Effect(Rc::downgrade(effect)),
    });
}

pub(crate) fn queue_effect_pre(effect: &Rc<RawEffect>) {
    queue_pre_cb(Job {
        id: effect.id(),
        allow_recurse: effect.allow_recurse(),
        task: Task::Effect(Rc::downgrade(effect)),
    });
}

pub(crate) fn queue_effect_post(effect: &Rc<RawEffect>) {
    queue_post_cb(Job {
        id: effect.id(),
        allow_recurse: effect.allow_recurse(),
        task: Task::Effect(Rc::downgrade(effect)),
    });
}

/// Registers a callback to run at the end of the current (or next) flush
/// pass, after the DOM has settled and post-flush callbacks have run.
pub fn next_tick(f: impl FnOnce() + 'static) {
    core::assert_runtime_exists();
    with(|s| {
        s.next_ticks.push(Box::new(f));
        s.wake();
    });
}

/// Number of completed flush passes on this thread.
pub fn flush_count() -> u64 {
    with(|s| s.flush_count)
}

pub(crate) fn has_pending_work() -> bool {
    with(|s| {
        s.flush_index < s.queue.len()
            || !s.pre_pending.is_empty()
            || !s.post_pending.is_empty()
            || !s.next_ticks.is_empty()
    })
}

pub(crate) fn register_waker(waker: &Waker) {
    with(|s| s.waker = Some(waker.clone()));
}

/// Drains the pre-flush callbacks, looping because a callback may schedule
/// more. `parent` excludes the job of a component update that is currently
/// executing, so a watcher cannot re-enter its own parent mid-flush.
pub(crate) fn flush_pre_cbs(parent: Option<u32>) {
    let mut seen: HashMap<u32, u32> = HashMap::new();
    loop {
        let batch = with(|s| take(&mut s.pre_pending));
        if batch.is_empty() {
            break;
        }
        for job in batch {
            if parent == Some(job.id) {
                continue;
            }
            let count = seen.entry(job.id).or_insert(0);
            *count += 1;
            if *count > RECURSION_LIMIT {
                tracing::error!(job = job.id, "recursive pre-flush callback exceeded flush limit; skipping");
                continue;
            }
            with(|s| s.current_pre = Some(job.id));
            job.task.run();
            with(|s| s.current_pre = None);
        }
    }
}

fn flush_post_cbs() {
    let pending = with(|s| take(&mut s.post_pending));
    if pending.is_empty() {
        return;
    }
    with(|s| {
        let mut batch = pending;
        batch.sort_by_key(|j| j.id);
        s.post_active = batch;
        s.post_index = 0;
        s.is_flushing_post = true;
    });
    let mut seen: HashMap<u32, u32> = HashMap::new();
    loop {
        let next = with(|s| {
            if s.post_index < s.post_active.len() {
                let job = &mut s.post_active[s.post_index];
                Some((job.id, replace(&mut job.task, Task::Taken)))
            } else {
                None
            }
        });
        let Some((id, task)) = next else { break };
        let count = seen.entry(id).or_insert(0);
        *count += 1;
        if *count > RECURSION_LIMIT {
            tracing::error!(job = id, "recursive post-flush callback exceeded flush limit; skipping");
        } else {
            task.run();
        }
        with(|s| s.post_index += 1);
    }
    with(|s| {
        s.post_active.clear();
        s.post_index = 0;
        s.is_flushing_post = false;
    });
}

/// One flush pass: pre-flush callbacks, the main queue in ascending id
/// order, post-flush callbacks, then `next_tick` callbacks.
///
/// If a job panics, the remainder of the pass is abandoned; the guard resets
/// the queue so the runtime stays usable and the panic propagates to the
/// `update` caller.
pub(crate) fn flush_pass() {
    struct FlushGuard;
    impl Drop for FlushGuard {
        fn drop(&mut self) {
            with(|s| {
                s.queue.clear();
                s.flush_index = 0;
                s.is_flushing_queue = false;
                s.seen.clear();
            });
        }
    }

    with(|s| s.is_flushing_queue = true);
    {
        let _guard = FlushGuard;
        flush_pre_cbs(None);
        loop {
            let next = with(|s| {
                if s.flush_index < s.queue.len() {
                    let job = &mut s.queue[s.flush_index];
                    Some((job.id, replace(&mut job.task, Task::Taken)))
                } else {
                    None
                }
            });
            let Some((id, task)) = next else { break };
            let count = with(|s| {
                let count = s.seen.entry(id).or_insert(0);
                *count += 1;
                *count
            });
            if count > RECURSION_LIMIT {
                tracing::error!(job = id, "recursive job exceeded flush limit; skipping");
            } else {
                task.run();
            }
            with(|s| s.flush_index += 1);
        }
    }
    flush_post_cbs();
    loop {
        let ticks = with(|s| take(&mut s.next_ticks));
        if ticks.is_empty() {
            break;
        }
        for f in ticks {
            f();
        }
    }
    with(|s| s.flush_count += 1);
}
