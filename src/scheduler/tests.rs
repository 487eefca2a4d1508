use assert_call::{call, CallRecorder};

use super::*;
use crate::Runtime;

fn once_job(id: u32, f: impl FnOnce() + 'static) -> Job {
    Job {
        id,
        allow_recurse: false,
        task: Task::once(f),
    }
}

#[test]
fn jobs_run_in_ascending_id_order() {
    let mut cr = CallRecorder::new();
    let mut rt = Runtime::new();
    queue_job(once_job(2, || call!("2")));
    queue_job(once_job(1, || call!("1")));
    rt.update();
    cr.verify(["1", "2"]);
}

#[test]
fn duplicate_job_id_is_skipped() {
    let mut cr = CallRecorder::new();
    let mut rt = Runtime::new();
    queue_job(once_job(1, || call!("a")));
    queue_job(once_job(1, || call!("b")));
    rt.update();
    cr.verify("a");
}

#[test]
fn invalidated_job_does_not_run() {
    let mut cr = CallRecorder::new();
    let mut rt = Runtime::new();
    queue_job(once_job(1, || call!("1")));
    queue_job(once_job(2, || call!("2")));
    invalidate_job(1);
    rt.update();
    cr.verify("2");
}

#[test]
fn pre_cbs_drain_before_main_queue() {
    let mut cr = CallRecorder::new();
    let mut rt = Runtime::new();
    queue_job(once_job(1, || call!("job")));
    queue_pre_cb(once_job(2, || {
        call!("pre");
        // A pre callback may schedule another; it still runs before the
        // main queue.
        queue_pre_cb(once_job(3, || call!("pre nested")));
    }));
    rt.update();
    cr.verify(["pre", "pre nested", "job"]);
}

#[test]
fn post_cbs_run_after_main_queue_sorted_by_id() {
    let mut cr = CallRecorder::new();
    let mut rt = Runtime::new();
    queue_post_cb(once_job(5, || call!("post 5")));
    queue_post_cb(once_job(3, || call!("post 3")));
    queue_job(once_job(1, || call!("job")));
    rt.update();
    cr.verify(["job", "post 3", "post 5"]);
}

#[test]
fn post_cb_scheduled_while_flushing_post_joins_active_batch() {
    let mut cr = CallRecorder::new();
    let mut rt = Runtime::new();
    queue_post_cb(once_job(1, || {
        call!("post 1");
        queue_post_cb(once_job(2, || call!("post 2")));
    }));
    rt.update();
    cr.verify(["post 1", "post 2"]);
}

#[test]
fn next_tick_runs_at_end_of_pass() {
    let mut cr = CallRecorder::new();
    let mut rt = Runtime::new();
    queue_post_cb(once_job(1, || call!("post")));
    queue_job(once_job(2, || call!("job")));
    next_tick(|| call!("tick"));
    rt.update();
    cr.verify(["job", "post", "tick"]);
}

#[test]
fn job_queued_mid_flush_runs_in_the_same_pass() {
    let mut cr = CallRecorder::new();
    let mut rt = Runtime::new();
    let before = flush_count();
    queue_job(once_job(1, || {
        call!("first");
        queue_job(once_job(2, || call!("second")));
    }));
    rt.update();
    cr.verify(["first", "second"]);
    assert_eq!(flush_count(), before + 1);
}

#[test]
fn panicking_job_aborts_pass_but_runtime_stays_usable() {
    let mut cr = CallRecorder::new();
    let mut rt = Runtime::new();
    queue_job(once_job(1, || panic!("job failed")));
    queue_job(once_job(2, || call!("skipped")));
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| rt.update()));
    assert!(result.is_err());
    cr.verify(());

    queue_job(once_job(3, || call!("after")));
    rt.update();
    cr.verify("after");
}

#[test]
fn recursive_job_is_cut_off() {
    use std::{cell::Cell, rc::Rc};

    let mut rt = Runtime::new();
    let count = Rc::new(Cell::new(0u32));
    fn requeue(count: Rc<Cell<u32>>) {
        count.set(count.get() + 1);
        queue_job(Job {
            id: 1,
            allow_recurse: true,
            task: Task::once(move || requeue(count)),
        });
    }
    let c = count.clone();
    queue_job(Job {
        id: 1,
        allow_recurse: true,
        task: Task::once(move || requeue(c)),
    });
    rt.update();
    // Terminates via the recursion limit rather than hanging.
    assert_eq!(count.get(), RECURSION_LIMIT);
}

#[test]
fn recursive_pre_cb_is_cut_off() {
    use std::{cell::Cell, rc::Rc};

    let mut rt = Runtime::new();
    let count = Rc::new(Cell::new(0u32));
    fn requeue(count: Rc<Cell<u32>>) {
        count.set(count.get() + 1);
        queue_pre_cb(Job {
            id: 1,
            allow_recurse: true,
            task: Task::once(move || requeue(count)),
        });
    }
    let c = count.clone();
    queue_pre_cb(Job {
        id: 1,
        allow_recurse: true,
        task: Task::once(move || requeue(c)),
    });
    rt.update();
    assert_eq!(count.get(), RECURSION_LIMIT);
}

#[test]
fn recursive_post_cb_is_cut_off() {
    use std::{cell::Cell, rc::Rc};

    let mut rt = Runtime::new();
    let count = Rc::new(Cell::new(0u32));
    fn requeue(count: Rc<Cell<u32>>) {
        count.set(count.get() + 1);
        queue_post_cb(Job {
            id: 1,
            allow_recurse: true,
            task: Task::once(move || requeue(count)),
        });
    }
    let c = count.clone();
    queue_post_cb(Job {
        id: 1,
        allow_recurse: true,
        task: Task::once(move || requeue(c)),
    });
    rt.update();
    assert_eq!(count.get(), RECURSION_LIMIT);
}

#[test]
fn weak_fn_task_runs_while_alive_and_lapses_after_drop() {
    use std::rc::Rc;

    let mut cr = CallRecorder::new();
    let mut rt = Runtime::new();
    let this = Rc::new("target".to_string());
    queue_post_cb(Job {
        id: 1,
        allow_recurse: false,
        task: Task::from_weak_fn(&this, |s| call!("ran {s}")),
    });
    rt.update();
    cr.verify("ran target");

    queue_post_cb(Job {
        id: 2,
        allow_recurse: false,
        task: Task::from_weak_fn(&this, |s| call!("ran {s}")),
    });
    drop(this);
    rt.update();
    cr.verify(());
}

#[test]
#[should_panic = "`Runtime` is not created."]
fn queueing_without_runtime_panics() {
    queue_job(once_job(1, || {}));
}
