use assert_call::{call, CallRecorder};

use crate::{effect, effect_scope, effect_sync, on_scope_dispose, Ref, Runtime};

#[test]
fn effect_runs_immediately() {
    let mut cr = CallRecorder::new();
    let _rt = Runtime::new();
    let _s = effect(|_| call!("run"));
    cr.verify("run");
}

#[test]
fn effect_reruns_once_per_flush() {
    let mut cr = CallRecorder::new();
    let mut rt = Runtime::new();
    let a = Ref::new(0);
    let _s = {
        let a = a.clone();
        effect(move |sc| call!("run {}", a.get(sc)))
    };
    cr.verify("run 0");

    a.set(1);
    a.set(2);
    rt.update();
    cr.verify("run 2");
}

#[test]
fn dependency_precision() {
    let mut cr = CallRecorder::new();
    let mut rt = Runtime::new();
    let x = Ref::new(0);
    let y = Ref::new(0);
    let _s = {
        let x = x.clone();
        effect(move |sc| call!("x {}", x.get(sc)))
    };
    cr.verify("x 0");

    y.set(10);
    rt.update();
    cr.verify(());

    x.set(1);
    rt.update();
    cr.verify("x 1");
}

#[test]
fn stale_dependencies_are_dropped() {
    let mut cr = CallRecorder::new();
    let mut rt = Runtime::new();
    let use_x = Ref::new(true);
    let x = Ref::new(0);
    let y = Ref::new(0);
    let _s = {
        let (use_x, x, y) = (use_x.clone(), x.clone(), y.clone());
        effect(move |sc| {
            if use_x.get(sc) {
                call!("x {}", x.get(sc));
            } else {
                call!("y {}", y.get(sc));
            }
        })
    };
    cr.verify("x 0");

    use_x.set(false);
    rt.update();
    cr.verify("y 0");

    // x is no longer a dependency
    x.set(1);
    rt.update();
    cr.verify(());

    y.set(1);
    rt.update();
    cr.verify("y 1");
}

#[test]
fn untrack_skips_dependency_registration() {
    let mut cr = CallRecorder::new();
    let mut rt = Runtime::new();
    let a = Ref::new(0);
    let b = Ref::new(0);
    let _s = {
        let (a, b) = (a.clone(), b.clone());
        effect(move |sc| {
            let tracked = a.get(sc);
            let untracked = sc.untrack(|sc| b.get(sc));
            call!("run {tracked} {untracked}");
        })
    };
    cr.verify("run 0 0");

    b.set(5);
    rt.update();
    cr.verify(());

    a.set(1);
    rt.update();
    cr.verify("run 1 5");
}

#[test]
fn effect_sync_runs_at_write_site() {
    let mut cr = CallRecorder::new();
    let _rt = Runtime::new();
    let a = Ref::new(0);
    let _s = {
        let a = a.clone();
        effect_sync(move |sc| call!("run {}", a.get(sc)))
    };
    cr.verify("run 0");

    a.set(1);
    cr.verify("run 1");
}

#[test]
fn dropping_subscription_stops_effect() {
    let mut cr = CallRecorder::new();
    let mut rt = Runtime::new();
    let a = Ref::new(0);
    let s = {
        let a = a.clone();
        effect(move |sc| call!("run {}", a.get(sc)))
    };
    cr.verify("run 0");

    drop(s);
    a.set(1);
    rt.update();
    cr.verify(());
}

#[test]
fn nested_effects_restore_outer_tracking() {
    let mut cr = CallRecorder::new();
    let mut rt = Runtime::new();
    let outer = Ref::new(0);
    let inner = Ref::new(0);
    let inner_subs = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    let _s = {
        let (outer, inner, inner_subs) = (outer.clone(), inner.clone(), inner_subs.clone());
        effect(move |sc| {
            call!("outer {}", outer.get(sc));
            let inner = inner.clone();
            inner_subs
                .borrow_mut()
                .push(effect_sync(move |sc| call!("inner {}", inner.get(sc))));
        })
    };
    cr.verify(["outer 0", "inner 0"]);

    // A write to the inner dependency reaches only the inner effect.
    inner.set(1);
    cr.verify("inner 1");

    outer.set(1);
    rt.update();
    cr.verify(["outer 1", "inner 1"]);
}

#[test]
fn scope_stop_stops_effects_and_runs_cleanups_once() {
    let mut cr = CallRecorder::new();
    let mut rt = Runtime::new();
    let a = Ref::new(0);
    let scope = effect_scope(false);
    let s = scope.run(|| {
        on_scope_dispose(|| call!("cleanup"));
        let a = a.clone();
        effect(move |sc| call!("run {}", a.get(sc)))
    });
    cr.verify("run 0");

    scope.stop();
    cr.verify("cleanup");
    a.set(1);
    rt.update();
    cr.verify(());

    // idempotent
    scope.stop();
    cr.verify(());
    drop(s);
}

#[test]
fn nested_scope_stops_with_parent() {
    let mut cr = CallRecorder::new();
    let _rt = Runtime::new();
    let parent = effect_scope(false);
    let child = parent.run(|| {
        let child = effect_scope(false);
        child.run(|| on_scope_dispose(|| call!("child cleanup")));
        child
    });
    parent.stop();
    cr.verify("child cleanup");
    assert!(!child.is_active());
}

#[test]
fn detached_scope_survives_parent_stop() {
    let mut cr = CallRecorder::new();
    let _rt = Runtime::new();
    let parent = effect_scope(false);
    let detached = parent.run(|| {
        let detached = effect_scope(true);
        detached.run(|| on_scope_dispose(|| call!("detached cleanup")));
        detached
    });
    parent.stop();
    cr.verify(());
    assert!(detached.is_active());
    detached.stop();
    cr.verify("detached cleanup");
}

#[test]
#[should_panic = "Only one `Runtime` can exist in the same thread at the same time."]
fn only_one_runtime_per_thread() {
    let _rt0 = Runtime::new();
    let _rt1 = Runtime::new();
}

#[test]
fn runtime_can_be_recreated_after_drop() {
    drop(Runtime::new());
    let _rt = Runtime::new();
}
