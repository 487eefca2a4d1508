use std::cell::Cell;

use assert_call::{call, CallRecorder};

use super::*;
use crate::{
    vnode::{component, el, text},
    Runtime,
};

struct Labeled;
impl Component for Labeled {
    fn props(&self) -> &'static [&'static str] {
        &["label"]
    }
    fn setup(self: Rc<Self>, _cx: &mut SetupContext) -> RenderFn {
        Box::new(|_| Ok(text("")))
    }
}

fn keys_of(map: &ReactiveMap<String, PropValue>) -> Vec<String> {
    let mut sc = SignalContext::detached();
    let mut keys = map.keys(&mut sc);
    keys.sort();
    keys
}

#[test]
fn assign_props_splits_declared_props_from_attrs() {
    let _rt = Runtime::new();
    let def = Rc::new(Labeled);
    let vnode = component(&def)
        .attr("label", "hi")
        .attr("class", "wide")
        .build();
    let instance = Instance::new(vnode, None);
    assert_eq!(keys_of(instance.props()), vec!["label"]);
    assert_eq!(keys_of(instance.attrs()), vec!["class"]);
}

#[test]
fn assign_props_drops_entries_the_new_vnode_no_longer_carries() {
    let _rt = Runtime::new();
    let def = Rc::new(Labeled);
    let instance = Instance::new(
        component(&def).attr("label", "hi").attr("class", "wide").build(),
        None,
    );
    instance.assign_props(&component(&def).attr("title", "t").build());
    assert!(keys_of(instance.props()).is_empty());
    assert_eq!(keys_of(instance.attrs()), vec!["title"]);
}

#[test]
fn emit_invokes_the_handler_prop() {
    let _rt = Runtime::new();
    let def = Rc::new(Labeled);
    let hits = Rc::new(Cell::new(0));
    let vnode = {
        let hits = hits.clone();
        component(&def)
            .on("save", move |payload| {
                if let PropValue::Int(v) = payload {
                    hits.set(*v);
                }
            })
            .build()
    };
    let instance = Instance::new(vnode, None);
    instance.emit("save", &PropValue::Int(7));
    assert_eq!(hits.get(), 7);

    // unknown events are a logged no-op
    instance.emit("discard", &PropValue::Bool(true));
    assert_eq!(hits.get(), 7);
}

#[test]
fn emit_finds_handlers_in_declared_props_too() {
    struct Declared;
    impl Component for Declared {
        fn props(&self) -> &'static [&'static str] {
            &["on:save"]
        }
        fn setup(self: Rc<Self>, _cx: &mut SetupContext) -> RenderFn {
            Box::new(|_| Ok(text("")))
        }
    }
    let _rt = Runtime::new();
    let def = Rc::new(Declared);
    let hits = Rc::new(Cell::new(false));
    let vnode = {
        let hits = hits.clone();
        component(&def).on("save", move |_| hits.set(true)).build()
    };
    let instance = Instance::new(vnode, None);
    assert_eq!(keys_of(instance.props()), vec!["on:save"]);
    instance.emit("save", &PropValue::Bool(true));
    assert!(hits.get());
}

#[test]
fn hooks_run_in_registration_order() {
    let mut cr = CallRecorder::new();
    let _rt = Runtime::new();
    let def = Rc::new(Labeled);
    let instance = Instance::new(component(&def).build(), None);
    instance.add_hook(HookPhase::Mounted, Rc::new(|| call!("first")));
    instance.add_hook(HookPhase::Mounted, Rc::new(|| call!("second")));
    instance.add_hook(HookPhase::Unmounted, Rc::new(|| call!("other phase")));
    instance.run_hooks(HookPhase::Mounted);
    cr.verify(["first", "second"]);
}

#[test]
fn inject_walks_the_ancestor_chain() {
    struct Inner;
    impl Component for Inner {
        fn setup(self: Rc<Self>, cx: &mut SetupContext) -> RenderFn {
            let found = cx
                .inject("answer")
                .and_then(|v| v.downcast::<i32>().ok())
                .map(|v| *v);
            call!("inject {:?}", found);
            // a component's own provide is invisible to itself
            cx.provide("answer", Rc::new(0i32));
            assert_eq!(
                cx.inject("answer").and_then(|v| v.downcast::<i32>().ok()),
                Some(Rc::new(42))
            );
            Box::new(|_| Ok(text("")))
        }
    }
    let mut cr = CallRecorder::new();
    let _rt = Runtime::new();

    let root_def = Rc::new(Labeled);
    let root = Instance::new(component(&root_def).build(), None);
    root.run_setup();
    root.provides
        .borrow_mut()
        .insert("answer".to_string(), Rc::new(42i32));

    let mid_def = Rc::new(Labeled);
    let mid = Instance::new(component(&mid_def).build(), Some(&root));

    let inner_def = Rc::new(Inner);
    let inner = Instance::new(component(&inner_def).build(), Some(&mid));
    inner.run_setup();
    cr.verify("inject Some(42)");
}

#[test]
fn render_merges_attrs_onto_a_root_element() {
    struct Root;
    impl Component for Root {
        fn setup(self: Rc<Self>, _cx: &mut SetupContext) -> RenderFn {
            Box::new(|_| Ok(el("div").attr("id", "inner").build()))
        }
    }
    let _rt = Runtime::new();
    let def = Rc::new(Root);
    let instance = Instance::new(component(&def).attr("class", "wide").build(), None);
    instance.run_setup();

    let mut sc = SignalContext::detached();
    let tree = instance.render(&mut sc);
    assert_eq!(tree.prop("class").and_then(|p| p.as_attr()).as_deref(), Some("wide"));
    assert_eq!(tree.prop("id").and_then(|p| p.as_attr()).as_deref(), Some("inner"));
}

#[test]
fn render_error_yields_a_comment_placeholder() {
    struct Failing;
    impl Component for Failing {
        fn setup(self: Rc<Self>, _cx: &mut SetupContext) -> RenderFn {
            Box::new(|_| Err(Error::Render("boom".to_string())))
        }
    }
    let _rt = Runtime::new();
    let def = Rc::new(Failing);
    let instance = Instance::new(component(&def).build(), None);
    instance.run_setup();

    let mut sc = SignalContext::detached();
    let tree = instance.render(&mut sc);
    assert!(matches!(tree.kind(), VNodeKind::Comment));
}
