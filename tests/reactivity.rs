use assert_call::{call, CallRecorder};
use verdi::{
    computed,
    dom::{Dom, Node},
    effect, effect_scope, next_tick,
    reactive::ReactiveList,
    vnode::{el, VNode},
    Ref, Renderer, Runtime, SignalContext, WatchOptions,
};

fn setup_renderer() -> (Runtime, Renderer, Node) {
    let rt = Runtime::new();
    let renderer = Renderer::new(Dom::new());
    let container = renderer.dom().create_element("app", false);
    renderer.dom().take_ops();
    (rt, renderer, container)
}

#[test]
fn computed_chain_settles_in_one_flush() {
    let mut cr = CallRecorder::new();
    let mut rt = Runtime::new();
    let base = Ref::new(1);
    let double = {
        let base = base.clone();
        computed(move |sc| base.get(sc) * 2)
    };
    let quad = {
        let double = double.clone();
        computed(move |sc| double.get(sc) * 2)
    };
    let _s = {
        let quad = quad.clone();
        effect(move |sc| call!("quad {}", quad.get(sc)))
    };
    cr.verify("quad 4");

    base.set(2);
    base.set(5);
    rt.update();
    cr.verify("quad 20");
}

#[test]
fn stopping_a_scope_silences_everything_inside() {
    let mut cr = CallRecorder::new();
    let mut rt = Runtime::new();
    let a = Ref::new(0);
    let scope = effect_scope(false);
    scope.run(|| {
        let a = a.clone();
        effect(move |sc| call!("inner {}", a.get(sc))).leak();
        verdi::on_scope_dispose(|| call!("disposed"));
    });
    cr.verify("inner 0");

    scope.stop();
    cr.verify("disposed");

    a.set(1);
    rt.update();
    cr.verify(());
}

#[test]
fn watchers_and_next_tick_order_within_a_flush() {
    let mut cr = CallRecorder::new();
    let mut rt = Runtime::new();
    let a = Ref::new(0);
    let _w = verdi::watch(
        a.clone(),
        |new, _, _| call!("watch {}", new),
        WatchOptions::default(),
    );
    let _e = {
        let a = a.clone();
        effect(move |sc| {
            a.get(sc);
            call!("effect");
        })
    };
    cr.verify("effect");

    a.set(1);
    next_tick(|| call!("tick"));
    rt.update();
    cr.verify(["watch 1", "effect", "tick"]);
}

struct Row;
impl verdi::Component for Row {
    fn props(&self) -> &'static [&'static str] {
        &["label"]
    }
    fn setup(self: std::rc::Rc<Self>, cx: &mut verdi::SetupContext) -> verdi::RenderFn {
        let props = cx.props();
        Box::new(move |sc: &mut SignalContext| {
            let label = props
                .get_cloned(sc, &"label".to_string())
                .and_then(|v| v.as_attr())
                .unwrap_or_default();
            call!("row render {label}");
            Ok(el("li").text(label).build())
        })
    }
}

struct Board {
    items: ReactiveList<String>,
}
impl verdi::Component for Board {
    fn setup(self: std::rc::Rc<Self>, _cx: &mut verdi::SetupContext) -> verdi::RenderFn {
        let row = std::rc::Rc::new(Row);
        let items = self.items.clone();
        Box::new(move |sc: &mut SignalContext| {
            let children: Vec<VNode> = items
                .to_vec(sc)
                .into_iter()
                .map(|label| {
                    verdi::vnode::component(&row)
                        .key(label.as_str())
                        .attr("label", label)
                        .build()
                })
                .collect();
            Ok(el("ul").children(children).build())
        })
    }
}

#[test]
fn a_reactive_list_drives_keyed_component_rows() {
    let mut cr = CallRecorder::new();
    let (mut rt, r, root) = setup_renderer();
    let items = ReactiveList::from_vec(vec!["a".to_string(), "b".to_string()]);
    let def = std::rc::Rc::new(Board {
        items: items.clone(),
    });
    r.render(Some(verdi::vnode::component(&def).build()), &root);
    rt.update();
    cr.verify(["row render a", "row render b"]);
    assert_eq!(r.dom().inner_html(&root), "<ul><li>a</li><li>b</li></ul>");

    items.push("c".to_string());
    rt.update();
    // existing rows are patched with identical props and skip re-rendering
    cr.verify("row render c");
    assert_eq!(
        r.dom().inner_html(&root),
        "<ul><li>a</li><li>b</li><li>c</li></ul>"
    );

    items.remove(0);
    rt.update();
    cr.verify(());
    assert_eq!(r.dom().inner_html(&root), "<ul><li>b</li><li>c</li></ul>");
}
