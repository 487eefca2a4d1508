use super::*;

#[test]
fn creation_is_logged() {
    let dom = Dom::new();
    let el = dom.create_element("div", false);
    let text = dom.create_text("hi");
    assert_eq!(
        dom.take_ops(),
        vec![
            DomOp::CreateElement {
                id: el.id(),
                tag: "div".to_string()
            },
            DomOp::CreateText {
                id: text.id(),
                text: "hi".to_string()
            },
        ]
    );
}

#[test]
fn insert_appends_or_respects_anchor() {
    let dom = Dom::new();
    let root = dom.create_element("div", false);
    let a = dom.create_text("a");
    let b = dom.create_text("b");
    let c = dom.create_text("c");
    dom.insert(&root, &a, None);
    dom.insert(&root, &c, None);
    dom.insert(&root, &b, Some(&c));
    assert_eq!(dom.inner_html(&root), "abc");
    assert!(dom.parent(&b).unwrap().is_same(&root));
    assert!(dom.next_sibling(&b).unwrap().is_same(&c));
    assert!(dom.next_sibling(&c).is_none());
}

#[test]
fn reinserting_an_attached_node_is_a_move() {
    let dom = Dom::new();
    let root = dom.create_element("div", false);
    let a = dom.create_text("a");
    let b = dom.create_text("b");
    dom.insert(&root, &a, None);
    dom.insert(&root, &b, None);
    dom.take_ops();

    dom.insert(&root, &a, None);
    assert_eq!(dom.inner_html(&root), "ba");
    assert_eq!(
        dom.take_ops(),
        vec![DomOp::Insert {
            parent: root.id(),
            child: a.id(),
            moved: true
        }]
    );
}

#[test]
fn remove_detaches_and_logs_once() {
    let dom = Dom::new();
    let root = dom.create_element("div", false);
    let a = dom.create_text("a");
    dom.insert(&root, &a, None);
    dom.take_ops();

    dom.remove(&a);
    assert_eq!(root.child_count(), 0);
    assert!(dom.parent(&a).is_none());
    assert_eq!(dom.take_ops(), vec![DomOp::Remove { child: a.id() }]);

    // already detached
    dom.remove(&a);
    assert_eq!(dom.take_ops(), vec![]);
}

#[test]
fn attrs_are_set_and_removed() {
    let dom = Dom::new();
    let el = dom.create_element("input", false);
    dom.set_attr(&el, "type", "text");
    dom.set_attr(&el, "value", "x");
    assert_eq!(el.attr("type").as_deref(), Some("text"));

    dom.remove_attr(&el, "type");
    assert_eq!(el.attr("type"), None);
    dom.take_ops();

    // removing an absent attr logs nothing
    dom.remove_attr(&el, "type");
    assert_eq!(dom.take_ops(), vec![]);
}

#[test]
fn set_text_updates_text_and_comment_nodes() {
    let dom = Dom::new();
    let t = dom.create_text("a");
    let c = dom.create_comment("m");
    dom.set_text(&t, "b");
    dom.set_text(&c, "n");
    assert_eq!(t.text().as_deref(), Some("b"));
    assert_eq!(c.text().as_deref(), Some("n"));
    assert!(t.is_text());
    assert!(!c.is_text());
}

#[test]
fn inner_html_serializes_the_subtree() {
    let dom = Dom::new();
    let root = dom.create_element("div", false);
    let p = dom.create_element("p", false);
    dom.set_attr(&p, "class", "a");
    dom.insert(&p, &dom.create_text("hi"), None);
    dom.insert(&root, &p, None);
    dom.insert(&root, &dom.create_comment("end"), None);
    assert_eq!(dom.inner_html(&root), "<p class=\"a\">hi</p><!--end-->");
}
