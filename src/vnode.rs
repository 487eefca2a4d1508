use std::{cell::RefCell, rc::Rc};

use derive_ex::derive_ex;

use crate::{
    cell::HasChanged,
    component::{Component, Instance},
    dom::Node,
};


/// A lightweight description of one node to render.
///
/// Cheap to clone; the `el`/`anchor`/`instance` slots are filled in during
/// patching and shared across clones of the same allocation.
#[derive_ex(Clone)]
pub struct VNode(Rc<VNodeData>);

pub(crate) struct VNodeData {
    kind: VNodeKind,
    key: Option<Key>,
    props: Vec<(String, PropValue)>,
    node_ref: Option<NodeRef>,
    children: Children,
    /// Host node backing this vnode; for fragments, the start marker.
    el: RefCell<Option<Node>>,
    /// Fragment end marker.
    anchor: RefCell<Option<Node>>,
    instance: RefCell<Option<Rc<Instance>>>,
}

#[derive(Clone)]
pub enum VNodeKind {
    Text,
    Comment,
    Element { tag: Rc<str>, is_svg: bool },
    Fragment,
    Component(Rc<dyn Component>),
}

#[derive(Clone)]
pub enum Children {
    None,
    Text(String),
    Nodes(Vec<VNode>),
}

/// Explicit identity of a child across reorderings.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Str(Rc<str>),
    Int(i64),
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.into())
    }
}
impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s.into())
    }
}
impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Key::Int(v)
    }
}
impl From<usize> for Key {
    fn from(v: usize) -> Self {
        Key::Int(v as i64)
    }
}

/// A property value; the closed set of things a vnode can carry besides
/// children.
#[derive(Clone)]
pub enum PropValue {
    Str(Rc<str>),
    Bool(bool),
    Int(i64),
    Float(f64),
    Handler(EventHandler),
}

impl PropValue {
    /// The DOM attribute rendition; handlers never reach the DOM.
    pub fn as_attr(&self) -> Option<String> {
        match self {
            PropValue::Str(s) => Some(s.to_string()),
            PropValue::Bool(b) => Some(b.to_string()),
            PropValue::Int(v) => Some(v.to_string()),
            PropValue::Float(v) => Some(v.to_string()),
            PropValue::Handler(_) => None,
        }
    }
}

impl HasChanged for PropValue {
    fn has_changed(&self, old: &Self) -> bool {
        match (self, old) {
            (PropValue::Str(a), PropValue::Str(b)) => a.has_changed(b),
            (PropValue::Bool(a), PropValue::Bool(b)) => a != b,
            (PropValue::Int(a), PropValue::Int(b)) => a != b,
            (PropValue::Float(a), PropValue::Float(b)) => a.has_changed(b),
            (PropValue::Handler(a), PropValue::Handler(b)) => !a.is_same(b),
            _ => true,
        }
    }
}

impl std::fmt::Debug for PropValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropValue::Str(s) => std::fmt::Debug::fmt(s, f),
            PropValue::Bool(b) => std::fmt::Debug::fmt(b, f),
            PropValue::Int(v) => std::fmt::Debug::fmt(v, f),
            PropValue::Float(v) => std::fmt::Debug::fmt(v, f),
            PropValue::Handler(_) => write!(f, "<handler>"),
        }
    }
}

impl From<&str> for PropValue {
    fn from(s: &str) -> Self {
        PropValue::Str(s.into())
    }
}
impl From<String> for PropValue {
    fn from(s: String) -> Self {
        PropValue::Str(s.into())
    }
}
impl From<bool> for PropValue {
    fn from(v: bool) -> Self {
        PropValue::Bool(v)
    }
}
impl From<i64> for PropValue {
    fn from(v: i64) -> Self {
        PropValue::Int(v)
    }
}
impl From<f64> for PropValue {
    fn from(v: f64) -> Self {
        PropValue::Float(v)
    }
}

/// An event handler delivered to a component through `emit`.
#[derive_ex(Clone)]
pub struct EventHandler(Rc<dyn Fn(&PropValue)>);

impl EventHandler {
    pub fn new(f: impl Fn(&PropValue) + 'static) -> Self {
        Self(Rc::new(f))
    }
    pub fn call(&self, payload: &PropValue) {
        (self.0)(payload);
    }
    pub fn is_same(&self, other: &EventHandler) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// Slot the renderer fills with the mounted host node of an element vnode,
/// and clears again on unmount.
#[derive_ex(Clone, Default)]
pub struct NodeRef(Rc<RefCell<Option<Node>>>);

impl NodeRef {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn get(&self) -> Option<Node> {
        self.0.borrow().clone()
    }
    pub(crate) fn assign(&self, node: Option<Node>) {
        *self.0.borrow_mut() = node;
    }
}

impl VNode {
    fn new(kind: VNodeKind, builder: VNodeBuilder) -> Self {
        VNode(Rc::new(VNodeData {
            kind,
            key: builder.key,
            props: builder.props,
            node_ref: builder.node_ref,
            children: builder.children,
            el: RefCell::new(None),
            anchor: RefCell::new(None),
            instance: RefCell::new(None),
        }))
    }

    pub fn kind(&self) -> &VNodeKind {
        &self.0.kind
    }
    pub fn key(&self) -> Option<&Key> {
        self.0.key.as_ref()
    }
    pub fn props(&self) -> &[(String, PropValue)] {
        &self.0.props
    }
    pub fn prop(&self, name: &str) -> Option<&PropValue> {
        self.0
            .props
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
    pub fn children(&self) -> &Children {
        &self.0.children
    }
    pub(crate) fn node_ref(&self) -> Option<&NodeRef> {
        self.0.node_ref.as_ref()
    }

    pub fn el(&self) -> Option<Node> {
        self.0.el.borrow().clone()
    }
    pub(crate) fn set_el(&self, el: Option<Node>) {
        *self.0.el.borrow_mut() = el;
    }
    pub(crate) fn anchor(&self) -> Option<Node> {
        self.0.anchor.borrow().clone()
    }
    pub(crate) fn set_anchor(&self, anchor: Option<Node>) {
        *self.0.anchor.borrow_mut() = anchor;
    }
    /// The component instance backing a mounted component vnode, e.g. for
    /// delivering events into it via [`Instance::emit`].
    pub fn instance(&self) -> Option<Rc<Instance>> {
        self.0.instance.borrow().clone()
    }
    pub(crate) fn set_instance(&self, instance: Option<Rc<Instance>>) {
        *self.0.instance.borrow_mut() = instance;
    }

    pub fn is_same_allocation(&self, other: &VNode) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Whether `other` describes the same node identity, making the old
    /// subtree eligible for in-place patching: kind, tag or component
    /// definition, and key must all agree.
    pub fn same_type(&self, other: &VNode) -> bool {
        let kind = match (&self.0.kind, &other.0.kind) {
            (VNodeKind::Text, VNodeKind::Text) => true,
            (VNodeKind::Comment, VNodeKind::Comment) => true,
            (VNodeKind::Fragment, VNodeKind::Fragment) => true,
            (
                VNodeKind::Element { tag: a, is_svg: sa },
                VNodeKind::Element { tag: b, is_svg: sb },
            ) => a == b && sa == sb,
            (VNodeKind::Component(a), VNodeKind::Component(b)) => {
                Rc::ptr_eq(a, b)
            }
            _ => false,
        };
        kind && self.0.key == other.0.key
    }

    /// A copy of this vnode with `extra` props merged in, used for attr
    /// fall-through onto a component's root element. Mount-time slots start
    /// empty; the copy is a fresh render output.
    pub(crate) fn with_extra_props(&self, extra: Vec<(String, PropValue)>) -> VNode {
        let mut props = self.0.props.clone();
        for (name, value) in extra {
            if let Some(slot) = props.iter_mut().find(|(n, _)| *n == name) {
                slot.1 = value;
            } else {
                props.push((name, value));
            }
        }
        VNode(Rc::new(VNodeData {
            kind: self.0.kind.clone(),
            key: self.0.key.clone(),
            props,
            node_ref: self.0.node_ref.clone(),
            children: self.0.children.clone(),
            el: RefCell::new(None),
            anchor: RefCell::new(None),
            instance: RefCell::new(None),
        }))
    }

    pub(crate) fn text_content(&self) -> &str {
        match &self.0.children {
            Children::Text(t) => t,
            _ => "",
        }
    }
}

impl std::fmt::Debug for VNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0.kind {
            VNodeKind::Text => write!(f, "VNode::Text({:?})", self.text_content()),
            VNodeKind::Comment => write!(f, "VNode::Comment({:?})", self.text_content()),
            VNodeKind::Element { tag, .. } => write!(f, "VNode::Element(<{tag}>)"),
            VNodeKind::Fragment => write!(f, "VNode::Fragment"),
            VNodeKind::Component(_) => write!(f, "VNode::Component"),
        }
    }
}

/// Builder shared by all vnode constructors.
pub struct VNodeBuilder {
    kind: VNodeKind,
    key: Option<Key>,
    props: Vec<(String, PropValue)>,
    node_ref: Option<NodeRef>,
    children: Children,
}

impl VNodeBuilder {
    fn new(kind: VNodeKind) -> Self {
        Self {
            kind,
            key: None,
            props: Vec::new(),
            node_ref: None,
            children: Children::None,
        }
    }

    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn attr(mut self, name: &str, value: impl Into<PropValue>) -> Self {
        self.props.push((name.to_string(), value.into()));
        self
    }

    /// Adds an event handler prop named `on:{event}`, delivered to a
    /// component via `emit`.
    pub fn on(mut self, event: &str, f: impl Fn(&PropValue) + 'static) -> Self {
        self.props
            .push((format!("on:{event}"), PropValue::Handler(EventHandler::new(f))));
        self
    }

    pub fn node_ref(mut self, node_ref: &NodeRef) -> Self {
        self.node_ref = Some(node_ref.clone());
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = VNode>) -> Self {
        self.children = Children::Nodes(children.into_iter().collect());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.children = Children::Text(text.into());
        self
    }

    pub fn build(self) -> VNode {
        let kind = self.kind.clone();
        VNode::new(kind, self)
    }
}

impl From<VNodeBuilder> for VNode {
    fn from(builder: VNodeBuilder) -> Self {
        builder.build()
    }
}

pub fn el(tag: &str) -> VNodeBuilder {
    VNodeBuilder::new(VNodeKind::Element {
        tag: tag.into(),
        is_svg: false,
    })
}

pub fn svg(tag: &str) -> VNodeBuilder {
    VNodeBuilder::new(VNodeKind::Element {
        tag: tag.into(),
        is_svg: true,
    })
}

pub fn text(content: impl Into<String>) -> VNode {
    VNodeBuilder::new(VNodeKind::Text).text(content).build()
}

pub fn comment(content: impl Into<String>) -> VNode {
    VNodeBuilder::new(VNodeKind::Comment).text(content).build()
}

pub fn fragment(children: impl IntoIterator<Item = VNode>) -> VNodeBuilder {
    VNodeBuilder::new(VNodeKind::Fragment).children(children)
}

/// A component vnode. The definition is shared by reference; two vnodes
/// refer to "the same component" only when they share the same `Rc`.
pub fn component<C: Component>(def: &Rc<C>) -> VNodeBuilder {
    let def: Rc<dyn Component> = def.clone();
    VNodeBuilder::new(VNodeKind::Component(def))
}
