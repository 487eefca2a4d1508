use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    fmt::Write,
    rc::{Rc, Weak},
};

use derive_ex::derive_ex;

#[cfg(test)]
mod tests;

/// An in-memory document tree standing in for the browser DOM.
///
/// Every mutation is appended to an op log so tests can assert not just the
/// final tree shape but how many creations, moves and removals it took to
/// get there.
#[derive_ex(Clone, Default)]
#[default(Self::new())]
pub struct Dom(Rc<DomShared>);

struct DomShared {
    ops: RefCell<Vec<DomOp>>,
    next_node_id: Cell<u32>,
}

/// One logged host mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DomOp {
    CreateElement { id: u32, tag: String },
    CreateText { id: u32, text: String },
    CreateComment { id: u32, text: String },
    SetText { id: u32, text: String },
    SetAttr { id: u32, name: String, value: String },
    RemoveAttr { id: u32, name: String },
    /// `moved` is set when the child was already attached somewhere, i.e.
    /// this insert repositions an existing node instead of mounting a new
    /// one.
    Insert { parent: u32, child: u32, moved: bool },
    Remove { child: u32 },
}

/// A node handle; cheap to clone, identity by allocation.
#[derive_ex(Clone)]
pub struct Node(Rc<NodeData>);

struct NodeData {
    id: u32,
    payload: RefCell<NodePayload>,
    parent: RefCell<Weak<NodeData>>,
    children: RefCell<Vec<Node>>,
}

enum NodePayload {
    Element {
        tag: String,
        is_svg: bool,
        attrs: BTreeMap<String, String>,
    },
    Text(String),
    Comment(String),
}

impl Dom {
    pub fn new() -> Self {
        Self(Rc::new(DomShared {
            ops: RefCell::new(Vec::new()),
            next_node_id: Cell::new(1),
        }))
    }

    fn log(&self, op: DomOp) {
        self.0.ops.borrow_mut().push(op);
    }

    fn alloc(&self, payload: NodePayload) -> Node {
        let id = self.0.next_node_id.get();
        self.0.next_node_id.set(id + 1);
        Node(Rc::new(NodeData {
            id,
            payload: RefCell::new(payload),
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
        }))
    }

    /// Drains and returns the mutation log.
    pub fn take_ops(&self) -> Vec<DomOp> {
        std::mem::take(&mut self.0.ops.borrow_mut())
    }

    pub fn create_element(&self, tag: &str, is_svg: bool) -> Node {
        let node = self.alloc(NodePayload::Element {
            tag: tag.to_string(),
            is_svg,
            attrs: BTreeMap::new(),
        });
        self.log(DomOp::CreateElement {
            id: node.id(),
            tag: tag.to_string(),
        });
        node
    }

    pub fn create_text(&self, text: &str) -> Node {
        let node = self.alloc(NodePayload::Text(text.to_string()));
        self.log(DomOp::CreateText {
            id: node.id(),
            text: text.to_string(),
        });
        node
    }

    pub fn create_comment(&self, text: &str) -> Node {
        let node = self.alloc(NodePayload::Comment(text.to_string()));
        self.log(DomOp::CreateComment {
            id: node.id(),
            text: text.to_string(),
        });
        node
    }

    pub fn set_text(&self, node: &Node, text: &str) {
        match &mut *node.0.payload.borrow_mut() {
            NodePayload::Text(t) | NodePayload::Comment(t) => *t = text.to_string(),
            NodePayload::Element { .. } => return,
        }
        self.log(DomOp::SetText {
            id: node.id(),
            text: text.to_string(),
        });
    }

    pub fn set_attr(&self, node: &Node, name: &str, value: &str) {
        if let NodePayload::Element { attrs, .. } = &mut *node.0.payload.borrow_mut() {
            attrs.insert(name.to_string(), value.to_string());
            self.log(DomOp::SetAttr {
                id: node.id(),
                name: name.to_string(),
                value: value.to_string(),
            });
        }
    }

    pub fn remove_attr(&self, node: &Node, name: &str) {
        if let NodePayload::Element { attrs, .. } = &mut *node.0.payload.borrow_mut() {
            if attrs.remove(name).is_some() {
                self.log(DomOp::RemoveAttr {
                    id: node.id(),
                    name: name.to_string(),
                });
            }
        }
    }

    /// Attaches `child` under `parent` before `anchor` (or appends). When
    /// the child is already attached it is detached first and the insert is
    /// logged as a move.
    pub fn insert(&self, parent: &Node, child: &Node, anchor: Option<&Node>) {
        let moved = self.detach(child);
        let mut children = parent.0.children.borrow_mut();
        let pos = match anchor {
            Some(anchor) => children
                .iter()
                .position(|c| c.is_same(anchor))
                .unwrap_or(children.len()),
            None => children.len(),
        };
        children.insert(pos, child.clone());
        *child.0.parent.borrow_mut() = Rc::downgrade(&parent.0);
        self.log(DomOp::Insert {
            parent: parent.id(),
            child: child.id(),
            moved,
        });
    }

    /// Detaches `child` from the tree.
    pub fn remove(&self, child: &Node) {
        if self.detach(child) {
            self.log(DomOp::Remove { child: child.id() });
        }
    }

    fn detach(&self, child: &Node) -> bool {
        let parent = child.0.parent.borrow().upgrade();
        let Some(parent) = parent else {
            return false;
        };
        parent
            .children
            .borrow_mut()
            .retain(|c| !Rc::ptr_eq(&c.0, &child.0));
        *child.0.parent.borrow_mut() = Weak::new();
        true
    }

    pub fn parent(&self, node: &Node) -> Option<Node> {
        node.0.parent.borrow().upgrade().map(Node)
    }

    pub fn next_sibling(&self, node: &Node) -> Option<Node> {
        let parent = node.0.parent.borrow().upgrade()?;
        let children = parent.children.borrow();
        let pos = children.iter().position(|c| Rc::ptr_eq(&c.0, &node.0))?;
        children.get(pos + 1).cloned()
    }

    /// Serializes a node's children for assertions.
    pub fn inner_html(&self, node: &Node) -> String {
        let mut out = String::new();
        for child in node.0.children.borrow().iter() {
            child.write_html(&mut out);
        }
        out
    }
}

impl Node {
    pub fn id(&self) -> u32 {
        self.0.id
    }

    pub fn is_same(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn tag(&self) -> Option<String> {
        match &*self.0.payload.borrow() {
            NodePayload::Element { tag, .. } => Some(tag.clone()),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<String> {
        match &*self.0.payload.borrow() {
            NodePayload::Text(t) | NodePayload::Comment(t) => Some(t.clone()),
            NodePayload::Element { .. } => None,
        }
    }

    pub fn attr(&self, name: &str) -> Option<String> {
        match &*self.0.payload.borrow() {
            NodePayload::Element { attrs, .. } => attrs.get(name).cloned(),
            _ => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(&*self.0.payload.borrow(), NodePayload::Text(_))
    }

    pub fn child_count(&self) -> usize {
        self.0.children.borrow().len()
    }

    pub fn child(&self, index: usize) -> Option<Node> {
        self.0.children.borrow().get(index).cloned()
    }

    fn write_html(&self, out: &mut String) {
        match &*self.0.payload.borrow() {
            NodePayload::Text(t) => out.push_str(t),
            NodePayload::Comment(t) => {
                let _ = write!(out, "<!--{t}-->");
            }
            NodePayload::Element { tag, attrs, .. } => {
                let _ = write!(out, "<{tag}");
                for (name, value) in attrs {
                    let _ = write!(out, " {name}=\"{value}\"");
                }
                out.push('>');
                for child in self.0.children.borrow().iter() {
                    child.write_html(out);
                }
                let _ = write!(out, "</{tag}>");
            }
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &*self.0.payload.borrow() {
            NodePayload::Element { tag, .. } => write!(f, "Node#{}(<{tag}>)", self.0.id),
            NodePayload::Text(t) => write!(f, "Node#{}({t:?})", self.0.id),
            NodePayload::Comment(t) => write!(f, "Node#{}(<!--{t}-->)", self.0.id),
        }
    }
}
