use std::{cell::RefCell, collections::HashMap, rc::Rc};

use bumpalo::Bump;
use derive_ex::derive_ex;

use crate::{
    cell::HasChanged,
    component::{HookPhase, Instance},
    core::{EffectScheduler, RawEffect, SignalContext},
    dom::{Dom, Node},
    scheduler::{self, Job, Task},
    vnode::{Children, Key, VNode, VNodeKind},
};


/// Diffs vnode trees and applies the minimal host mutations.
#[derive_ex(Clone)]
pub struct Renderer(Rc<RendererShared>);

struct RendererShared {
    dom: Dom,
    /// Previous root vnode per container, for top-level re-renders.
    roots: RefCell<HashMap<u32, VNode>>,
}

fn host_el(vnode: &VNode) -> Node {
    match vnode.el() {
        Some(el) => el,
        None => unreachable!("vnode is not mounted"),
    }
}

impl Renderer {
    pub fn new(dom: Dom) -> Self {
        Self(Rc::new(RendererShared {
            dom,
            roots: RefCell::new(HashMap::new()),
        }))
    }

    pub fn dom(&self) -> &Dom {
        &self.0.dom
    }

    /// Renders `vnode` into `container`, diffing against whatever this
    /// renderer previously rendered there. `None` unmounts.
    pub fn render(&self, vnode: Option<VNode>, container: &Node) {
        let old = self.0.roots.borrow_mut().remove(&container.id());
        match vnode {
            Some(new) => {
                self.patch(old.as_ref(), &new, container, None, None);
                self.0.roots.borrow_mut().insert(container.id(), new);
            }
            None => {
                if let Some(old) = &old {
                    self.unmount(old, true);
                }
            }
        }
    }

    pub(crate) fn patch(
        &self,
        old: Option<&VNode>,
        new: &VNode,
        container: &Node,
        anchor: Option<&Node>,
        parent: Option<&Rc<Instance>>,
    ) {
        if let Some(old) = old {
            if old.is_same_allocation(new) {
                return;
            }
        }
        // A type or key mismatch forces a clean remount at the old position.
        let mut anchor = anchor.cloned();
        let old = match old {
            Some(o) if !o.same_type(new) => {
                anchor = self.next_host_node(o);
                self.unmount(o, true);
                None
            }
            o => o,
        };
        let anchor = anchor.as_ref();
        match new.kind() {
            VNodeKind::Text => self.process_text(old, new, container, anchor),
            VNodeKind::Comment => self.process_comment(old, new, container, anchor),
            VNodeKind::Element { .. } => self.process_element(old, new, container, anchor, parent),
            VNodeKind::Fragment => self.process_fragment(old, new, container, anchor, parent),
            VNodeKind::Component(_) => self.process_component(old, new, container, anchor, parent),
        }
    }

    fn process_text(&self, old: Option<&VNode>, new: &VNode, container: &Node, anchor: Option<&Node>) {
        match old {
            None => {
                let node = self.0.dom.create_text(new.text_content());
                new.set_el(Some(node.clone()));
                self.0.dom.insert(container, &node, anchor);
            }
            Some(old) => {
                let node = host_el(old);
                new.set_el(Some(node.clone()));
                if old.text_content() != new.text_content() {
                    self.0.dom.set_text(&node, new.text_content());
                }
            }
        }
    }

    /// Comments are patched only on mount; afterwards the host node is
    /// reused untouched.
    fn process_comment(&self, old: Option<&VNode>, new: &VNode, container: &Node, anchor: Option<&Node>) {
        match old {
            None => {
                let node = self.0.dom.create_comment(new.text_content());
                new.set_el(Some(node.clone()));
                self.0.dom.insert(container, &node, anchor);
            }
            Some(old) => {
                new.set_el(Some(host_el(old)));
            }
        }
    }

    fn process_element(
        &self,
        old: Option<&VNode>,
        new: &VNode,
        container: &Node,
        anchor: Option<&Node>,
        parent: Option<&Rc<Instance>>,
    ) {
        match old {
            None => self.mount_element(new, container, anchor, parent),
            Some(old) => self.patch_element(old, new, parent),
        }
    }

    fn mount_element(
        &self,
        new: &VNode,
        container: &Node,
        anchor: Option<&Node>,
        parent: Option<&Rc<Instance>>,
    ) {
        let VNodeKind::Element { tag, is_svg } = new.kind() else {
            return;
        };
        let el = self.0.dom.create_element(tag, *is_svg);
        for (name, value) in new.props() {
            if let Some(value) = value.as_attr() {
                self.0.dom.set_attr(&el, name, &value);
            }
        }
        match new.children() {
            Children::None => {}
            Children::Text(text) => {
                let node = self.0.dom.create_text(text);
                self.0.dom.insert(&el, &node, None);
            }
            Children::Nodes(children) => {
                for child in children {
                    self.patch(None, child, &el, None, parent);
                }
            }
        }
        new.set_el(Some(el.clone()));
        if let Some(node_ref) = new.node_ref() {
            node_ref.assign(Some(el.clone()));
        }
        self.0.dom.insert(container, &el, anchor);
    }

    fn patch_element(&self, old: &VNode, new: &VNode, parent: Option<&Rc<Instance>>) {
        let el = host_el(old);
        new.set_el(Some(el.clone()));
        self.patch_props(&el, old.props(), new.props());
        self.patch_children(old, new, &el, None, parent);
        if let Some(node_ref) = new.node_ref() {
            node_ref.assign(Some(el));
        } else if let Some(node_ref) = old.node_ref() {
            node_ref.assign(None);
        }
    }

    /// Key-by-key prop diff: new or changed attrs applied, attrs absent from
    /// the new props cleared. Handlers never touch the DOM.
    fn patch_props(
        &self,
        el: &Node,
        old_props: &[(String, crate::vnode::PropValue)],
        new_props: &[(String, crate::vnode::PropValue)],
    ) {
        for (name, value) in new_props {
            let old = old_props.iter().find(|(n, _)| n == name).map(|(_, v)| v);
            match old {
                Some(old) if !value.has_changed(old) => {}
                _ => {
                    if let Some(value) = value.as_attr() {
                        self.0.dom.set_attr(el, name, &value);
                    }
                }
            }
        }
        for (name, value) in old_props {
            if value.as_attr().is_some() && !new_props.iter().any(|(n, _)| n == name) {
                self.0.dom.remove_attr(el, name);
            }
        }
    }

    /// Fragments are bounded by a pair of empty text markers so their
    /// children diff as a contiguous region without a wrapping element.
    fn process_fragment(
        &self,
        old: Option<&VNode>,
        new: &VNode,
        container: &Node,
        anchor: Option<&Node>,
        parent: Option<&Rc<Instance>>,
    ) {
        match old {
            None => {
                let start = self.0.dom.create_text("");
                let end = self.0.dom.create_text("");
                new.set_el(Some(start.clone()));
                new.set_anchor(Some(end.clone()));
                self.0.dom.insert(container, &start, anchor);
                self.0.dom.insert(container, &end, anchor);
                if let Children::Nodes(children) = new.children() {
                    for child in children {
                        self.patch(None, child, container, Some(&end), parent);
                    }
                }
            }
            Some(old) => {
                new.set_el(old.el());
                let end = old.anchor();
                new.set_anchor(end.clone());
                self.patch_children(old, new, container, end.as_ref(), parent);
            }
        }
    }

    fn process_component(
        &self,
        old: Option<&VNode>,
        new: &VNode,
        container: &Node,
        anchor: Option<&Node>,
        parent: Option<&Rc<Instance>>,
    ) {
        match old {
            None => self.mount_component(new, container, anchor, parent),
            Some(old) => {
                let Some(instance) = old.instance() else {
                    return;
                };
                new.set_instance(Some(instance.clone()));
                if should_update_component(old, new) {
                    // A parent-driven update renders synchronously; the
                    // queued job for the same instance is dropped first.
                    instance.set_next(new.clone());
                    scheduler::invalidate_job(instance.uid());
                    if let Some(effect) = instance.render_effect() {
                        effect.run();
                    }
                } else {
                    new.set_el(old.el());
                    instance.set_vnode(new.clone());
                }
            }
        }
    }

    fn mount_component(
        &self,
        vnode: &VNode,
        container: &Node,
        anchor: Option<&Node>,
        parent: Option<&Rc<Instance>>,
    ) {
        let instance = Instance::new(vnode.clone(), parent);
        vnode.set_instance(Some(instance.clone()));
        instance.run_setup();
        let effect = instance.scope().run(|| {
            let renderer = self.clone();
            let weak = Rc::downgrade(&instance);
            let container = container.clone();
            let anchor = anchor.cloned();
            RawEffect::new(
                instance.uid(),
                Box::new(move |sc: &mut SignalContext| {
                    if let Some(instance) = weak.upgrade() {
                        renderer.component_update(&instance, &container, anchor.as_ref(), sc);
                    }
                }),
                EffectScheduler::Queue,
                false,
            )
        });
        effect.set_allow_recurse(true);
        instance.set_render_effect(effect.clone());
        effect.run();
    }

    /// The body of a component's render effect, covering both first mount
    /// and updates. `allow_recurse` is off around hooks (a hook writing
    /// reactive state must not re-enter this component mid-render) and on
    /// around the render call itself.
    fn component_update(
        &self,
        instance: &Rc<Instance>,
        initial_container: &Node,
        initial_anchor: Option<&Node>,
        sc: &mut SignalContext,
    ) {
        if instance.is_unmounted() {
            return;
        }
        let Some(effect) = crate::core::innermost_running() else {
            return;
        };
        if !instance.is_mounted() {
            effect.set_allow_recurse(false);
            instance.run_hooks(HookPhase::BeforeMount);
            effect.set_allow_recurse(true);
            let tree = instance.render(sc);
            self.patch(None, &tree, initial_container, initial_anchor, Some(instance));
            instance.vnode().set_el(tree.el());
            instance.set_sub_tree(tree);
            instance.set_mounted();
            self.queue_post_hooks(instance, HookPhase::Mounted);
        } else {
            effect.set_allow_recurse(false);
            if let Some(next) = instance.take_next() {
                instance.set_vnode(next.clone());
                instance.assign_props(&next);
                // Pre-flush watchers observing the new props run before the
                // re-render; this instance's own job is excluded.
                scheduler::flush_pre_cbs(Some(instance.uid()));
            }
            instance.run_hooks(HookPhase::BeforeUpdate);
            effect.set_allow_recurse(true);
            let tree = instance.render(sc);
            let Some(prev) = instance.sub_tree() else {
                return;
            };
            let container = match self.host_parent(&prev) {
                Some(container) => container,
                None => initial_container.clone(),
            };
            let anchor = self.next_host_node(&prev);
            self.patch(Some(&prev), &tree, &container, anchor.as_ref(), Some(instance));
            instance.vnode().set_el(tree.el());
            instance.set_sub_tree(tree);
            self.queue_post_hooks(instance, HookPhase::Updated);
        }
    }

    fn queue_post_hooks(&self, instance: &Rc<Instance>, phase: HookPhase) {
        scheduler::queue_post_cb(Job {
            id: instance.uid(),
            allow_recurse: true,
            task: match phase {
                HookPhase::Mounted => {
                    Task::from_weak_fn(instance, |i| i.run_hooks(HookPhase::Mounted))
                }
                HookPhase::Updated => {
                    Task::from_weak_fn(instance, |i| i.run_hooks(HookPhase::Updated))
                }
                _ => return,
            },
        });
    }

    pub(crate) fn unmount(&self, vnode: &VNode, remove_dom: bool) {
        match vnode.kind() {
            VNodeKind::Component(_) => self.unmount_component(vnode, remove_dom),
            VNodeKind::Fragment => {
                if let Children::Nodes(children) = vnode.children() {
                    for child in children {
                        self.unmount(child, remove_dom);
                    }
                }
                if remove_dom {
                    if let Some(start) = vnode.el() {
                        self.0.dom.remove(&start);
                    }
                    if let Some(end) = vnode.anchor() {
                        self.0.dom.remove(&end);
                    }
                }
            }
            VNodeKind::Element { .. } => {
                if let Some(node_ref) = vnode.node_ref() {
                    node_ref.assign(None);
                }
                // Descend for hooks and refs; the children's host nodes
                // leave the tree with this element.
                if let Children::Nodes(children) = vnode.children() {
                    for child in children {
                        self.unmount(child, false);
                    }
                }
                if remove_dom {
                    if let Some(el) = vnode.el() {
                        self.0.dom.remove(&el);
                    }
                }
            }
            VNodeKind::Text | VNodeKind::Comment => {
                if remove_dom {
                    if let Some(el) = vnode.el() {
                        self.0.dom.remove(&el);
                    }
                }
            }
        }
    }

    fn unmount_component(&self, vnode: &VNode, remove_dom: bool) {
        let Some(instance) = vnode.instance() else {
            return;
        };
        instance.run_hooks(HookPhase::BeforeUnmount);
        instance.scope().stop();
        if let Some(tree) = instance.sub_tree() {
            self.unmount(&tree, remove_dom);
        }
        instance.set_unmounted();
        // The task owns the instance so the unmounted hooks still fire once
        // the caller drops its vnodes; `release` then breaks the
        // instance-vnode cycle so the instance can be freed.
        scheduler::queue_post_cb(Job {
            id: instance.uid(),
            allow_recurse: true,
            task: Task::once(move || {
                instance.run_hooks(HookPhase::Unmounted);
                instance.release();
            }),
        });
        vnode.set_instance(None);
    }

    fn patch_children(
        &self,
        old: &VNode,
        new: &VNode,
        container: &Node,
        anchor: Option<&Node>,
        parent: Option<&Rc<Instance>>,
    ) {
        match (old.children(), new.children()) {
            (Children::Nodes(oc), Children::Nodes(nc)) => {
                // Any key in either list routes through the keyed diff;
                // keyless nodes inside it match by position and type.
                if nc.iter().any(|n| n.key().is_some()) || oc.iter().any(|n| n.key().is_some()) {
                    self.patch_keyed_children(oc, nc, container, anchor, parent);
                } else {
                    self.patch_unkeyed_children(oc, nc, container, anchor, parent);
                }
            }
            (Children::Nodes(oc), Children::Text(text)) => {
                for child in oc {
                    self.unmount(child, true);
                }
                self.set_element_text(container, text);
            }
            (Children::Nodes(oc), Children::None) => {
                for child in oc {
                    self.unmount(child, true);
                }
            }
            (Children::Text(old_text), Children::Text(text)) => {
                if old_text != text {
                    self.set_element_text(container, text);
                }
            }
            (Children::Text(_), Children::Nodes(nc)) => {
                self.clear_element_children(container);
                for child in nc {
                    self.patch(None, child, container, anchor, parent);
                }
            }
            (Children::Text(_), Children::None) => {
                self.clear_element_children(container);
            }
            (Children::None, Children::Nodes(nc)) => {
                for child in nc {
                    self.patch(None, child, container, anchor, parent);
                }
            }
            (Children::None, Children::Text(text)) => {
                self.set_element_text(container, text);
            }
            (Children::None, Children::None) => {}
        }
    }

    /// Replaces an element's content with a single text node, reusing one
    /// that is already there.
    fn set_element_text(&self, container: &Node, text: &str) {
        if container.child_count() == 1 {
            if let Some(child) = container.child(0) {
                if child.is_text() {
                    if child.text().as_deref() != Some(text) {
                        self.0.dom.set_text(&child, text);
                    }
                    return;
                }
            }
        }
        self.clear_element_children(container);
        let node = self.0.dom.create_text(text);
        self.0.dom.insert(container, &node, None);
    }

    fn clear_element_children(&self, container: &Node) {
        while let Some(child) = container.child(0) {
            self.0.dom.remove(&child);
        }
    }

    fn patch_unkeyed_children(
        &self,
        oc: &[VNode],
        nc: &[VNode],
        container: &Node,
        anchor: Option<&Node>,
        parent: Option<&Rc<Instance>>,
    ) {
        let common = oc.len().min(nc.len());
        for i in 0..common {
            self.patch(Some(&oc[i]), &nc[i], container, anchor, parent);
        }
        if oc.len() > common {
            for child in &oc[common..] {
                self.unmount(child, true);
            }
        } else {
            for child in &nc[common..] {
                self.patch(None, child, container, anchor, parent);
            }
        }
    }

    /// Keyed reconciliation: front/back skims, then a keyed middle diff with
    /// LIS-based move minimization. Scratch buffers live in a [`Bump`].
    fn patch_keyed_children(
        &self,
        oc: &[VNode],
        nc: &[VNode],
        container: &Node,
        parent_anchor: Option<&Node>,
        parent: Option<&Rc<Instance>>,
    ) {
        let bump = Bump::new();
        let mut i = 0usize;
        let mut e1 = oc.len() as isize - 1;
        let mut e2 = nc.len() as isize - 1;

        // 1. leading run
        while (i as isize) <= e1 && (i as isize) <= e2 {
            let (o, n) = (&oc[i], &nc[i]);
            if !o.same_type(n) {
                break;
            }
            self.patch(Some(o), n, container, parent_anchor, parent);
            i += 1;
        }
        // 2. trailing run
        while (i as isize) <= e1 && (i as isize) <= e2 {
            let (o, n) = (&oc[e1 as usize], &nc[e2 as usize]);
            if !o.same_type(n) {
                break;
            }
            self.patch(Some(o), n, container, parent_anchor, parent);
            e1 -= 1;
            e2 -= 1;
        }

        if (i as isize) > e1 {
            // 3. only mounts remain
            if (i as isize) <= e2 {
                let next = (e2 + 1) as usize;
                let anchor = if next < nc.len() {
                    nc[next].el()
                } else {
                    parent_anchor.cloned()
                };
                for idx in i..=(e2 as usize) {
                    self.patch(None, &nc[idx], container, anchor.as_ref(), parent);
                }
            }
        } else if (i as isize) > e2 {
            // 4. only unmounts remain
            for idx in i..=(e1 as usize) {
                self.unmount(&oc[idx], true);
            }
        } else {
            // 5. keyed middle: match old nodes to new indices
            let s1 = i;
            let s2 = i;
            let mut key_to_new: HashMap<&Key, usize> = HashMap::new();
            for (idx, n) in nc.iter().enumerate().take(e2 as usize + 1).skip(s2) {
                if let Some(key) = n.key() {
                    key_to_new.insert(key, idx);
                }
            }
            let count = e2 as usize - s2 + 1;
            // zero = the new node has no prior match and must be mounted
            let mut new_index_to_old =
                bumpalo::collections::Vec::from_iter_in(std::iter::repeat(0usize).take(count), &bump);
            let mut patched = 0usize;
            let mut max_new_index = 0usize;
            let mut moved = false;
            for (idx, o) in oc.iter().enumerate().take(e1 as usize + 1).skip(s1) {
                if patched >= count {
                    self.unmount(o, true);
                    continue;
                }
                let new_index = match o.key() {
                    Some(key) => key_to_new.get(key).copied(),
                    None => (s2..=(e2 as usize))
                        .find(|&j| new_index_to_old[j - s2] == 0 && o.same_type(&nc[j])),
                };
                match new_index {
                    None => self.unmount(o, true),
                    Some(j) => {
                        new_index_to_old[j - s2] = idx + 1;
                        if j >= max_new_index {
                            max_new_index = j;
                        } else {
                            moved = true;
                        }
                        self.patch(Some(o), &nc[j], container, parent_anchor, parent);
                        patched += 1;
                    }
                }
            }
            // 6. stable subsequence: matched nodes already in relative order
            let seq = if moved {
                longest_increasing_subsequence(&new_index_to_old)
            } else {
                Vec::new()
            };
            let mut seq_tail = seq.len() as isize - 1;
            // 7. back to front: mount fresh, move off-sequence, skip stable
            for pos in (0..count).rev() {
                let j = s2 + pos;
                let n = &nc[j];
                let anchor = if j + 1 < nc.len() {
                    nc[j + 1].el()
                } else {
                    parent_anchor.cloned()
                };
                if new_index_to_old[pos] == 0 {
                    self.patch(None, n, container, anchor.as_ref(), parent);
                } else if moved {
                    if seq_tail < 0 || pos != seq[seq_tail as usize] {
                        self.move_vnode(n, container, anchor.as_ref());
                    } else {
                        seq_tail -= 1;
                    }
                }
            }
        }
    }

    pub(crate) fn move_vnode(&self, vnode: &VNode, container: &Node, anchor: Option<&Node>) {
        match vnode.kind() {
            VNodeKind::Component(_) => {
                if let Some(instance) = vnode.instance() {
                    if let Some(tree) = instance.sub_tree() {
                        self.move_vnode(&tree, container, anchor);
                    }
                }
            }
            VNodeKind::Fragment => {
                self.0.dom.insert(container, &host_el(vnode), anchor);
                if let Children::Nodes(children) = vnode.children() {
                    for child in children {
                        self.move_vnode(child, container, anchor);
                    }
                }
                if let Some(end) = vnode.anchor() {
                    self.0.dom.insert(container, &end, anchor);
                }
            }
            _ => {
                if let Some(el) = vnode.el() {
                    self.0.dom.insert(container, &el, anchor);
                }
            }
        }
    }

    fn host_parent(&self, vnode: &VNode) -> Option<Node> {
        self.0.dom.parent(&vnode.el()?)
    }

    /// The host node right after `vnode`'s last host node; the anchor for
    /// mounting a replacement in the same position.
    fn next_host_node(&self, vnode: &VNode) -> Option<Node> {
        match vnode.kind() {
            VNodeKind::Fragment => self.0.dom.next_sibling(&vnode.anchor()?),
            VNodeKind::Component(_) => {
                let instance = vnode.instance()?;
                self.next_host_node(&instance.sub_tree()?)
            }
            _ => self.0.dom.next_sibling(&vnode.el()?),
        }
    }
}

/// Shallow prop compare deciding whether a parent re-render forces a child
/// component update. Children are always assumed changed when present.
pub(crate) fn should_update_component(old: &VNode, new: &VNode) -> bool {
    let old_props = old.props();
    let new_props = new.props();
    if old_props.len() != new_props.len() {
        return true;
    }
    for (name, value) in new_props {
        match old_props.iter().find(|(n, _)| n == name).map(|(_, v)| v) {
            Some(old_value) if !value.has_changed(old_value) => {}
            _ => return true,
        }
    }
    !matches!(
        (old.children(), new.children()),
        (Children::None, Children::None)
    )
}

/// Indices of one longest strictly increasing subsequence of `arr`, with
/// zero entries skipped.
pub(crate) fn longest_increasing_subsequence(arr: &[usize]) -> Vec<usize> {
    let mut prev = vec![0usize; arr.len()];
    // tails[k] = index of the smallest known tail of an increasing run of
    // length k + 1
    let mut tails: Vec<usize> = Vec::new();
    for (i, &v) in arr.iter().enumerate() {
        if v == 0 {
            continue;
        }
        if let Some(&last) = tails.last() {
            if arr[last] < v {
                prev[i] = last;
                tails.push(i);
                continue;
            }
            let mut lo = 0usize;
            let mut hi = tails.len() - 1;
            while lo < hi {
                let mid = (lo + hi) / 2;
                if arr[tails[mid]] < v {
                    lo = mid + 1;
                } else {
                    hi = mid;
                }
            }
            if v < arr[tails[lo]] {
                if lo > 0 {
                    prev[i] = tails[lo - 1];
                }
                tails[lo] = i;
            }
        } else {
            tails.push(i);
        }
    }
    let mut result = vec![0usize; tails.len()];
    if let Some(&last) = tails.last() {
        let mut idx = last;
        for slot in result.iter_mut().rev() {
            *slot = idx;
            idx = prev[idx];
        }
    }
    result
}
