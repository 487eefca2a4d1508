use std::{
    any::Any,
    cell::{Cell, RefCell},
    collections::HashMap,
    rc::{Rc, Weak},
};

use crate::{
    core::{next_id, EffectScope, RawEffect, SignalContext},
    error::Error,
    reactive::ReactiveMap,
    vnode::{comment, PropValue, VNode, VNodeKind},
};

#[cfg(test)]
mod tests;

/// The render function produced by [`Component::setup`]; re-invoked by the
/// component's render effect, with reactive reads tracked.
pub type RenderFn = Box<dyn FnMut(&mut SignalContext) -> Result<VNode, Error>>;

/// A component definition.
///
/// Definitions are shared via `Rc`; two vnodes render "the same component"
/// only when they hold the same allocation. `setup` runs once per mounted
/// instance, synchronously and with no tracking context, and returns the
/// render function.
pub trait Component: 'static {
    /// Declared prop names. Vnode props not listed here fall through as
    /// attrs.
    fn props(&self) -> &'static [&'static str] {
        &[]
    }

    fn setup(self: Rc<Self>, cx: &mut SetupContext) -> RenderFn;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum HookPhase {
    BeforeMount,
    Mounted,
    BeforeUpdate,
    Updated,
    BeforeUnmount,
    Unmounted,
}

const HOOK_PHASES: usize = 6;

/// Per-mount state of a component.
pub struct Instance {
    uid: u32,
    def: Rc<dyn Component>,
    parent: Weak<Instance>,
    /// The component vnode currently representing this instance in its
    /// parent's tree.
    vnode: RefCell<VNode>,
    props: ReactiveMap<String, PropValue>,
    /// Vnode props not declared by the definition; merged onto a single
    /// root element.
    attrs: ReactiveMap<String, PropValue>,
    scope: EffectScope,
    render_fn: RefCell<Option<RenderFn>>,
    render_effect: RefCell<Option<Rc<RawEffect>>>,
    sub_tree: RefCell<Option<VNode>>,
    /// Replacement vnode from a parent-driven update, consumed by the next
    /// render effect run.
    next: RefCell<Option<VNode>>,
    hooks: [RefCell<Vec<Rc<dyn Fn()>>>; HOOK_PHASES],
    is_mounted: Cell<bool>,
    is_unmounted: Cell<bool>,
    provides: RefCell<HashMap<String, Rc<dyn Any>>>,
}

impl Instance {
    pub(crate) fn new(vnode: VNode, parent: Option<&Rc<Instance>>) -> Rc<Instance> {
        let def = match vnode.kind() {
            VNodeKind::Component(def) => def.clone(),
            _ => unreachable!("component instance for a non-component vnode"),
        };
        let instance = Rc::new(Instance {
            uid: next_id(),
            def,
            parent: parent.map(Rc::downgrade).unwrap_or_default(),
            vnode: RefCell::new(vnode.clone()),
            props: ReactiveMap::new(),
            attrs: ReactiveMap::new(),
            scope: crate::core::effect_scope(true),
            render_fn: RefCell::new(None),
            render_effect: RefCell::new(None),
            sub_tree: RefCell::new(None),
            next: RefCell::new(None),
            hooks: Default::default(),
            is_mounted: Cell::new(false),
            is_unmounted: Cell::new(false),
            provides: RefCell::new(HashMap::new()),
        });
        instance.assign_props(&vnode);
        instance
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }
    pub fn is_mounted(&self) -> bool {
        self.is_mounted.get()
    }
    pub fn is_unmounted(&self) -> bool {
        self.is_unmounted.get()
    }
    pub(crate) fn set_mounted(&self) {
        self.is_mounted.set(true);
    }
    pub(crate) fn set_unmounted(&self) {
        self.is_unmounted.set(true);
    }

    pub fn props(&self) -> &ReactiveMap<String, PropValue> {
        &self.props
    }
    pub fn attrs(&self) -> &ReactiveMap<String, PropValue> {
        &self.attrs
    }
    pub(crate) fn scope(&self) -> &EffectScope {
        &self.scope
    }
    pub(crate) fn vnode(&self) -> VNode {
        self.vnode.borrow().clone()
    }
    pub(crate) fn set_vnode(&self, vnode: VNode) {
        *self.vnode.borrow_mut() = vnode;
    }
    pub(crate) fn sub_tree(&self) -> Option<VNode> {
        self.sub_tree.borrow().clone()
    }
    pub(crate) fn set_sub_tree(&self, tree: VNode) {
        *self.sub_tree.borrow_mut() = Some(tree);
    }
    pub(crate) fn set_next(&self, vnode: VNode) {
        *self.next.borrow_mut() = Some(vnode);
    }
    pub(crate) fn take_next(&self) -> Option<VNode> {
        self.next.borrow_mut().take()
    }
    pub(crate) fn render_effect(&self) -> Option<Rc<RawEffect>> {
        self.render_effect.borrow().clone()
    }
    pub(crate) fn set_render_effect(&self, effect: Rc<RawEffect>) {
        *self.render_effect.borrow_mut() = Some(effect);
    }

    /// Splits a component vnode's props into declared props and fall-through
    /// attrs, removing entries the new vnode no longer carries. Map writes
    /// deduplicate per value, so an unchanged prop does not invalidate its
    /// readers.
    pub(crate) fn assign_props(&self, vnode: &VNode) {
        let declared = self.def.props();
        let mut seen_props = Vec::new();
        let mut seen_attrs = Vec::new();
        for (name, value) in vnode.props() {
            if declared.contains(&name.as_str()) {
                self.props.insert(name.clone(), value.clone());
                seen_props.push(name.as_str());
            } else {
                self.attrs.insert(name.clone(), value.clone());
                seen_attrs.push(name.as_str());
            }
        }
        let mut sc = SignalContext::detached();
        for stale in self
            .props
            .keys(&mut sc)
            .into_iter()
            .filter(|k| !seen_props.contains(&k.as_str()))
        {
            self.props.remove(&stale);
        }
        for stale in self
            .attrs
            .keys(&mut sc)
            .into_iter()
            .filter(|k| !seen_attrs.contains(&k.as_str()))
        {
            self.attrs.remove(&stale);
        }
    }

    pub(crate) fn run_setup(self: &Rc<Self>) {
        let def = self.def.clone();
        let render_fn = self.scope.run(|| {
            let mut cx = SetupContext { instance: self };
            def.setup(&mut cx)
        });
        *self.render_fn.borrow_mut() = Some(render_fn);
    }

    /// Invokes the render function. A render error is logged and replaced
    /// with a comment placeholder so the rest of the tree keeps rendering.
    /// Fall-through attrs are merged onto a single root element.
    pub(crate) fn render(&self, sc: &mut SignalContext) -> VNode {
        let result = match self.render_fn.borrow_mut().as_mut() {
            Some(render) => render(sc),
            None => return comment(""),
        };
        let tree = match result {
            Ok(tree) => tree,
            Err(error) => {
                tracing::error!(uid = self.uid, %error, "render function failed");
                return comment("");
            }
        };
        let attrs = self.attrs.entries(sc);
        if !attrs.is_empty() {
            if let VNodeKind::Element { .. } = tree.kind() {
                return tree.with_extra_props(attrs);
            }
        }
        tree
    }

    pub(crate) fn add_hook(&self, phase: HookPhase, f: Rc<dyn Fn()>) {
        self.hooks[phase as usize].borrow_mut().push(f);
    }

    /// Hooks are snapshotted first; a hook may register further hooks
    /// without invalidating the pass.
    pub(crate) fn run_hooks(&self, phase: HookPhase) {
        let hooks: Vec<Rc<dyn Fn()>> = self.hooks[phase as usize].borrow().clone();
        for hook in hooks {
            hook();
        }
    }

    /// Invokes the `on:{event}` handler prop, if the parent supplied one.
    pub fn emit(&self, event: &str, payload: &PropValue) {
        let name = format!("on:{event}");
        let mut sc = SignalContext::detached();
        let handler = self
            .props
            .get_cloned(&mut sc, &name)
            .or_else(|| self.attrs.get_cloned(&mut sc, &name));
        match handler {
            Some(PropValue::Handler(handler)) => handler.call(payload),
            Some(_) | None => {
                tracing::warn!(uid = self.uid, event, "emit without a handler prop");
            }
        }
    }

    /// Drops everything that can point back at this instance, after the
    /// unmounted hooks have run. The stored vnode holds this instance
    /// through its `instance` slot, so leaving it in place would keep the
    /// whole retained subtree alive for the life of the thread.
    pub(crate) fn release(&self) {
        *self.vnode.borrow_mut() = comment("");
        *self.sub_tree.borrow_mut() = None;
        *self.next.borrow_mut() = None;
        *self.render_fn.borrow_mut() = None;
        *self.render_effect.borrow_mut() = None;
        for hooks in &self.hooks {
            hooks.borrow_mut().clear();
        }
    }

    fn inject_from_ancestors(&self, key: &str) -> Option<Rc<dyn Any>> {
        let mut current = self.parent.upgrade();
        while let Some(instance) = current {
            if let Some(value) = instance.provides.borrow().get(key) {
                return Some(value.clone());
            }
            current = instance.parent.upgrade();
        }
        None
    }
}

/// Passed to [`Component::setup`]; registers lifecycle hooks and wires the
/// instance into the provide/inject chain.
pub struct SetupContext<'a> {
    instance: &'a Rc<Instance>,
}

impl SetupContext<'_> {
    pub fn instance(&self) -> &Rc<Instance> {
        self.instance
    }

    pub fn props(&self) -> ReactiveMap<String, PropValue> {
        self.instance.props.clone()
    }

    pub fn attrs(&self) -> ReactiveMap<String, PropValue> {
        self.instance.attrs.clone()
    }

    pub fn on_before_mount(&mut self, f: impl Fn() + 'static) {
        self.instance.add_hook(HookPhase::BeforeMount, Rc::new(f));
    }
    pub fn on_mounted(&mut self, f: impl Fn() + 'static) {
        self.instance.add_hook(HookPhase::Mounted, Rc::new(f));
    }
    pub fn on_before_update(&mut self, f: impl Fn() + 'static) {
        self.instance.add_hook(HookPhase::BeforeUpdate, Rc::new(f));
    }
    pub fn on_updated(&mut self, f: impl Fn() + 'static) {
        self.instance.add_hook(HookPhase::Updated, Rc::new(f));
    }
    pub fn on_before_unmount(&mut self, f: impl Fn() + 'static) {
        self.instance.add_hook(HookPhase::BeforeUnmount, Rc::new(f));
    }
    pub fn on_unmounted(&mut self, f: impl Fn() + 'static) {
        self.instance.add_hook(HookPhase::Unmounted, Rc::new(f));
    }

    /// Makes `value` injectable by descendants under `key`.
    pub fn provide(&mut self, key: &str, value: Rc<dyn Any>) {
        self.instance
            .provides
            .borrow_mut()
            .insert(key.to_string(), value);
    }

    /// Looks `key` up the ancestor chain, nearest provider first. A
    /// component's own `provide` is visible to descendants, not to itself.
    pub fn inject(&self, key: &str) -> Option<Rc<dyn Any>> {
        self.instance.inject_from_ancestors(key)
    }

    pub fn emit(&self, event: &str, payload: &PropValue) {
        self.instance.emit(event, payload);
    }
}
