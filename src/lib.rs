//! A fine-grained reactive core and a virtual DOM renderer for building UI
//! frameworks.
//!
//! State lives in reactive boxes ([`Ref`], [`Computed`], the collections in
//! [`reactive`]); reads go through a [`SignalContext`] and are tracked,
//! writes schedule dependent effects into a thread-local queue that
//! [`Runtime::update`] drains in registration order. The [`renderer`] builds
//! on the same effects: each mounted component owns a render effect whose
//! output vnode tree is diffed against the previous one with keyed,
//! move-minimizing reconciliation.
//!
//! ```
//! use std::{cell::RefCell, rc::Rc};
//!
//! let mut rt = verdi::Runtime::new();
//! let count = verdi::Ref::new(0);
//! let log = Rc::new(RefCell::new(Vec::new()));
//!
//! let _s = {
//!     let count = count.clone();
//!     let log = log.clone();
//!     verdi::effect(move |sc| log.borrow_mut().push(count.get(sc)))
//! };
//! count.set(1);
//! rt.update();
//! assert_eq!(*log.borrow(), vec![0, 1]);
//! ```

mod cell;
pub mod component;
mod computed;
mod core;
pub mod dom;
pub mod error;
pub mod reactive;
pub mod renderer;
pub mod scheduler;
mod subscription;
pub mod vnode;
pub mod watch;

pub use cell::{HasChanged, ReadonlyRef, Ref, ShallowRef};
pub use component::{Component, RenderFn, SetupContext};
pub use computed::{computed, Computed};
pub use core::{
    effect, effect_scope, effect_sync, on_scope_dispose, EffectScope, Runtime, SignalContext,
};
pub use error::{is_navigation_failure, Error, NavigationFailure};
pub use renderer::Renderer;
pub use scheduler::{flush_count, next_tick};
pub use subscription::Subscription;
pub use vnode::{VNode, VNodeKind};
pub use watch::{to_stream, watch, watch_effect, watch_effect_with, FlushMode, WatchOptions};
