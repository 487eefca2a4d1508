use std::{mem::take, rc::Rc};

use crate::core::RawEffect;

/// Handle that keeps an effect or watcher alive; dropping it unsubscribes.
#[derive(Default)]
#[must_use]
pub struct Subscription(RawSubscription);

impl Subscription {
    pub fn empty() -> Self {
        Subscription(RawSubscription::Empty)
    }
    pub fn from_fn(f: impl FnOnce() + 'static) -> Self {
        Subscription(RawSubscription::Fn(Box::new(f)))
    }
    pub(crate) fn from_effect(effect: Rc<RawEffect>) -> Self {
        Subscription(RawSubscription::Effect(effect))
    }

    /// Detaches the subscription so the underlying effect lives for the
    /// rest of the thread (or until its owning scope stops).
    pub fn leak(mut self) {
        if let RawSubscription::Effect(_) = &self.0 {
            std::mem::forget(take(&mut self.0));
        } else {
            take(&mut self.0);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        match take(&mut self.0) {
            RawSubscription::Empty => {}
            RawSubscription::Fn(f) => f(),
            RawSubscription::Effect(effect) => effect.stop(),
        }
    }
}

#[derive(Default)]
enum RawSubscription {
    #[default]
    Empty,
    Fn(Box<dyn FnOnce()>),
    Effect(Rc<RawEffect>),
}
