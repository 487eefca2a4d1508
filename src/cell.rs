use std::{cell::RefCell, rc::Rc};

use derive_ex::derive_ex;
use serde::{Deserialize, Serialize};

use crate::core::{Dep, SignalContext};


/// Change detection used by writes that deduplicate notifications.
///
/// Mostly equivalent to `!=`, except that the float impls treat NaN as equal
/// to NaN: rewriting NaN into a reactive slot must not re-trigger
/// subscribers forever.
pub trait HasChanged {
    fn has_changed(&self, old: &Self) -> bool;
}

macro_rules! impl_has_changed_by_eq {
    ($($t:ty),* $(,)?) => {
        $(impl HasChanged for $t {
            fn has_changed(&self, old: &Self) -> bool {
                self != old
            }
        })*
    };
}

impl_has_changed_by_eq!(
    (),
    bool,
    char,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    String,
    &'static str,
);

macro_rules! impl_has_changed_float {
    ($($t:ty),* $(,)?) => {
        $(impl HasChanged for $t {
            fn has_changed(&self, old: &Self) -> bool {
                !(self == old || (self.is_nan() && old.is_nan()))
            }
        })*
    };
}

impl_has_changed_float!(f32, f64);

impl<T: HasChanged> HasChanged for Option<T> {
    fn has_changed(&self, old: &Self) -> bool {
        match (self, old) {
            (Some(a), Some(b)) => a.has_changed(b),
            (None, None) => false,
            _ => true,
        }
    }
}

impl<T: PartialEq> HasChanged for Vec<T> {
    fn has_changed(&self, old: &Self) -> bool {
        self != old
    }
}

macro_rules! impl_has_changed_for_tuple {
    ($($t:ident : $i:tt),*) => {
        impl<$($t: HasChanged),*> HasChanged for ($($t,)*) {
            fn has_changed(&self, old: &Self) -> bool {
                $(self.$i.has_changed(&old.$i))||*
            }
        }
    };
}
impl_has_changed_for_tuple!(A: 0, B: 1);
impl_has_changed_for_tuple!(A: 0, B: 1, C: 2);
impl_has_changed_for_tuple!(A: 0, B: 1, C: 2, D: 3);

impl HasChanged for Rc<str> {
    fn has_changed(&self, old: &Self) -> bool {
        !Rc::ptr_eq(self, old) && **self != **old
    }
}

pub(crate) struct RefNode<T: 'static> {
    value: RefCell<T>,
    dep: Dep,
}

impl<T: 'static> RefNode<T> {
    fn new(value: T) -> Rc<Self> {
        Rc::new(Self {
            value: RefCell::new(value),
            dep: Dep::new(),
        })
    }

    fn borrow<'a>(&'a self, sc: &mut SignalContext) -> std::cell::Ref<'a, T> {
        self.dep.track(sc);
        self.value.borrow()
    }

    fn fmt_debug(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result
    where
        T: std::fmt::Debug,
    {
        match self.value.try_borrow() {
            Ok(value) => std::fmt::Debug::fmt(&*value, f),
            Err(_) => write!(f, "<borrowed>"),
        }
    }
}

/// A single-value reactive box.
///
/// Reads through a [`SignalContext`] register a dependency; writes compare
/// against the previous value via [`HasChanged`] and notify subscribers only
/// on a real change.
#[derive_ex(Clone, bound())]
pub struct Ref<T: 'static>(Rc<RefNode<T>>);

impl<T: 'static> Ref<T> {
    pub fn new(value: T) -> Self {
        Self(RefNode::new(value))
    }

    /// Borrows the current value and adds a dependency on this ref.
    pub fn borrow<'a>(&'a self, sc: &mut SignalContext) -> std::cell::Ref<'a, T> {
        self.0.borrow(sc)
    }

    /// Gets the current value and adds a dependency on this ref.
    pub fn get(&self, sc: &mut SignalContext) -> T
    where
        T: Clone,
    {
        self.borrow(sc).clone()
    }

    /// Gets the current value without registering a dependency.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.0.value.borrow().clone()
    }

    /// Sets the value, notifying subscribers only if it changed.
    pub fn set(&self, value: T)
    where
        T: HasChanged,
    {
        let changed = {
            let mut current = self.0.value.borrow_mut();
            if value.has_changed(&current) {
                *current = value;
                true
            } else {
                false
            }
        };
        if changed {
            self.0.dep.trigger();
        }
    }

    /// Edits the value in place; subscribers are always notified.
    pub fn mutate(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.0.value.borrow_mut());
        self.0.dep.trigger();
    }

    /// Returns a read-only view sharing this ref's storage and subscribers.
    pub fn read_only(&self) -> ReadonlyRef<T> {
        ReadonlyRef(self.0.clone())
    }
}

impl<T: Default + 'static> Default for Ref<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt_debug(f)
    }
}

impl<T> Serialize for Ref<T>
where
    T: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        match self.0.value.try_borrow() {
            Ok(value) => T::serialize(&*value, serializer),
            Err(_) => Err(serde::ser::Error::custom("borrowed")),
        }
    }
}

impl<'de, T> Deserialize<'de> for Ref<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Ref<T>, D::Error>
    where
        D: serde::de::Deserializer<'de>,
    {
        T::deserialize(deserializer).map(Ref::new)
    }
}

/// A reactive box that notifies on every write.
///
/// Use it for values that cannot (or should not) be compared; the dedup
/// check of [`Ref::set`] is skipped entirely.
#[derive_ex(Clone, bound())]
pub struct ShallowRef<T: 'static>(Rc<RefNode<T>>);

impl<T: 'static> ShallowRef<T> {
    pub fn new(value: T) -> Self {
        Self(RefNode::new(value))
    }

    pub fn borrow<'a>(&'a self, sc: &mut SignalContext) -> std::cell::Ref<'a, T> {
        self.0.borrow(sc)
    }

    pub fn get(&self, sc: &mut SignalContext) -> T
    where
        T: Clone,
    {
        self.borrow(sc).clone()
    }

    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.0.value.borrow().clone()
    }

    /// Sets the value and notifies subscribers unconditionally.
    pub fn set(&self, value: T) {
        *self.0.value.borrow_mut() = value;
        self.0.dep.trigger();
    }

    pub fn mutate(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.0.value.borrow_mut());
        self.0.dep.trigger();
    }
}

impl<T: Default + 'static> Default for ShallowRef<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ShallowRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt_debug(f)
    }
}

/// Read-only view of a [`Ref`], sharing its storage.
///
/// Two views of the same ref observe the same subscribers and the same
/// value; readonly-ness is enforced by the type, not at runtime.
#[derive_ex(Clone, bound())]
pub struct ReadonlyRef<T: 'static>(Rc<RefNode<T>>);

impl<T: 'static> ReadonlyRef<T> {
    pub fn borrow<'a>(&'a self, sc: &mut SignalContext) -> std::cell::Ref<'a, T> {
        self.0.borrow(sc)
    }

    pub fn get(&self, sc: &mut SignalContext) -> T
    where
        T: Clone,
    {
        self.borrow(sc).clone()
    }

    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.0.value.borrow().clone()
    }

    /// Whether this view and `other` observe the same underlying ref.
    pub fn is_same(&self, other: &ReadonlyRef<T>) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ReadonlyRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt_debug(f)
    }
}
