//! Type-erased effect identifiers.
//!
//! An [`EffectId`] groups subscriptions so they can be cancelled together.
//! Any `Hash + Eq + Debug + Send + Sync + 'static` value can become an id.
//! Integers and strings are stored inline; everything else is boxed behind
//! an [`Arc`] and compared through its own `Eq` impl.
//!
//! ```
//! use scuttle_core::EffectId;
//!
//! #[derive(Debug, Hash, PartialEq, Eq)]
//! struct SearchId;
//!
//! assert_eq!(EffectId::from(1), EffectId::from(1u64));
//! assert_eq!(EffectId::from("search"), EffectId::from(String::from("search")));
//! assert_eq!(EffectId::new(SearchId), EffectId::new(SearchId));
//! assert_ne!(EffectId::new(SearchId), EffectId::of::<SearchId>());
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Object-safe view of a hashable, comparable value.
trait ErasedKey: Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
    fn eq_key(&self, other: &dyn ErasedKey) -> bool;
    fn hash_key(&self, state: &mut dyn Hasher);
    fn fmt_key(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

impl<T> ErasedKey for T
where
    T: Hash + Eq + fmt::Debug + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_key(&self, other: &dyn ErasedKey) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| other == self)
    }

    fn hash_key(&self, mut state: &mut dyn Hasher) {
        TypeId::of::<T>().hash(&mut state);
        self.hash(&mut state);
    }

    fn fmt_key(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Clone)]
enum Repr {
    /// Every primitive integer width shares this representation.
    Int(i128),
    Str(Arc<str>),
    Type { id: TypeId, name: &'static str },
    Value(Arc<dyn ErasedKey>),
}

/// Identifier used to cancel a group of effects.
///
/// Cloning is cheap: inline forms are copied, boxed forms bump a refcount.
#[derive(Clone)]
pub struct EffectId(Repr);

macro_rules! inline_int {
    ($value:expr, $($ty:ty),*) => {{
        let any: &dyn Any = $value;
        $(
            if let Some(n) = any.downcast_ref::<$ty>() {
                return EffectId(Repr::Int(*n as i128));
            }
        )*
    }};
}

impl EffectId {
    /// Wraps an arbitrary hashable value.
    ///
    /// Integers and strings passed here land in the same inline forms the
    /// `From` conversions use, so `EffectId::new(7u8) == EffectId::from(7)`.
    pub fn new<T>(value: T) -> Self
    where
        T: Hash + Eq + fmt::Debug + Send + Sync + 'static,
    {
        inline_int!(&value, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

        let any: &dyn Any = &value;
        if let Some(id) = any.downcast_ref::<EffectId>() {
            return id.clone();
        }
        if let Some(s) = any.downcast_ref::<&'static str>() {
            return Self::from(*s);
        }
        if let Some(s) = any.downcast_ref::<String>() {
            return Self::from(s.as_str());
        }

        Self(Repr::Value(Arc::new(value)))
    }

    /// An id derived from a type alone, for marker types that are never
    /// constructed.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self(Repr::Type {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        })
    }
}

impl PartialEq for EffectId {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Repr::Int(a), Repr::Int(b)) => a == b,
            (Repr::Str(a), Repr::Str(b)) => a == b,
            (Repr::Type { id: a, .. }, Repr::Type { id: b, .. }) => a == b,
            (Repr::Value(a), Repr::Value(b)) => a.eq_key(b.as_ref()),
            _ => false,
        }
    }
}

impl Eq for EffectId {}

impl Hash for EffectId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(&self.0).hash(state);
        match &self.0 {
            Repr::Int(n) => n.hash(state),
            Repr::Str(s) => s.hash(state),
            Repr::Type { id, .. } => id.hash(state),
            Repr::Value(value) => value.hash_key(state),
        }
    }
}

impl fmt::Debug for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EffectId(")?;
        match &self.0 {
            Repr::Int(n) => write!(f, "{n}")?,
            Repr::Str(s) => write!(f, "{s:?}")?,
            Repr::Type { name, .. } => f.write_str(name)?,
            Repr::Value(value) => value.fmt_key(f)?,
        }
        f.write_str(")")
    }
}

macro_rules! from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for EffectId {
                fn from(n: $ty) -> Self {
                    EffectId(Repr::Int(n as i128))
                }
            }
        )*
    };
}

from_int!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl From<&str> for EffectId {
    fn from(s: &str) -> Self {
        EffectId(Repr::Str(Arc::from(s)))
    }
}

impl From<String> for EffectId {
    fn from(s: String) -> Self {
        EffectId(Repr::Str(Arc::from(s)))
    }
}

impl From<&EffectId> for EffectId {
    fn from(id: &EffectId) -> Self {
        id.clone()
    }
}
