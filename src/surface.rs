//! The delegation surface: everything a handle can do by forcing itself and
//! applying the real operation to the value it resolves to.
//!
//! [`Promise`] is the one primitive a handle must provide. [`Surface`] is
//! written once against it and supplies a default for every operation, so a
//! handle type gets the whole set with `impl Surface for MyHandle {}` and can
//! still replace individual operations by defining them in that impl. The
//! [`delegate!`](crate::delegate) macro then emits the std operator traits
//! (`+`, `==`, `<`, `{}`, `for x in &h`, ...) for the type, each routed through
//! its `Surface` methods.
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};
use std::ops;

use crate::deferred::Deferred;
use crate::error::ForceError;
use crate::invocation::{Callable, Invocation};

/// The forcing primitive shared by every handle type.
///
/// Implementations must follow the read-once contract: the computation
/// behind the handle runs at most once, the first outcome is cached, and
/// every later call returns that same value or that same error.
pub trait Promise {
    /// The type of the value this handle resolves to.
    type Value;

    /// Runs or waits for the computation and returns its outcome.
    fn force(&self) -> Result<&Self::Value, ForceError>;

    /// Returns `true` once the outcome is cached. Never blocks.
    fn is_resolved(&self) -> bool;
}

/// An operand of a delegated binary operation.
///
/// Handles resolve by forcing themselves (the value is cloned out); plain
/// values resolve to themselves. [`force_value`](crate::force_value) is a
/// thin wrapper over this trait.
pub trait Operand {
    type Value;

    fn resolve(&self) -> Result<Self::Value, ForceError>;
}

impl<O> Operand for &O
where
    O: Operand + ?Sized,
{
    type Value = O::Value;

    fn resolve(&self) -> Result<Self::Value, ForceError> {
        (**self).resolve()
    }
}

impl<'a> Operand for &'a str {
    type Value = &'a str;

    fn resolve(&self) -> Result<&'a str, ForceError> {
        Ok(self)
    }
}

impl<T: Clone> Operand for Vec<T> {
    type Value = Vec<T>;

    fn resolve(&self) -> Result<Vec<T>, ForceError> {
        Ok(self.clone())
    }
}

impl<T: Clone> Operand for Option<T> {
    type Value = Option<T>;

    fn resolve(&self) -> Result<Option<T>, ForceError> {
        Ok(self.clone())
    }
}

/// Implements [`Operand`] for plain (non-handle) types, which resolve to a
/// clone of themselves. Use it for your own types that appear on the right
/// of a delegated operation.
///
/// ```
/// #[derive(Clone)]
/// struct Meters(f64);
///
/// deferral::plain_operand!(Meters);
/// ```
#[macro_export]
macro_rules! plain_operand {
    ($($ty:ty),* $(,)?) => {$(
        impl $crate::Operand for $ty {
            type Value = $ty;

            #[inline]
            fn resolve(&self) -> ::core::result::Result<$ty, $crate::ForceError> {
                ::core::result::Result::Ok(::core::clone::Clone::clone(self))
            }
        }
    )*};
}

plain_operand!(
    i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, bool, char, (),
    String,
);

/// Boolean coercion: whether a value counts as "set".
pub trait Truthy {
    fn truthy(&self) -> bool;
}

macro_rules! truthy_nonzero {
    ($($ty:ty => $zero:expr),* $(,)?) => {$(
        impl Truthy for $ty {
            fn truthy(&self) -> bool {
                *self != $zero
            }
        }
    )*};
}

truthy_nonzero!(
    i8 => 0, i16 => 0, i32 => 0, i64 => 0, i128 => 0, isize => 0,
    u8 => 0, u16 => 0, u32 => 0, u64 => 0, u128 => 0, usize => 0,
    f32 => 0.0, f64 => 0.0,
);

impl Truthy for bool {
    fn truthy(&self) -> bool {
        *self
    }
}

impl Truthy for () {
    fn truthy(&self) -> bool {
        false
    }
}

impl<T> Truthy for Option<T> {
    fn truthy(&self) -> bool {
        self.is_some()
    }
}

impl<T: Len + ?Sized> Truthy for T {
    fn truthy(&self) -> bool {
        self.len() != 0
    }
}

/// Number of items in a container.
pub trait Len {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

macro_rules! impl_len {
    ($([$($gen:tt)*] $ty:ty),* $(,)?) => {$(
        impl<$($gen)*> Len for $ty {
            #[inline]
            fn len(&self) -> usize {
                <$ty>::len(self)
            }
        }
    )*};
}

impl_len!(
    [] str,
    [] String,
    [T] [T],
    [T] Vec<T>,
    [T] VecDeque<T>,
    [K, V, S] HashMap<K, V, S>,
    [K, V] BTreeMap<K, V>,
    [T, S] HashSet<T, S>,
    [T] BTreeSet<T>,
);

impl<T, const N: usize> Len for [T; N] {
    fn len(&self) -> usize {
        N
    }
}

/// Membership test: `item in container`.
pub trait Contains<Q> {
    fn contains_item(&self, item: &Q) -> bool;
}

impl<T: PartialEq<Q>, Q> Contains<Q> for Vec<T> {
    fn contains_item(&self, item: &Q) -> bool {
        self.iter().any(|x| *x == *item)
    }
}

impl<T: PartialEq<Q>, Q> Contains<Q> for VecDeque<T> {
    fn contains_item(&self, item: &Q) -> bool {
        self.iter().any(|x| *x == *item)
    }
}

impl<T: PartialEq<Q>, Q, const N: usize> Contains<Q> for [T; N] {
    fn contains_item(&self, item: &Q) -> bool {
        self.iter().any(|x| *x == *item)
    }
}

impl<T: Eq + Hash, S: BuildHasher> Contains<T> for HashSet<T, S> {
    fn contains_item(&self, item: &T) -> bool {
        self.contains(item)
    }
}

impl<T: Ord> Contains<T> for BTreeSet<T> {
    fn contains_item(&self, item: &T) -> bool {
        self.contains(item)
    }
}

impl<K: Eq + Hash, V, S: BuildHasher> Contains<K> for HashMap<K, V, S> {
    fn contains_item(&self, item: &K) -> bool {
        self.contains_key(item)
    }
}

impl<K: Ord, V> Contains<K> for BTreeMap<K, V> {
    fn contains_item(&self, item: &K) -> bool {
        self.contains_key(item)
    }
}

// String-keyed collections also answer for string slices.

impl<'a, S: BuildHasher> Contains<&'a str> for HashSet<String, S> {
    fn contains_item(&self, item: &&'a str) -> bool {
        self.contains(*item)
    }
}

impl<'a> Contains<&'a str> for BTreeSet<String> {
    fn contains_item(&self, item: &&'a str) -> bool {
        self.contains(*item)
    }
}

impl<'a, V, S: BuildHasher> Contains<&'a str> for HashMap<String, V, S> {
    fn contains_item(&self, item: &&'a str) -> bool {
        self.contains_key(*item)
    }
}

impl<'a, V> Contains<&'a str> for BTreeMap<String, V> {
    fn contains_item(&self, item: &&'a str) -> bool {
        self.contains_key(*item)
    }
}

impl Contains<String> for String {
    fn contains_item(&self, item: &String) -> bool {
        self.contains(item.as_str())
    }
}

impl<'a> Contains<&'a str> for String {
    fn contains_item(&self, item: &&'a str) -> bool {
        self.contains(*item)
    }
}

impl Contains<char> for String {
    fn contains_item(&self, item: &char) -> bool {
        self.contains(*item)
    }
}

// Forces `self`, resolves the other operand, applies the std operator. The
// reflected method puts `self` on the right: `h.try_radd(3)` is `3 + h`.
macro_rules! binary {
    ($($Trait:ident $method:ident $try:ident $rtry:ident;)*) => {$(
        fn $try<R>(
            &self,
            rhs: R,
        ) -> Result<<Self::Value as ops::$Trait<R::Value>>::Output, ForceError>
        where
            R: Operand,
            Self::Value: Clone + ops::$Trait<R::Value>,
        {
            let lhs = self.force()?.clone();
            let rhs = rhs.resolve()?;
            Ok(ops::$Trait::$method(lhs, rhs))
        }

        fn $rtry<L>(
            &self,
            lhs: L,
        ) -> Result<<L::Value as ops::$Trait<Self::Value>>::Output, ForceError>
        where
            L: Operand,
            L::Value: ops::$Trait<Self::Value>,
            Self::Value: Clone,
        {
            let rhs = self.force()?.clone();
            let lhs = lhs.resolve()?;
            Ok(ops::$Trait::$method(lhs, rhs))
        }
    )*};
}

/// Every operation a handle supports, written once against [`Promise::force`].
///
/// Each method forces `self`, resolves the other operand if there is one,
/// and returns the plain result of the real operation, never a new handle.
/// A forcing failure comes back unchanged as the `Err` side.
///
/// Binary operators need `Self::Value: Trait<R::Value>`. That impl may come
/// from the right-hand type's crate (`impl Add<Meters> for f64` written next
/// to `Meters`), which is how a handle wrapping an `f64` can be added to a
/// `Meters` even though `f64` itself knows nothing about it.
pub trait Surface: Promise {
    binary! {
        Add add try_add try_radd;
        Sub sub try_sub try_rsub;
        Mul mul try_mul try_rmul;
        Div div try_div try_rdiv;
        Rem rem try_rem try_rrem;
        BitAnd bitand try_bitand try_rbitand;
        BitOr bitor try_bitor try_rbitor;
        BitXor bitxor try_bitxor try_rbitxor;
        Shl shl try_shl try_rshl;
        Shr shr try_shr try_rshr;
    }

    fn try_neg(&self) -> Result<<Self::Value as ops::Neg>::Output, ForceError>
    where
        Self::Value: Clone + ops::Neg,
    {
        Ok(-self.force()?.clone())
    }

    fn try_not(&self) -> Result<<Self::Value as ops::Not>::Output, ForceError>
    where
        Self::Value: Clone + ops::Not,
    {
        Ok(!self.force()?.clone())
    }

    fn try_eq<R>(&self, other: R) -> Result<bool, ForceError>
    where
        R: Operand,
        Self::Value: PartialEq<R::Value>,
    {
        let lhs = self.force()?;
        Ok(*lhs == other.resolve()?)
    }

    fn try_ne<R>(&self, other: R) -> Result<bool, ForceError>
    where
        R: Operand,
        Self::Value: PartialEq<R::Value>,
    {
        self.try_eq(other).map(|eq| !eq)
    }

    fn try_partial_cmp<R>(&self, other: R) -> Result<Option<Ordering>, ForceError>
    where
        R: Operand,
        Self::Value: PartialOrd<R::Value>,
    {
        let lhs = self.force()?;
        Ok(PartialOrd::partial_cmp(lhs, &other.resolve()?))
    }

    fn try_lt<R>(&self, other: R) -> Result<bool, ForceError>
    where
        R: Operand,
        Self::Value: PartialOrd<R::Value>,
    {
        let lhs = self.force()?;
        Ok(*lhs < other.resolve()?)
    }

    fn try_le<R>(&self, other: R) -> Result<bool, ForceError>
    where
        R: Operand,
        Self::Value: PartialOrd<R::Value>,
    {
        let lhs = self.force()?;
        Ok(*lhs <= other.resolve()?)
    }

    fn try_gt<R>(&self, other: R) -> Result<bool, ForceError>
    where
        R: Operand,
        Self::Value: PartialOrd<R::Value>,
    {
        let lhs = self.force()?;
        Ok(*lhs > other.resolve()?)
    }

    fn try_ge<R>(&self, other: R) -> Result<bool, ForceError>
    where
        R: Operand,
        Self::Value: PartialOrd<R::Value>,
    {
        let lhs = self.force()?;
        Ok(*lhs >= other.resolve()?)
    }

    fn try_cmp<R>(&self, other: R) -> Result<Ordering, ForceError>
    where
        R: Operand<Value = Self::Value>,
        Self::Value: Ord,
    {
        let lhs = self.force()?;
        Ok(Ord::cmp(lhs, &other.resolve()?))
    }

    fn try_hash<H: Hasher>(&self, state: &mut H) -> Result<(), ForceError>
    where
        Self::Value: Hash,
    {
        Hash::hash(self.force()?, state);
        Ok(())
    }

    /// String conversion of the forced value.
    fn try_display(&self) -> Result<String, ForceError>
    where
        Self::Value: fmt::Display,
    {
        Ok(self.force()?.to_string())
    }

    /// Debug representation of the forced value.
    fn try_debug(&self) -> Result<String, ForceError>
    where
        Self::Value: fmt::Debug,
    {
        Ok(format!("{:?}", self.force()?))
    }

    /// Backs the generated `Display` impl.
    ///
    /// # Panics
    /// Panics if forcing fails, as `Display` has no way to report it.
    fn fmt_display(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    where
        Self::Value: fmt::Display,
    {
        fmt::Display::fmt(expect_forced(self.force()), f)
    }

    /// Backs the generated `Debug` impl. A failed handle is shown as
    /// `Failed(..)` instead of panicking.
    fn fmt_debug(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    where
        Self::Value: fmt::Debug,
    {
        match self.force() {
            Ok(value) => fmt::Debug::fmt(value, f),
            Err(err) => f.debug_tuple("Failed").field(&err.to_string()).finish(),
        }
    }

    fn try_truthy(&self) -> Result<bool, ForceError>
    where
        Self::Value: Truthy,
    {
        Ok(self.force()?.truthy())
    }

    fn try_len(&self) -> Result<usize, ForceError>
    where
        Self::Value: Len,
    {
        Ok(self.force()?.len())
    }

    fn try_contains<R>(&self, item: R) -> Result<bool, ForceError>
    where
        R: Operand,
        Self::Value: Contains<R::Value>,
    {
        let container = self.force()?;
        Ok(container.contains_item(&item.resolve()?))
    }

    fn try_index<I>(&self, index: I) -> Result<&<Self::Value as ops::Index<I>>::Output, ForceError>
    where
        Self::Value: ops::Index<I>,
    {
        Ok(&self.force()?[index])
    }

    fn try_iter<'a>(&'a self) -> Result<<&'a Self::Value as IntoIterator>::IntoIter, ForceError>
    where
        &'a Self::Value: IntoIterator,
    {
        Ok(self.force()?.into_iter())
    }

    /// Calls the forced value with `args`, e.g. `h.try_call((1, 2))` for a
    /// handle resolving to a two-argument function.
    fn try_call<'a, Args>(
        &'a self,
        args: Args,
    ) -> Result<<&'a Self::Value as Callable<Args>>::Output, ForceError>
    where
        &'a Self::Value: Callable<Args>,
    {
        Ok(Callable::invoke(self.force()?, args))
    }

    /// Derives a pure [`Deferred`] that forces this handle and applies `f`.
    ///
    /// Nothing runs until the derived handle is forced. If this handle fails,
    /// the derived one fails with the very same error.
    fn then<U, F, E>(&self, f: F) -> Deferred<U>
    where
        Self: Clone + Send + 'static,
        F: FnOnce(&Self::Value) -> Result<U, E> + Send + 'static,
        E: Into<anyhow::Error>,
    {
        let parent = self.clone();
        Deferred::from_invocation(Invocation::from_outcome(move || {
            let value = parent.force()?;
            f(value).map_err(ForceError::invocation)
        }))
    }
}

/// Unwraps a forcing outcome inside an std trait impl that cannot return an
/// error.
#[track_caller]
pub fn expect_forced<T>(outcome: Result<T, ForceError>) -> T {
    match outcome {
        Ok(value) => value,
        Err(err) => panic!("forcing a deferred value failed: {err}"),
    }
}

/// Emits the std trait impls that make a handle type stand in for its value.
///
/// The type must be generic over exactly its value type (`Name<T>`) and
/// implement [`Surface`] with `Value = T`. For every entry in the operator
/// table below the macro emits three impls. The first is `&Name<T> OP rhs`
/// for any [`Operand`] rhs, where handles are forced and plain values used
/// as-is. The second is `prim OP &Name<T>` for primitive left-hand types, the
/// reflected form. The third covers unary operators. It also emits
/// `Operand`, `PartialEq`/`PartialOrd` (plus the reflected primitive forms),
/// `Eq`, `Ord`, `Hash`, `Display`, `Debug`, `Index` and `IntoIterator` for
/// `&Name<T>`.
///
/// These impls panic if forcing fails, because the std traits have no error
/// channel; use the `try_*` methods of [`Surface`] to handle failures.
#[macro_export]
macro_rules! delegate {
    ($handle:ident) => {
        impl<T> $crate::Operand for $handle<T>
        where
            $handle<T>: $crate::Promise<Value = T>,
            T: ::core::clone::Clone,
        {
            type Value = T;

            fn resolve(&self) -> ::core::result::Result<T, $crate::ForceError> {
                <$handle<T> as $crate::Promise>::force(self).cloned()
            }
        }

        $crate::delegate!(@binary $handle [
            Add add try_add try_radd,
            Sub sub try_sub try_rsub,
            Mul mul try_mul try_rmul,
            Div div try_div try_rdiv,
            Rem rem try_rem try_rrem,
            BitAnd bitand try_bitand try_rbitand,
            BitOr bitor try_bitor try_rbitor,
            BitXor bitxor try_bitxor try_rbitxor,
            Shl shl try_shl try_rshl,
            Shr shr try_shr try_rshr,
        ]);

        $crate::delegate!(@unary $handle [
            Neg neg try_neg,
            Not not try_not,
        ]);

        $crate::delegate!(@compare $handle [
            i8 i16 i32 i64 i128 isize u8 u16 u32 u64 u128 usize f32 f64 bool char String
        ]);

        impl<T> ::core::hash::Hash for $handle<T>
        where
            $handle<T>: $crate::Surface<Value = T>,
            T: ::core::hash::Hash,
        {
            #[track_caller]
            fn hash<H: ::core::hash::Hasher>(&self, state: &mut H) {
                $crate::__private::expect_forced(<$handle<T> as $crate::Surface>::try_hash(self, state))
            }
        }

        impl<T> ::core::fmt::Display for $handle<T>
        where
            $handle<T>: $crate::Surface<Value = T>,
            T: ::core::fmt::Display,
        {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                <$handle<T> as $crate::Surface>::fmt_display(self, f)
            }
        }

        impl<T> ::core::fmt::Debug for $handle<T>
        where
            $handle<T>: $crate::Surface<Value = T>,
            T: ::core::fmt::Debug,
        {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                <$handle<T> as $crate::Surface>::fmt_debug(self, f)
            }
        }

        impl<T, I> ::core::ops::Index<I> for $handle<T>
        where
            $handle<T>: $crate::Surface<Value = T>,
            T: ::core::ops::Index<I>,
        {
            type Output = <T as ::core::ops::Index<I>>::Output;

            #[track_caller]
            fn index(&self, index: I) -> &Self::Output {
                $crate::__private::expect_forced(<$handle<T> as $crate::Surface>::try_index(self, index))
            }
        }

        impl<'a, T> ::core::iter::IntoIterator for &'a $handle<T>
        where
            $handle<T>: $crate::Surface<Value = T>,
            &'a T: ::core::iter::IntoIterator,
        {
            type Item = <&'a T as ::core::iter::IntoIterator>::Item;
            type IntoIter = <&'a T as ::core::iter::IntoIterator>::IntoIter;

            #[track_caller]
            fn into_iter(self) -> Self::IntoIter {
                $crate::__private::expect_forced(<$handle<T> as $crate::Surface>::try_iter(self))
            }
        }
    };

    (@binary $handle:ident [$($Trait:ident $method:ident $try:ident $rtry:ident),* $(,)?]) => {$(
        impl<'a, T, R> ::core::ops::$Trait<R> for &'a $handle<T>
        where
            $handle<T>: $crate::Surface<Value = T>,
            R: $crate::Operand,
            T: ::core::clone::Clone + ::core::ops::$Trait<<R as $crate::Operand>::Value>,
        {
            type Output = <T as ::core::ops::$Trait<<R as $crate::Operand>::Value>>::Output;

            #[track_caller]
            fn $method(self, rhs: R) -> Self::Output {
                $crate::__private::expect_forced(<$handle<T> as $crate::Surface>::$try(self, rhs))
            }
        }

        $crate::delegate!(@reflected $handle $Trait $method $rtry [
            i8 i16 i32 i64 i128 isize u8 u16 u32 u64 u128 usize f32 f64
        ]);
    )*};

    (@reflected $handle:ident $Trait:ident $method:ident $rtry:ident [$($prim:ident)*]) => {$(
        impl<'a, T> ::core::ops::$Trait<&'a $handle<T>> for $prim
        where
            $handle<T>: $crate::Surface<Value = T>,
            T: ::core::clone::Clone,
            $prim: ::core::ops::$Trait<T>,
        {
            type Output = <$prim as ::core::ops::$Trait<T>>::Output;

            #[track_caller]
            fn $method(self, rhs: &'a $handle<T>) -> Self::Output {
                $crate::__private::expect_forced(
                    <$handle<T> as $crate::Surface>::$rtry(rhs, self),
                )
            }
        }
    )*};

    (@unary $handle:ident [$($Trait:ident $method:ident $try:ident),* $(,)?]) => {$(
        impl<'a, T> ::core::ops::$Trait for &'a $handle<T>
        where
            $handle<T>: $crate::Surface<Value = T>,
            T: ::core::clone::Clone + ::core::ops::$Trait,
        {
            type Output = <T as ::core::ops::$Trait>::Output;

            #[track_caller]
            fn $method(self) -> Self::Output {
                $crate::__private::expect_forced(<$handle<T> as $crate::Surface>::$try(self))
            }
        }
    )*};

    (@compare $handle:ident [$($prim:ident)*]) => {
        impl<T, R> ::core::cmp::PartialEq<R> for $handle<T>
        where
            $handle<T>: $crate::Surface<Value = T>,
            R: $crate::Operand,
            T: ::core::cmp::PartialEq<<R as $crate::Operand>::Value>,
        {
            #[track_caller]
            fn eq(&self, other: &R) -> bool {
                $crate::__private::expect_forced(<$handle<T> as $crate::Surface>::try_eq(self, other))
            }
        }

        impl<T, R> ::core::cmp::PartialOrd<R> for $handle<T>
        where
            $handle<T>: $crate::Surface<Value = T>,
            R: $crate::Operand,
            T: ::core::cmp::PartialOrd<<R as $crate::Operand>::Value>,
        {
            #[track_caller]
            fn partial_cmp(&self, other: &R) -> ::core::option::Option<::core::cmp::Ordering> {
                $crate::__private::expect_forced(<$handle<T> as $crate::Surface>::try_partial_cmp(self, other))
            }
        }

        impl<T> ::core::cmp::Eq for $handle<T>
        where
            $handle<T>: $crate::Surface<Value = T>,
            T: ::core::cmp::Eq + ::core::clone::Clone,
        {
        }

        impl<T> ::core::cmp::Ord for $handle<T>
        where
            $handle<T>: $crate::Surface<Value = T>,
            T: ::core::cmp::Ord + ::core::clone::Clone,
        {
            #[track_caller]
            fn cmp(&self, other: &Self) -> ::core::cmp::Ordering {
                $crate::__private::expect_forced(<$handle<T> as $crate::Surface>::try_cmp(self, other))
            }
        }

        $(
            // `prim == h` asks the handle, so an override of `try_eq` or
            // `try_partial_cmp` sees both operand orders.
            impl<T> ::core::cmp::PartialEq<$handle<T>> for $prim
            where
                $handle<T>: $crate::Surface<Value = T>,
                T: ::core::cmp::PartialEq<$prim>,
            {
                #[track_caller]
                fn eq(&self, other: &$handle<T>) -> bool {
                    $crate::__private::expect_forced(
                        <$handle<T> as $crate::Surface>::try_eq(other, self),
                    )
                }
            }

            impl<T> ::core::cmp::PartialOrd<$handle<T>> for $prim
            where
                $handle<T>: $crate::Surface<Value = T>,
                T: ::core::cmp::PartialOrd<$prim>,
            {
                #[track_caller]
                fn partial_cmp(&self, other: &$handle<T>) -> ::core::option::Option<::core::cmp::Ordering> {
                    $crate::__private::expect_forced(
                        <$handle<T> as $crate::Surface>::try_partial_cmp(other, self),
                    )
                    .map(::core::cmp::Ordering::reverse)
                }
            }
        )*
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    /// A minimal handle: resolves to a fixed outcome, counts forces.
    struct Fixed<T> {
        outcome: Result<T, ForceError>,
        forced: std::sync::atomic::AtomicUsize,
    }

    impl<T> Fixed<T> {
        fn ok(value: T) -> Self {
            Self {
                outcome: Ok(value),
                forced: Default::default(),
            }
        }

        fn err(message: &str) -> Self {
            Self {
                outcome: Err(ForceError::invocation(anyhow::anyhow!(message.to_string()))),
                forced: Default::default(),
            }
        }

        fn forced(&self) -> usize {
            self.forced.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    impl<T> Promise for Fixed<T> {
        type Value = T;

        fn force(&self) -> Result<&T, ForceError> {
            self.forced.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.outcome.as_ref().map_err(Clone::clone)
        }

        fn is_resolved(&self) -> bool {
            true
        }
    }

    impl<T> Surface for Fixed<T> {}

    crate::delegate!(Fixed);

    #[test]
    fn test_arithmetic_matches_forced_value() {
        let h = Fixed::ok(7);
        let other = Fixed::ok(3);

        assert_eq!(h.try_add(2).unwrap(), 9);
        assert_eq!(h.try_sub(&other).unwrap(), 4);
        assert_eq!(h.try_mul(3).unwrap(), 21);
        assert_eq!(h.try_div(2).unwrap(), 3);
        assert_eq!(h.try_rem(4).unwrap(), 3);
        assert_eq!(h.try_shl(1u32).unwrap(), 14);
        assert_eq!(h.try_bitand(6).unwrap(), 6);
        assert_eq!(h.try_neg().unwrap(), -7);
        assert_eq!(h.try_not().unwrap(), !7);
        assert_eq!(h.try_rsub(20).unwrap(), 13);
        assert_eq!(h.try_rdiv(&Fixed::ok(49)).unwrap(), 7);
    }

    #[test]
    fn test_operators() {
        let h = Fixed::ok(10);
        let other = Fixed::ok(4);

        assert_eq!(&h + 5, 15);
        assert_eq!(&h - &other, 6);
        assert_eq!(&h * 2, 20);
        assert_eq!(-&h, -10);
        assert_eq!(3 + &h, 13);
        assert_eq!(100 / &h, 10);
        assert_eq!(&h ^ 1, 11);
    }

    #[test]
    fn test_comparisons() {
        let h = Fixed::ok(10);

        assert!(h == 10);
        assert!(h != 11);
        assert!(h < 11);
        assert!(h >= 10);
        assert!(10 == h);
        assert!(9 < h);
        assert!(h == Fixed::ok(10));
        assert_eq!(h.try_cmp(Fixed::ok(12)).unwrap(), Ordering::Less);
        assert_eq!(h.cmp(&Fixed::ok(1)), Ordering::Greater);
    }

    #[test]
    fn test_float_partial_cmp() {
        let h = Fixed::ok(f64::NAN);

        assert_eq!(h.try_partial_cmp(1.0).unwrap(), None);
        assert!(!h.try_eq(f64::NAN).unwrap());
        assert!(h.force().unwrap().is_nan());
    }

    #[test]
    fn test_strings() {
        let h = Fixed::ok(String::from("hello"));

        assert_eq!(h.try_add(" world").unwrap(), "hello world");
        assert_eq!(h.try_display().unwrap(), "hello");
        assert_eq!(h.try_debug().unwrap(), r#""hello""#);
        assert_eq!(format!("{h:>7}"), "  hello");
        assert_eq!(format!("{h:?}"), r#""hello""#);
        assert!(h == "hello");
        assert!(h.try_contains('e').unwrap());
        assert!(h.try_contains("ell").unwrap());
        assert_eq!(h.try_len().unwrap(), 5);
        assert!(h.try_truthy().unwrap());
    }

    #[test]
    fn test_containers() {
        let h = Fixed::ok(vec![1, 2, 3]);

        assert_eq!(h.try_len().unwrap(), 3);
        assert!(h.try_contains(2).unwrap());
        assert!(!h.try_contains(Fixed::ok(9)).unwrap());
        assert_eq!(*h.try_index(1).unwrap(), 2);
        assert_eq!(h[2], 3);
        assert_eq!(&h[..2], &[1, 2]);
        assert_eq!((&h).into_iter().sum::<i32>(), 6);
        assert_eq!(h.try_iter().unwrap().count(), 3);

        let mut total = 0;
        for item in &h {
            total += item;
        }
        assert_eq!(total, 6);

        let map = Fixed::ok(HashMap::from([("a".to_string(), 1)]));
        assert!(map.try_contains("a").unwrap());
        assert!(!map.try_contains("b").unwrap());
    }

    #[test]
    fn test_truthiness() {
        assert!(!Fixed::ok(0).try_truthy().unwrap());
        assert!(Fixed::ok(-1).try_truthy().unwrap());
        assert!(!Fixed::ok(Vec::<u8>::new()).try_truthy().unwrap());
        assert!(!Fixed::ok(None::<i32>).try_truthy().unwrap());
        assert!(Fixed::ok(true).try_truthy().unwrap());
    }

    #[test]
    fn test_hash_matches_value() {
        fn hash_of(value: impl Hash) -> u64 {
            let mut hasher = DefaultHasher::new();
            value.hash(&mut hasher);
            hasher.finish()
        }

        let h = Fixed::ok("key");
        assert_eq!(hash_of(&h), hash_of("key"));
    }

    #[test]
    fn test_call() {
        let h = Fixed::ok(|a: i32, b: i32| a * b);
        assert_eq!(h.try_call((6, 7)).unwrap(), 42);
    }

    #[test]
    fn test_failure_propagates() {
        let h: Fixed<i32> = Fixed::err("no value");

        assert_eq!(h.try_add(1).unwrap_err().to_string(), "no value");
        assert_eq!(h.try_eq(1).unwrap_err().to_string(), "no value");
        assert_eq!(format!("{h:?}"), r#"Failed("no value")"#);
    }

    #[test]
    fn test_failing_right_operand() {
        let h = Fixed::ok(1);
        let bad: Fixed<i32> = Fixed::err("right side");

        let err = h.try_add(&bad).unwrap_err();
        assert_eq!(err.to_string(), "right side");
        // The left side is forced first.
        assert_eq!(h.forced(), 1);
    }

    #[test]
    #[should_panic(expected = "forcing a deferred value failed: broken")]
    fn test_operator_panics_on_failure() {
        let h: Fixed<i32> = Fixed::err("broken");
        let _ = &h + 1;
    }

    #[test]
    fn test_reflected_from_right_operand_type() {
        #[derive(Debug, Clone, PartialEq)]
        struct Meters(f64);

        crate::plain_operand!(Meters);

        // Only the right-hand type provides the operator.
        impl ops::Add<Meters> for f64 {
            type Output = Meters;

            fn add(self, rhs: Meters) -> Meters {
                Meters(self + rhs.0)
            }
        }

        let h = Fixed::ok(2.0f64);
        assert_eq!(&h + Meters(3.0), Meters(5.0));
        assert_eq!(h.try_add(Meters(0.5)).unwrap(), Meters(2.5));
    }
}
