//! Lazy, memoized "tracked value" cascade.
//!
//! A [`Tracked`] value lets a consumer ask "is this still valid?" without
//! paying for recomputation, and fetch the value with at most one recompute
//! per invalidation. Three flavors exist:
//!
//! - **Constant**: always fresh, never changes.
//! - **Source**: producer-pushed; [`Source::update`] stages a new value and
//!   the value is fresh while staged == committed; `refresh` commits.
//! - **Derived**: a pure function of other tracked values, fresh while every
//!   input is fresh and still holds the value captured at the last compute.
//!
//! Derived nodes form a DAG (never cyclic), so shared `Rc` ownership
//! suffices. The cascade is single-threaded by design; this is how the
//! fusion layer avoids recomputing the odom→robot correction unless the
//! underlying buffers actually changed.

use std::cell::RefCell;
use std::rc::Rc;

/// Internal node contract behind a [`Tracked`] handle.
pub(crate) trait Node<T> {
    /// Current value, computing and memoizing on first access after going
    /// stale.
    fn value(&self) -> T;
    /// Whether the memoized value still reflects all inputs.
    fn is_fresh(&self) -> bool;
    /// Whether this node can never change again.
    fn is_constant(&self) -> bool;
    /// Commit staged input changes and drop stale memos. Idempotent.
    fn refresh(&self);
}

/// Memoized, invalidation-aware value handle.
pub struct Tracked<T> {
    node: Rc<dyn Node<T>>,
}

impl<T> std::fmt::Debug for Tracked<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracked").finish_non_exhaustive()
    }
}

impl<T> Clone for Tracked<T> {
    fn clone(&self) -> Self {
        Tracked {
            node: Rc::clone(&self.node),
        }
    }
}

impl<T: Clone + PartialEq + 'static> Tracked<T> {
    pub(crate) fn from_node(node: Rc<dyn Node<T>>) -> Self {
        Tracked { node }
    }

    /// A value that never changes (always fresh).
    pub fn constant(value: T) -> Self {
        Tracked {
            node: Rc::new(ConstantNode { value }),
        }
    }

    /// Current value; computes and memoizes at most once per invalidation.
    pub fn current(&self) -> T {
        self.node.value()
    }

    /// Whether the memoized value is still valid.
    pub fn is_fresh(&self) -> bool {
        self.node.is_fresh()
    }

    /// Whether this value can never change again.
    pub fn is_constant(&self) -> bool {
        self.node.is_constant()
    }

    /// Commit pending changes through the cascade.
    ///
    /// Returns a possibly simplified handle: a derived value whose inputs
    /// have all collapsed to constants folds into a constant itself (an
    /// optimization only; semantics are unchanged). Idempotent.
    pub fn refresh(&self) -> Tracked<T> {
        self.node.refresh();
        if self.node.is_constant() {
            Tracked::constant(self.node.value())
        } else {
            self.clone()
        }
    }

    /// Derive a value through a pure function.
    ///
    /// Constant-folds immediately when the receiver is a fresh constant.
    pub fn map<R, F>(&self, func: F) -> Tracked<R>
    where
        R: Clone + PartialEq + 'static,
        F: Fn(&T) -> R + 'static,
    {
        if self.node.is_constant() && self.node.is_fresh() {
            return Tracked::constant(func(&self.node.value()));
        }
        Tracked {
            node: Rc::new(Derived1 {
                input: RefCell::new(self.clone()),
                func: Box::new(func),
                cache: RefCell::new(None),
            }),
        }
    }

    /// Derive a value from this and one other tracked value.
    pub fn zip_with<U, R, F>(&self, other: &Tracked<U>, func: F) -> Tracked<R>
    where
        U: Clone + PartialEq + 'static,
        R: Clone + PartialEq + 'static,
        F: Fn(&T, &U) -> R + 'static,
    {
        if self.is_constant() && self.is_fresh() && other.is_constant() && other.is_fresh() {
            return Tracked::constant(func(&self.current(), &other.current()));
        }
        Tracked {
            node: Rc::new(Derived2 {
                left: RefCell::new(self.clone()),
                right: RefCell::new(other.clone()),
                func: Box::new(func),
                cache: RefCell::new(None),
            }),
        }
    }
}

struct ConstantNode<T> {
    value: T,
}

impl<T: Clone> Node<T> for ConstantNode<T> {
    fn value(&self) -> T {
        self.value.clone()
    }
    fn is_fresh(&self) -> bool {
        true
    }
    fn is_constant(&self) -> bool {
        true
    }
    fn refresh(&self) {}
}

/// Producer handle for a pushed value.
///
/// `update` stages; `tracked()` hands out consumer views; freshness of those
/// views is "no staged change pending".
pub struct Source<T> {
    inner: Rc<SourceNode<T>>,
}

impl<T> Clone for Source<T> {
    fn clone(&self) -> Self {
        Source {
            inner: Rc::clone(&self.inner),
        }
    }
}

struct SourceState<T> {
    current: T,
    pending: T,
}

struct SourceNode<T> {
    state: RefCell<SourceState<T>>,
}

impl<T: Clone + PartialEq + 'static> Source<T> {
    /// Create a source with an initial committed value.
    pub fn new(value: T) -> Self {
        Source {
            inner: Rc::new(SourceNode {
                state: RefCell::new(SourceState {
                    current: value.clone(),
                    pending: value,
                }),
            }),
        }
    }

    /// Stage a new value. Consumers observe it after the next `refresh`.
    pub fn update(&self, value: T) {
        self.inner.state.borrow_mut().pending = value;
    }

    /// Consumer view of this source.
    pub fn tracked(&self) -> Tracked<T> {
        Tracked {
            node: self.inner.clone() as Rc<dyn Node<T>>,
        }
    }
}

impl<T: Clone + PartialEq> Node<T> for SourceNode<T> {
    fn value(&self) -> T {
        self.state.borrow().current.clone()
    }
    fn is_fresh(&self) -> bool {
        let state = self.state.borrow();
        state.current == state.pending
    }
    fn is_constant(&self) -> bool {
        false
    }
    fn refresh(&self) {
        let mut state = self.state.borrow_mut();
        let pending = state.pending.clone();
        state.current = pending;
    }
}

struct Derived1<A, R> {
    input: RefCell<Tracked<A>>,
    func: Box<dyn Fn(&A) -> R>,
    cache: RefCell<Option<(A, R)>>,
}

impl<A: Clone + PartialEq + 'static, R: Clone> Node<R> for Derived1<A, R> {
    fn value(&self) -> R {
        let mut cache = self.cache.borrow_mut();
        if let Some((_, cached)) = cache.as_ref() {
            return cached.clone();
        }
        let arg = self.input.borrow().current();
        let result = (self.func)(&arg);
        *cache = Some((arg, result.clone()));
        result
    }

    fn is_fresh(&self) -> bool {
        let input = self.input.borrow();
        if !input.is_fresh() {
            return false;
        }
        match self.cache.borrow().as_ref() {
            Some((captured, _)) => *captured == input.current(),
            None => true,
        }
    }

    fn is_constant(&self) -> bool {
        self.input.borrow().is_constant()
    }

    fn refresh(&self) {
        let refreshed = self.input.borrow().refresh();
        *self.input.borrow_mut() = refreshed;
        let input = self.input.borrow();
        let stale = match self.cache.borrow().as_ref() {
            Some((captured, _)) => *captured != input.current(),
            None => false,
        };
        if stale {
            *self.cache.borrow_mut() = None;
        }
    }
}

struct Derived2<A, B, R> {
    left: RefCell<Tracked<A>>,
    right: RefCell<Tracked<B>>,
    func: Box<dyn Fn(&A, &B) -> R>,
    cache: RefCell<Option<(A, B, R)>>,
}

impl<A, B, R> Node<R> for Derived2<A, B, R>
where
    A: Clone + PartialEq + 'static,
    B: Clone + PartialEq + 'static,
    R: Clone,
{
    fn value(&self) -> R {
        let mut cache = self.cache.borrow_mut();
        if let Some((_, _, cached)) = cache.as_ref() {
            return cached.clone();
        }
        let a = self.left.borrow().current();
        let b = self.right.borrow().current();
        let result = (self.func)(&a, &b);
        *cache = Some((a, b, result.clone()));
        result
    }

    fn is_fresh(&self) -> bool {
        let left = self.left.borrow();
        let right = self.right.borrow();
        if !left.is_fresh() || !right.is_fresh() {
            return false;
        }
        match self.cache.borrow().as_ref() {
            Some((ca, cb, _)) => *ca == left.current() && *cb == right.current(),
            None => true,
        }
    }

    fn is_constant(&self) -> bool {
        self.left.borrow().is_constant() && self.right.borrow().is_constant()
    }

    fn refresh(&self) {
        let left = self.left.borrow().refresh();
        *self.left.borrow_mut() = left;
        let right = self.right.borrow().refresh();
        *self.right.borrow_mut() = right;

        let left = self.left.borrow();
        let right = self.right.borrow();
        let stale = match self.cache.borrow().as_ref() {
            Some((ca, cb, _)) => *ca != left.current() || *cb != right.current(),
            None => false,
        };
        if stale {
            *self.cache.borrow_mut() = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_constant_is_always_fresh() {
        let t = Tracked::constant(5.0);
        assert!(t.is_fresh());
        assert!(t.is_constant());
        assert_eq!(t.current(), 5.0);
        let r = t.refresh();
        assert_eq!(r.current(), 5.0);
    }

    #[test]
    fn test_constant_map_folds() {
        let t = Tracked::constant(5.0);
        let r = t.map(|x| x * x);
        assert!(r.is_constant());
        assert!(r.is_fresh());
        assert_eq!(r.current(), 25.0);
    }

    #[test]
    fn test_source_staging() {
        let source = Source::new(5);
        let t = source.tracked();
        assert!(t.is_fresh());
        assert_eq!(t.current(), 5);

        source.update(6);
        assert!(!t.is_fresh());
        // No auto-refresh: committed value unchanged until refresh.
        assert_eq!(t.current(), 5);

        let t = t.refresh();
        assert!(t.is_fresh());
        assert_eq!(t.current(), 6);
    }

    #[test]
    fn test_derived_propagates_staleness() {
        let source = Source::new(5);
        let a = source.tracked();
        let b = a.map(|x| x * x);
        assert!(b.is_fresh());
        assert_eq!(b.current(), 25);

        source.update(6);
        assert!(!a.is_fresh());
        assert!(!b.is_fresh());
        assert_eq!(b.current(), 25);

        let a = a.refresh();
        assert_eq!(a.current(), 6);
        // Derived still stale until its own refresh.
        assert!(!b.is_fresh());
        assert_eq!(b.current(), 25);

        let b = b.refresh();
        assert!(b.is_fresh());
        assert_eq!(b.current(), 36);
    }

    #[test]
    fn test_memoization_compute_counts() {
        let calls = Rc::new(Cell::new(0));
        let source = Source::new(5);
        let counted = Rc::clone(&calls);
        let derived = source.tracked().map(move |x| {
            counted.set(counted.get() + 1);
            x * 10
        });

        assert_eq!(derived.current(), 50);
        assert_eq!(derived.current(), 50);
        assert_eq!(calls.get(), 1);

        source.update(6);
        let derived = derived.refresh();
        assert_eq!(derived.current(), 60);
        assert_eq!(derived.current(), 60);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_refresh_idempotent() {
        let calls = Rc::new(Cell::new(0));
        let source = Source::new(1);
        let counted = Rc::clone(&calls);
        let derived = source.tracked().map(move |x| {
            counted.set(counted.get() + 1);
            *x
        });
        let _ = derived.current();
        let derived = derived.refresh();
        let derived = derived.refresh();
        assert_eq!(derived.current(), 1);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_zip_with() {
        let left = Source::new(2);
        let right = Source::new(3);
        let product = left.tracked().zip_with(&right.tracked(), |a, b| a * b);
        assert_eq!(product.current(), 6);
        assert!(product.is_fresh());

        right.update(10);
        assert!(!product.is_fresh());
        let product = product.refresh();
        assert_eq!(product.current(), 20);
    }

    #[test]
    fn test_zip_with_constants_folds() {
        let a = Tracked::constant(2);
        let b = Tracked::constant(3);
        let sum = a.zip_with(&b, |x, y| x + y);
        assert!(sum.is_constant());
        assert_eq!(sum.current(), 5);
    }

    #[test]
    fn test_shared_source_multiple_consumers() {
        let source = Source::new(1);
        let a = source.tracked().map(|x| x + 1);
        let b = source.tracked().map(|x| x * 100);
        assert_eq!(a.current(), 2);
        assert_eq!(b.current(), 100);

        source.update(2);
        assert!(!a.is_fresh());
        assert!(!b.is_fresh());
        let a = a.refresh();
        let b = b.refresh();
        assert_eq!(a.current(), 3);
        assert_eq!(b.current(), 200);
    }
}
