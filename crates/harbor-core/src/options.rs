//! Immutable, type-indexed option carrier.
//!
//! [`Options`] is a persistent map from a Rust type to a value of that type.
//! Adding a value never mutates the receiver; it returns a new carrier that
//! shares every ancestor entry with the one it was derived from. Keys are
//! [`TypeId`]s, so a missing or nil key cannot be expressed.
//!
//! An [`Opt`] is a function `Options -> Options`. Constructors accept a slice
//! of `Opt`s and fold them over an empty carrier:
//!
//! ```
//! use harbor_core::options::{self, Opt};
//! use std::time::Duration;
//!
//! #[derive(Debug, Clone, Default, PartialEq)]
//! struct DialConfig {
//!     addrs: Vec<String>,
//!     timeout: Option<Duration>,
//! }
//!
//! fn with_addrs(addrs: &[&str]) -> Opt {
//!     let addrs: Vec<String> = addrs.iter().map(ToString::to_string).collect();
//!     options::update(move |cfg: &mut DialConfig| cfg.addrs.clone_from(&addrs))
//! }
//!
//! fn with_timeout(timeout: Duration) -> Opt {
//!     options::update(move |cfg: &mut DialConfig| cfg.timeout = Some(timeout))
//! }
//!
//! let cfg: DialConfig = options::new_t(&[
//!     with_addrs(&["10.0.0.1:2379"]),
//!     with_timeout(Duration::from_secs(3)),
//! ]);
//! assert_eq!(cfg.addrs, vec!["10.0.0.1:2379".to_string()]);
//! assert_eq!(cfg.timeout, Some(Duration::from_secs(3)));
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

struct Node {
    key: TypeId,
    type_name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
    parent: Option<Arc<Node>>,
}

/// Immutable, type-indexed value carrier.
#[derive(Clone, Default)]
pub struct Options {
    head: Option<Arc<Node>>,
}

/// Element list stored under its own key by [`Options::append`].
#[derive(Debug, Clone)]
pub struct Slice<T>(pub Vec<T>);

impl Options {
    /// Creates an empty carrier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new carrier where `T` maps to `value`.
    ///
    /// The receiver is left untouched.
    #[must_use]
    pub fn with<T: Any + Send + Sync>(&self, value: T) -> Self {
        self.with_arc(Arc::new(value))
    }

    /// Like [`with`](Self::with) for a value that is already shared.
    #[must_use]
    pub fn with_arc<T: Any + Send + Sync>(&self, value: Arc<T>) -> Self {
        Self {
            head: Some(Arc::new(Node {
                key: TypeId::of::<T>(),
                type_name: std::any::type_name::<T>(),
                value,
                parent: self.head.clone(),
            })),
        }
    }

    fn lookup<T: Any + Send + Sync>(&self) -> Option<&Arc<dyn Any + Send + Sync>> {
        let key = TypeId::of::<T>();
        let mut cursor = self.head.as_ref();
        while let Some(node) = cursor {
            if node.key == key {
                return Some(&node.value);
            }
            cursor = node.parent.as_ref();
        }
        None
    }

    /// Returns a reference to the value stored for `T`.
    #[must_use]
    pub fn value_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.lookup::<T>().and_then(|v| v.downcast_ref::<T>())
    }

    /// Returns a clone of the value stored for `T`.
    #[must_use]
    pub fn value<T: Any + Send + Sync + Clone>(&self) -> Option<T> {
        self.value_ref::<T>().cloned()
    }

    /// Returns the shared handle stored for `T`.
    #[must_use]
    pub fn value_arc<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.lookup::<T>()
            .and_then(|v| Arc::clone(v).downcast::<T>().ok())
    }

    /// Returns the value stored for `T`, or `default`.
    #[must_use]
    pub fn value_or<T: Any + Send + Sync + Clone>(&self, default: T) -> T {
        self.value::<T>().unwrap_or(default)
    }

    /// Returns `true` if a value is stored for `T`.
    #[must_use]
    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.lookup::<T>().is_some()
    }

    /// Returns the list of `T` elements accumulated with [`append`](Self::append).
    #[must_use]
    pub fn slice<T: Any + Send + Sync + Clone>(&self) -> Vec<T> {
        self.value_ref::<Slice<T>>()
            .map(|s| s.0.clone())
            .unwrap_or_default()
    }

    /// Returns a new carrier whose `T` list is the current one extended by `items`.
    #[must_use]
    pub fn append<T, I>(&self, items: I) -> Self
    where
        T: Any + Send + Sync + Clone,
        I: IntoIterator<Item = T>,
    {
        let mut list = self.slice::<T>();
        list.extend(items);
        self.with(Slice(list))
    }

    /// Folds `opts` over this carrier.
    #[must_use]
    pub fn apply(&self, opts: &[Opt]) -> Self {
        opts.iter().fold(self.clone(), |acc, opt| opt.apply(acc))
    }

    /// Number of entries in the chain, shadowed ones included.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut cursor = self.head.as_ref();
        while let Some(node) = cursor {
            depth += 1;
            cursor = node.parent.as_ref();
        }
        depth
    }

    /// Returns `true` when nothing was ever stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        let mut cursor = self.head.as_ref();
        while let Some(node) = cursor {
            list.entry(&node.type_name);
            cursor = node.parent.as_ref();
        }
        list.finish()
    }
}

/// A functional option: `Options -> Options`.
#[derive(Clone)]
pub struct Opt(Arc<dyn Fn(Options) -> Options + Send + Sync>);

impl Opt {
    /// Wraps a function as an option.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Options) -> Options + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// An option that stores `value` under its own type.
    pub fn value<T: Any + Send + Sync + Clone>(value: T) -> Self {
        Self::new(move |opts| opts.with(value.clone()))
    }

    /// An option that stores a shared handle under `T`.
    pub fn shared<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self::new(move |opts| opts.with_arc(Arc::clone(&value)))
    }

    /// Applies the option.
    #[must_use]
    pub fn apply(&self, opts: Options) -> Options {
        (self.0)(opts)
    }
}

impl fmt::Debug for Opt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Opt")
    }
}

/// Builds an option that reads (or defaults) the `T` stored in the carrier,
/// applies `mutator` to a copy and stores the copy.
pub fn update<T, F>(mutator: F) -> Opt
where
    T: Any + Send + Sync + Clone + Default,
    F: Fn(&mut T) + Send + Sync + 'static,
{
    Opt::new(move |opts| {
        let mut cfg = opts.value::<T>().unwrap_or_default();
        mutator(&mut cfg);
        opts.with(cfg)
    })
}

/// Applies `opts` to an empty carrier and extracts the resulting `T`.
pub fn new<T>(opts: &[Opt]) -> (Options, T)
where
    T: Any + Send + Sync + Clone + Default,
{
    let carrier = Options::new().apply(opts);
    let value = carrier.value::<T>().unwrap_or_default();
    (carrier, value)
}

/// Like [`new`] but drops the carrier.
pub fn new_t<T>(opts: &[Opt]) -> T
where
    T: Any + Send + Sync + Clone + Default,
{
    new::<T>(opts).1
}

/// Stores `cfg` in a fresh carrier, then applies `opts` on top of it.
pub fn apply<T>(cfg: T, opts: &[Opt]) -> Options
where
    T: Any + Send + Sync,
{
    Options::new().with(cfg).apply(opts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Timeout(u64);

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Retry {
        attempts: u32,
        backoff_ms: u64,
    }

    #[test]
    fn test_with_does_not_mutate_receiver() {
        let base = Options::new().with(Timeout(1));
        let derived = base.with(Timeout(2));

        assert_eq!(base.value::<Timeout>(), Some(Timeout(1)));
        assert_eq!(derived.value::<Timeout>(), Some(Timeout(2)));
    }

    #[test]
    fn test_missing_value() {
        let opts = Options::new();
        assert!(opts.value::<Timeout>().is_none());
        assert_eq!(opts.value_or(Timeout(9)), Timeout(9));
        assert!(!opts.contains::<Timeout>());
        assert!(opts.is_empty());
    }

    #[test]
    fn test_shared_ancestors() {
        let base = Options::new().with(Timeout(5));
        let a = base.with(Retry::default());
        let b = base.with(String::from("b"));

        assert_eq!(a.value::<Timeout>(), Some(Timeout(5)));
        assert_eq!(b.value::<Timeout>(), Some(Timeout(5)));
        assert!(a.value::<String>().is_none());
        assert!(b.value::<Retry>().is_none());
    }

    #[test]
    fn test_append_and_slice() {
        let opts = Options::new().append(["a".to_string()]);
        let more = opts.append(["b".to_string(), "c".to_string()]);

        assert_eq!(opts.slice::<String>(), vec!["a"]);
        assert_eq!(more.slice::<String>(), vec!["a", "b", "c"]);
        assert!(Options::new().slice::<u32>().is_empty());
    }

    #[test]
    fn test_update_builds_on_previous_value() {
        let attempts = update(|r: &mut Retry| r.attempts = 3);
        let backoff = update(|r: &mut Retry| r.backoff_ms = 250);

        let (carrier, retry) = new::<Retry>(&[attempts, backoff]);
        assert_eq!(
            retry,
            Retry {
                attempts: 3,
                backoff_ms: 250
            }
        );
        assert_eq!(carrier.value::<Retry>(), Some(retry));
    }

    #[test]
    fn test_new_t_defaults_without_options() {
        let retry: Retry = new_t(&[]);
        assert_eq!(retry, Retry::default());
    }

    #[test]
    fn test_apply_seeds_value() {
        let opts = apply(Timeout(10), &[Opt::value(String::from("x"))]);
        assert_eq!(opts.value::<Timeout>(), Some(Timeout(10)));
        assert_eq!(opts.value::<String>().as_deref(), Some("x"));
    }

    #[test]
    fn test_shared_arc_round_trip() {
        let shared = Arc::new(Retry {
            attempts: 1,
            backoff_ms: 2,
        });
        let opts = Options::new().apply(&[Opt::shared(Arc::clone(&shared))]);
        let back = opts.value_arc::<Retry>().expect("value should be present");
        assert!(Arc::ptr_eq(&shared, &back));
    }

    #[test]
    fn test_debug_lists_type_names() {
        let opts = Options::new().with(Timeout(1));
        let debug = format!("{opts:?}");
        assert!(debug.contains("Timeout"));
    }

    proptest! {
        #[test]
        fn prop_snapshots_are_stable(values in proptest::collection::vec(any::<u64>(), 1..32)) {
            let mut snapshots = Vec::new();
            let mut current = Options::new();
            for v in &values {
                current = current.with(Timeout(*v));
                snapshots.push(current.clone());
            }
            for (snapshot, v) in snapshots.iter().zip(&values) {
                prop_assert_eq!(snapshot.value::<Timeout>(), Some(Timeout(*v)));
            }
            prop_assert_eq!(current.depth(), values.len());
        }

        #[test]
        fn prop_append_preserves_prefix(a in proptest::collection::vec(any::<u8>(), 0..16),
                                        b in proptest::collection::vec(any::<u8>(), 0..16)) {
            let first = Options::new().append(a.clone());
            let second = first.append(b.clone());
            prop_assert_eq!(first.slice::<u8>(), a.clone());
            let mut expected = a;
            expected.extend(b);
            prop_assert_eq!(second.slice::<u8>(), expected);
        }
    }
}
