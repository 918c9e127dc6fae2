//! The generic per-domain provider.
//!
//! A [`Provider`] owns one domain's configuration group, its option carrier
//! and the instances materialized from them. Instances are built on first
//! access by looking up each entry's factory in the domain registry.
//!
//! # Lifecycle
//!
//! ```text
//! set_config ──► uninitialized ──(first access)──► initialized
//!      ▲                                                │
//!      └────────────────────────────────────────────────┘
//! ```
//!
//! Manually registered instances bypass the factories, win over
//! config-derived entries of the same name and survive `set_config`.
//!
//! Factories run under the provider's write lock. They must not block:
//! anything slow (connecting, warming up) belongs inside the instance.

use harbor_config::{ComponentGroup, ConfigEntry, DEFAULT_INSTANCE};
use harbor_core::{Error, ErrorKind, ErrorList, FactoryRegistry, HarborResult, Options, Partial};
use harbor_telemetry::metrics::record_materialization;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Constructor for one instance of a domain.
pub type InstanceFactory<E, I> = Arc<dyn Fn(&E, &Options) -> HarborResult<I> + Send + Sync>;

/// Registry of instance factories for one domain.
pub type InstanceRegistry<E, I> = FactoryRegistry<InstanceFactory<E, I>>;

struct State<E, I> {
    config: ComponentGroup<E>,
    options: Options,
    instances: HashMap<String, I>,
    order: Vec<String>,
    manual: Vec<(String, I)>,
    failures: HashMap<String, (ErrorKind, String)>,
    initialized: bool,
    default_name: Option<String>,
}

impl<E, I: Clone> State<E, I> {
    fn insert(&mut self, name: String, instance: I) {
        if self.instances.insert(name.clone(), instance).is_none() {
            self.order.push(name);
        }
    }
}

/// Lazily materializes and caches the named instances of one domain.
pub struct Provider<E, I> {
    domain: &'static str,
    factories: Arc<InstanceRegistry<E, I>>,
    state: RwLock<State<E, I>>,
}

impl<E, I> fmt::Debug for Provider<E, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Provider")
            .field("domain", &self.domain)
            .field("instances", &state.order)
            .field("initialized", &state.initialized)
            .field("default_name", &state.default_name)
            .finish_non_exhaustive()
    }
}

impl<E, I> Provider<E, I>
where
    E: ConfigEntry,
    I: Clone + Send + Sync + 'static,
{
    /// Creates an unconfigured provider backed by `factories`.
    #[must_use]
    pub fn new(domain: &'static str, factories: Arc<InstanceRegistry<E, I>>) -> Self {
        Self {
            domain,
            factories,
            state: RwLock::new(State {
                config: ComponentGroup::default(),
                options: Options::new(),
                instances: HashMap::new(),
                order: Vec::new(),
                manual: Vec::new(),
                failures: HashMap::new(),
                initialized: false,
                default_name: None,
            }),
        }
    }

    /// Domain name used in errors and logs.
    #[must_use]
    pub fn domain(&self) -> &'static str {
        self.domain
    }

    /// The factory registry this provider draws from.
    #[must_use]
    pub fn factories(&self) -> &Arc<InstanceRegistry<E, I>> {
        &self.factories
    }

    /// Installs a new configuration group and options.
    ///
    /// Config-derived instances are dropped; manual registrations stay.
    pub fn set_config(&self, config: ComponentGroup<E>, options: Options) {
        let mut state = self.state.write();
        state.default_name = config.provisional_default();
        state.config = config;
        state.options = options;
        state.instances.clear();
        state.order.clear();
        state.failures.clear();
        state.initialized = false;
        tracing::debug!(
            domain = self.domain,
            entries = state.config.configs.len(),
            default = ?state.default_name,
            "provider configured"
        );
    }

    /// Registers an instance by hand.
    pub fn register(&self, name: impl Into<String>, instance: I) {
        let name = name.into();
        let mut state = self.state.write();
        state.manual.retain(|(n, _)| *n != name);
        state.manual.push((name.clone(), instance.clone()));
        if state.initialized {
            state.insert(name.clone(), instance);
        }
        tracing::debug!(domain = self.domain, instance = %name, "instance registered manually");
    }

    /// Returns every instance, materializing on first use.
    ///
    /// Entries that fail to build are reported in the returned error list;
    /// the others are still available. Only the materializing call sees the
    /// errors.
    pub fn instances(&self) -> Partial<HashMap<String, I>> {
        {
            let state = self.state.read();
            if state.initialized {
                return Partial::complete(state.instances.clone());
            }
        }

        let mut state = self.state.write();
        if state.initialized {
            return Partial::complete(state.instances.clone());
        }
        let errors = self.materialize(&mut state);
        Partial {
            value: state.instances.clone(),
            errors,
        }
    }

    fn materialize(&self, state: &mut State<E, I>) -> ErrorList {
        let mut errors = ErrorList::new();

        let manual = state.manual.clone();
        for (name, instance) in manual {
            state.insert(name, instance);
        }

        let entries: Vec<E> = state.config.enabled_entries().cloned().collect();
        for entry in &entries {
            let name = entry.identity();
            if name.is_empty() || state.instances.contains_key(name) {
                continue;
            }
            let key = if entry.factory_key().is_empty() {
                name
            } else {
                entry.factory_key()
            };

            let built = self
                .factories
                .require(key)
                .and_then(|factory| factory(entry, &state.options));
            match built {
                Ok(instance) => {
                    record_materialization(self.domain, true);
                    tracing::debug!(domain = self.domain, instance = %name, factory = %key, "instance materialized");
                    state.insert(name.to_string(), instance);
                }
                Err(e) => {
                    record_materialization(self.domain, false);
                    tracing::warn!(domain = self.domain, instance = %name, error = %e, "materialization failed");
                    state
                        .failures
                        .insert(name.to_string(), (e.kind(), e.message().to_string()));
                    errors.push(e.with_module(self.domain).with_metadata("instance", name));
                }
            }
        }

        state.initialized = true;
        errors
    }

    /// Returns the instance `name`.
    ///
    /// Fails with not-found when no such instance exists, or with the
    /// original failure when its entry could not be built.
    pub fn get(&self, name: &str) -> HarborResult<I> {
        let Partial { value, .. } = self.instances();
        if let Some(instance) = value.get(name) {
            return Ok(instance.clone());
        }
        if let Some((kind, message)) = self.state.read().failures.get(name) {
            return Err(Error::new(*kind, message.clone())
                .with_module(self.domain)
                .with_metadata("instance", name));
        }
        Err(Error::not_found(format!("{} '{name}' not found", self.domain))
            .with_module(self.domain)
            .with_metadata("instance", name))
    }

    /// Returns the domain default.
    ///
    /// Resolution order: `active`, `default`, the only enabled entry,
    /// `global`, [`DEFAULT_INSTANCE`], the only instance. Each name is used
    /// only when it resolves to a live instance.
    pub fn default(&self, global: &str) -> HarborResult<I> {
        let Partial { value, .. } = self.instances();
        let mut candidates = self.state.read().config.default_candidates();
        candidates.push(global.to_string());
        candidates.push(DEFAULT_INSTANCE.to_string());

        for name in &candidates {
            if name.is_empty() {
                continue;
            }
            if let Some(instance) = value.get(name) {
                return Ok(instance.clone());
            }
        }
        if value.len() == 1 {
            if let Some(instance) = value.values().next() {
                return Ok(instance.clone());
            }
        }

        Err(Error::not_found(format!(
            "no default {} among {} instance(s)",
            self.domain,
            value.len()
        ))
        .with_module(self.domain)
        .with_metadata("global", global))
    }

    /// Snapshot of the cache without materializing.
    #[must_use]
    pub fn cached(&self) -> HashMap<String, I> {
        self.state.read().instances.clone()
    }

    /// The provisional default name computed by `set_config`.
    #[must_use]
    pub fn default_name(&self) -> Option<String> {
        self.state.read().default_name.clone()
    }

    /// Returns `true` once the current configuration has been materialized.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state.read().initialized
    }

    /// Removes and returns every cached instance, manual ones included,
    /// most recently materialized first. The provider is left uninitialized.
    pub fn drain(&self) -> Vec<(String, I)> {
        let mut state = self.state.write();
        let order = std::mem::take(&mut state.order);
        let mut instances = std::mem::take(&mut state.instances);
        state.manual.clear();
        state.failures.clear();
        state.initialized = false;
        order
            .into_iter()
            .rev()
            .filter_map(|name| instances.remove(&name).map(|i| (name, i)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harbor_config::CacheEntry;
    use harbor_core::DuplicatePolicy;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Named = Arc<String>;

    fn registry() -> Arc<InstanceRegistry<CacheEntry, Named>> {
        let registry = InstanceRegistry::new("cache", DuplicatePolicy::Panic);
        registry.register(
            "memory",
            Arc::new(|e: &CacheEntry, _: &Options| Ok(Arc::new(format!("mem:{}", e.identity())))),
        );
        registry.register(
            "broken",
            Arc::new(|_: &CacheEntry, _: &Options| Err(Error::unavailable("cannot connect"))),
        );
        Arc::new(registry)
    }

    fn provider(entries: Vec<CacheEntry>) -> Provider<CacheEntry, Named> {
        let provider = Provider::new("cache", registry());
        provider.set_config(ComponentGroup::with_configs(entries), Options::new());
        provider
    }

    #[test]
    fn test_lazy_materialization_and_identity() {
        let provider = provider(vec![CacheEntry::new("a", "memory"), CacheEntry::new("", "memory")]);
        assert!(!provider.is_initialized());
        assert!(provider.cached().is_empty());

        let a1 = provider.get("a").unwrap();
        let a2 = provider.get("a").unwrap();
        assert!(Arc::ptr_eq(&a1, &a2));
        assert_eq!(*provider.get("memory").unwrap(), "mem:memory");
        assert!(provider.is_initialized());
    }

    #[test]
    fn test_disabled_entries_are_skipped() {
        let mut off = CacheEntry::new("off", "memory");
        off.enabled = false;
        let provider = provider(vec![off, CacheEntry::new("on", "memory")]);

        let all = provider.instances().into_result().unwrap();
        assert_eq!(all.len(), 1);
        assert!(all.contains_key("on"));
        assert_eq!(provider.get("off").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_partial_success_reports_failures() {
        let provider = provider(vec![
            CacheEntry::new("ok", "memory"),
            CacheEntry::new("bad", "broken"),
            CacheEntry::new("ghost", "redis"),
        ]);

        let (instances, errors) = provider.instances().into_parts();
        assert_eq!(instances.len(), 1);
        assert_eq!(errors.len(), 2);
        assert_eq!(provider.get("bad").unwrap_err().kind(), ErrorKind::Unavailable);
        assert_eq!(provider.get("ghost").unwrap_err().kind(), ErrorKind::NotFound);

        // later calls are cache hits without errors
        assert!(provider.instances().is_complete());
    }

    #[test]
    fn test_default_resolution_order() {
        let active = Provider::new("cache", registry());
        active.set_config(
            ComponentGroup::with_configs(vec![
                CacheEntry::new("a", "memory"),
                CacheEntry::new("b", "memory"),
            ])
            .with_active("b"),
            Options::new(),
        );
        assert_eq!(*active.default("a").unwrap(), "mem:b");

        let global = provider(vec![CacheEntry::new("a", "memory"), CacheEntry::new("b", "memory")]);
        assert_eq!(*global.default("a").unwrap(), "mem:a");

        let fallback = provider(vec![
            CacheEntry::new("default", "memory"),
            CacheEntry::new("b", "memory"),
        ]);
        assert_eq!(*fallback.default("").unwrap(), "mem:default");

        let stale = Provider::new("cache", registry());
        stale.set_config(
            ComponentGroup::with_configs(vec![
                CacheEntry::new("a", "memory"),
                CacheEntry::new("b", "memory"),
            ])
            .with_active("gone")
            .with_default("b"),
            Options::new(),
        );
        assert_eq!(*stale.default("a").unwrap(), "mem:b");

        let ambiguous = provider(vec![CacheEntry::new("a", "memory"), CacheEntry::new("b", "memory")]);
        assert_eq!(ambiguous.default("zzz").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_manual_registration_survives_reconfiguration() {
        let provider = provider(vec![CacheEntry::new("a", "memory")]);
        let manual: Named = Arc::new("manual".to_string());
        provider.register("a", Arc::clone(&manual));

        assert!(Arc::ptr_eq(&provider.get("a").unwrap(), &manual));

        provider.set_config(ComponentGroup::default(), Options::new());
        assert!(Arc::ptr_eq(&provider.get("a").unwrap(), &manual));
    }

    #[test]
    fn test_concurrent_first_access_builds_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let registry = InstanceRegistry::new("cache", DuplicatePolicy::Panic);
        registry.register(
            "counted",
            Arc::new(move |_: &CacheEntry, _: &Options| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new("x".to_string()))
            }) as InstanceFactory<CacheEntry, Named>,
        );
        let provider = Arc::new(Provider::new("cache", Arc::new(registry)));
        provider.set_config(
            ComponentGroup::with_configs(vec![CacheEntry::new("c", "counted")]),
            Options::new(),
        );

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let provider = Arc::clone(&provider);
                std::thread::spawn(move || provider.get("c").map(|_| ()))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drain_returns_reverse_materialization_order() {
        let provider = provider(vec![CacheEntry::new("a", "memory"), CacheEntry::new("b", "memory")]);
        provider.register("m", Arc::new("manual".to_string()));
        provider.instances();

        let names: Vec<String> = provider.drain().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b", "a", "m"]);
        assert!(provider.cached().is_empty());
    }
}
