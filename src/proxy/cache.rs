//! Identity-keyed wrapper cache.
//!
//! Host objects arrive as [`HostHandle`]s: shared pointers to something implementing
//! [`HostObject`]. Two handles denote the same host object exactly when they point at the same
//! allocation, regardless of what the object's fields compare equal to. [`ProxyCache`] keys its
//! entries on that address and keeps a clone of the handle alive inside the proxy, so the
//! address cannot be reused by the host while the entry exists.
//!
//! # Lifecycle
//!
//! - [`ProxyCache::get_or_create`] creates a proxy lazily on first access.
//! - [`ProxyCache::release`] drops one entry (host object destroyed).
//! - [`ProxyCache::sweep_destroyed`] drops every entry whose host object reports destruction.
//! - [`ProxyCache::teardown`] drops everything (round restart).
//!
//! A proxy handed out before a release stays a valid Rust value, but it is stale: it is no
//! longer the canonical wrapper, and the next `get_or_create` for the same handle produces a
//! fresh proxy with no attributes. Callers must re-resolve after a teardown boundary; the cache
//! does not check liveness on every access.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, RwLock},
};

use dashmap::DashMap;

use crate::metadata::diagnostics::{Diagnostic, DiagnosticCategory, DiagnosticSeverity, Diagnostics};

/// An opaque object owned by the host.
pub trait HostObject: Send + Sync {
    /// The runtime-reported category used to pick the wrapper variant.
    fn category(&self) -> HostCategory;

    /// Serial number, if the host assigns one.
    fn serial(&self) -> Option<u16> {
        None
    }

    /// Returns true once the host has destroyed the object.
    fn is_destroyed(&self) -> bool {
        false
    }
}

/// Shared handle to a host object.
pub type HostHandle = Arc<dyn HostObject>;

/// Runtime category reported by a host object.
///
/// `name` is the host's concrete type name. Throwable items additionally report the category
/// of the projectile they spawn.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostCategory {
    name: String,
    projectile: Option<String>,
}

impl HostCategory {
    /// Creates a category from the host's type name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            projectile: None,
        }
    }

    /// Adds the projectile sub-category.
    #[must_use]
    pub fn with_projectile(mut self, projectile: impl Into<String>) -> Self {
        self.projectile = Some(projectile.into());
        self
    }

    /// The host's type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The projectile sub-category, if any.
    #[must_use]
    pub fn projectile(&self) -> Option<&str> {
        self.projectile.as_deref()
    }
}

impl fmt::Display for HostCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.projectile {
            Some(projectile) => write!(f, "{}<{projectile}>", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// A closed set of wrapper variants and its construction table.
pub trait ProxyKind: fmt::Debug + Clone + Send + Sync + 'static {
    /// Maps a category onto a variant, or `None` if the category is unknown.
    fn classify(category: &HostCategory) -> Option<Self>;

    /// The variant used for unknown categories.
    fn generic() -> Self;
}

/// The canonical wrapper for one host object.
pub struct Proxy<K: ProxyKind> {
    handle: HostHandle,
    kind: K,
    category: HostCategory,
    serial: Option<u16>,
    attributes: RwLock<HashMap<String, String>>,
}

impl<K: ProxyKind> Proxy<K> {
    fn new(handle: HostHandle, kind: K, category: HostCategory) -> Self {
        let serial = handle.serial();
        Self {
            handle,
            kind,
            category,
            serial,
            attributes: RwLock::new(HashMap::new()),
        }
    }

    /// The wrapped host object.
    #[must_use]
    pub fn handle(&self) -> &HostHandle {
        &self.handle
    }

    /// The variant chosen at construction.
    #[must_use]
    pub fn kind(&self) -> &K {
        &self.kind
    }

    /// The category the host reported at construction.
    #[must_use]
    pub fn category(&self) -> &HostCategory {
        &self.category
    }

    /// The serial number reported at construction.
    #[must_use]
    pub fn serial(&self) -> Option<u16> {
        self.serial
    }

    /// Returns true if this proxy wraps `handle`.
    #[must_use]
    pub fn wraps(&self, handle: &HostHandle) -> bool {
        identity(&self.handle) == identity(handle)
    }

    /// Reads an extension attribute.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<String> {
        read_lock!(self.attributes).get(key).cloned()
    }

    /// Sets an extension attribute, returning the previous value.
    pub fn set_attribute(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Option<String> {
        write_lock!(self.attributes).insert(key.into(), value.into())
    }

    /// Removes an extension attribute.
    pub fn remove_attribute(&self, key: &str) -> Option<String> {
        write_lock!(self.attributes).remove(key)
    }

    /// Number of extension attributes.
    #[must_use]
    pub fn attribute_count(&self) -> usize {
        read_lock!(self.attributes).len()
    }
}

impl<K: ProxyKind> fmt::Debug for Proxy<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("kind", &self.kind)
            .field("category", &self.category)
            .field("serial", &self.serial)
            .finish_non_exhaustive()
    }
}

fn identity(handle: &HostHandle) -> usize {
    Arc::as_ptr(handle).cast::<()>() as usize
}

/// One wrapper per live host object.
pub struct ProxyCache<K: ProxyKind> {
    entries: DashMap<usize, Arc<Proxy<K>>>,
    serials: DashMap<u16, usize>,
    diagnostics: Arc<Diagnostics>,
}

impl<K: ProxyKind> Default for ProxyCache<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ProxyKind> fmt::Debug for ProxyCache<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyCache")
            .field("entries", &self.entries.len())
            .field("serials", &self.serials.len())
            .finish()
    }
}

impl<K: ProxyKind> ProxyCache<K> {
    /// Creates an empty cache with its own diagnostics sink.
    #[must_use]
    pub fn new() -> Self {
        Self::with_diagnostics(Arc::new(Diagnostics::new()))
    }

    /// Creates an empty cache reporting unknown categories into `diagnostics`.
    #[must_use]
    pub fn with_diagnostics(diagnostics: Arc<Diagnostics>) -> Self {
        Self {
            entries: DashMap::new(),
            serials: DashMap::new(),
            diagnostics,
        }
    }

    /// The diagnostics sink.
    #[must_use]
    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diagnostics
    }

    /// Returns the wrapper for `handle`, creating it on first access.
    ///
    /// Unknown categories fall back to [`ProxyKind::generic`] and leave a warning diagnostic.
    pub fn get_or_create(&self, handle: &HostHandle) -> Arc<Proxy<K>> {
        let key = identity(handle);
        let proxy = self
            .entries
            .entry(key)
            .or_insert_with(|| Arc::new(self.construct(handle)))
            .value()
            .clone();

        if let Some(serial) = proxy.serial() {
            self.serials.insert(serial, key);
        }
        proxy
    }

    fn construct(&self, handle: &HostHandle) -> Proxy<K> {
        let category = handle.category();
        let kind = K::classify(&category).unwrap_or_else(|| {
            self.diagnostics.push(Diagnostic::new(
                DiagnosticSeverity::Warning,
                DiagnosticCategory::Proxy,
                format!("unknown host category {category}, using {:?}", K::generic()),
            ));
            K::generic()
        });
        Proxy::new(Arc::clone(handle), kind, category)
    }

    /// Returns the existing wrapper for `handle` without creating one.
    #[must_use]
    pub fn get(&self, handle: &HostHandle) -> Option<Arc<Proxy<K>>> {
        self.entries
            .get(&identity(handle))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Returns the live wrapper whose host object reported `serial`.
    #[must_use]
    pub fn get_by_serial(&self, serial: u16) -> Option<Arc<Proxy<K>>> {
        let key = *self.serials.get(&serial)?.value();
        self.entries.get(&key).map(|entry| Arc::clone(entry.value()))
    }

    /// Removes the entry for `handle`, returning the retired wrapper.
    pub fn release(&self, handle: &HostHandle) -> Option<Arc<Proxy<K>>> {
        self.remove(identity(handle))
    }

    fn remove(&self, key: usize) -> Option<Arc<Proxy<K>>> {
        let (_, proxy) = self.entries.remove(&key)?;
        if let Some(serial) = proxy.serial() {
            self.serials.remove_if(&serial, |_, owner| *owner == key);
        }
        Some(proxy)
    }

    /// Removes every entry whose host object reports destruction. Returns how many were removed.
    pub fn sweep_destroyed(&self) -> usize {
        let destroyed: Vec<usize> = self
            .entries
            .iter()
            .filter(|entry| entry.value().handle().is_destroyed())
            .map(|entry| *entry.key())
            .collect();

        let released = destroyed
            .into_iter()
            .filter(|key| self.remove(*key).is_some())
            .count();
        log::debug!("proxy sweep released {released} destroyed entries");
        released
    }

    /// Removes every entry. Returns how many were removed.
    pub fn teardown(&self) -> usize {
        let released = self.entries.len();
        self.entries.clear();
        self.serials.clear();
        log::debug!("proxy teardown released {released} entries");
        released
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, Clone, PartialEq)]
    enum Shape {
        Round,
        Other,
    }

    impl ProxyKind for Shape {
        fn classify(category: &HostCategory) -> Option<Self> {
            (category.name() == "Round").then_some(Shape::Round)
        }

        fn generic() -> Self {
            Shape::Other
        }
    }

    struct Thing {
        category: &'static str,
        serial: Option<u16>,
        destroyed: AtomicBool,
    }

    impl HostObject for Thing {
        fn category(&self) -> HostCategory {
            HostCategory::new(self.category)
        }

        fn serial(&self) -> Option<u16> {
            self.serial
        }

        fn is_destroyed(&self) -> bool {
            self.destroyed.load(Ordering::SeqCst)
        }
    }

    fn thing(category: &'static str, serial: Option<u16>) -> Arc<Thing> {
        Arc::new(Thing {
            category,
            serial,
            destroyed: AtomicBool::new(false),
        })
    }

    #[test]
    fn test_identity_not_equality() {
        let cache: ProxyCache<Shape> = ProxyCache::new();
        let a: HostHandle = thing("Round", None);
        let b: HostHandle = thing("Round", None);

        let first = cache.get_or_create(&a);
        let again = cache.get_or_create(&Arc::clone(&a));
        assert!(Arc::ptr_eq(&first, &again));
        assert!(!Arc::ptr_eq(&first, &cache.get_or_create(&b)));
        assert_eq!(cache.len(), 2);
        assert!(first.wraps(&a));
        assert!(!first.wraps(&b));
    }

    #[test]
    fn test_unknown_category_falls_back() {
        let cache: ProxyCache<Shape> = ProxyCache::new();
        let odd: HostHandle = thing("Teapot", None);
        assert_eq!(cache.get_or_create(&odd).kind(), &Shape::Other);
        assert_eq!(cache.diagnostics().warning_count(), 1);

        cache.get_or_create(&odd);
        assert_eq!(cache.diagnostics().warning_count(), 1);
    }

    #[test]
    fn test_teardown_yields_fresh_wrappers() {
        let cache: ProxyCache<Shape> = ProxyCache::new();
        let handle: HostHandle = thing("Round", Some(9));
        let old = cache.get_or_create(&handle);
        old.set_attribute("owner", "7");

        assert_eq!(cache.teardown(), 1);
        assert!(cache.get(&handle).is_none());
        assert!(cache.get_by_serial(9).is_none());

        let fresh = cache.get_or_create(&handle);
        assert!(!Arc::ptr_eq(&old, &fresh));
        assert_eq!(fresh.attribute_count(), 0);
        assert_eq!(old.attribute("owner").as_deref(), Some("7"));
    }

    #[test]
    fn test_serial_index_follows_entries() {
        let cache: ProxyCache<Shape> = ProxyCache::new();
        let handle: HostHandle = thing("Round", Some(42));
        let proxy = cache.get_or_create(&handle);
        let found = cache.get_by_serial(42).unwrap();
        assert!(Arc::ptr_eq(&proxy, &found));

        assert!(cache.release(&handle).is_some());
        assert!(cache.release(&handle).is_none());
        assert!(cache.get_by_serial(42).is_none());
    }

    #[test]
    fn test_sweep_only_destroyed() {
        let cache: ProxyCache<Shape> = ProxyCache::new();
        let alive = thing("Round", Some(1));
        let dead = thing("Round", Some(2));
        let alive_handle: HostHandle = alive.clone();
        let dead_handle: HostHandle = dead.clone();
        cache.get_or_create(&alive_handle);
        cache.get_or_create(&dead_handle);

        dead.destroyed.store(true, Ordering::SeqCst);
        assert_eq!(cache.sweep_destroyed(), 1);
        assert!(cache.get(&alive_handle).is_some());
        assert!(cache.get(&dead_handle).is_none());
        assert!(cache.get_by_serial(1).is_some());
        assert!(cache.get_by_serial(2).is_none());
        assert_eq!(cache.sweep_destroyed(), 0);
    }
}
