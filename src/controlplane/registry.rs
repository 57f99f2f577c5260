//! Backend Registry
//!
//! Each capability category keeps a list of named factories. A registry
//! instance picks one of them as active; [`Backends`] resolves every category
//! once at startup and hands the result to the orchestrator.

use super::backends::BackendContext;
use crate::domain::ports::{
    Category, Device, Filesystem, Gateway, Manager, MetadataServer, Monitor, ObjectStorage,
    PoolAllocator,
};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Builds a backend from the shared context
pub type Factory<T> = fn(&BackendContext) -> Arc<T>;

/// The selected backend of a registry
pub struct Active<T: ?Sized> {
    pub name: &'static str,
    pub backend: Arc<T>,
}

impl<T: ?Sized> Clone for Active<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            backend: self.backend.clone(),
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Named implementations of one capability category
pub struct Registry<T: ?Sized> {
    category: Category,
    entries: Vec<(&'static str, Factory<T>)>,
    active: Option<Active<T>>,
}

impl<T: ?Sized> Registry<T> {
    /// Create an empty registry for `category`
    pub fn new(category: Category) -> Self {
        Self {
            category,
            entries: Vec::new(),
            active: None,
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Register an implementation; a second registration under the same name replaces the first
    pub fn register(mut self, name: &'static str, factory: Factory<T>) -> Self {
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = factory,
            None => self.entries.push((name, factory)),
        }
        self
    }

    /// Registered names, in registration order
    pub fn available(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(name, _)| *name).collect()
    }

    pub fn active(&self) -> Option<&Active<T>> {
        self.active.as_ref()
    }

    /// Build the implementation registered as `name` and make it active
    pub fn select(&mut self, name: &str, ctx: &BackendContext) -> Result<&Active<T>> {
        let wanted = name.trim().to_lowercase();
        let Some((name, factory)) = self
            .entries
            .iter()
            .find(|(registered, _)| *registered == wanted)
            .copied()
        else {
            return Err(Error::UnknownBackend {
                category: self.category.to_string(),
                name: wanted,
                available: self.available().iter().map(|n| n.to_string()).collect(),
            });
        };

        debug!("Using {} backend `{}`", self.category, name);
        Ok(&*self.active.insert(Active {
            name,
            backend: factory(ctx),
        }))
    }

    /// Select `name` if given, fall back to the first registered backend, and return the active one
    pub fn resolve(&mut self, name: &str, ctx: &BackendContext) -> Result<Active<T>> {
        if !name.trim().is_empty() {
            self.select(name, ctx)?;
        }
        if self.active.is_none() {
            let Some(first) = self.entries.first().map(|(name, _)| *name) else {
                return Err(Error::UnknownBackend {
                    category: self.category.to_string(),
                    name: name.to_string(),
                    available: Vec::new(),
                });
            };
            self.select(first, ctx)?;
        }
        self.active
            .clone()
            .ok_or_else(|| Error::Internal(format!("no active {} backend", self.category)))
    }
}

// =============================================================================
// Resolved Backends
// =============================================================================

/// Backend names requested by the configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSelection {
    /// Used for every category except devices
    pub storage: String,
    pub device: String,
}

/// One registry per category
pub struct Registries {
    pub device: Registry<dyn Device>,
    pub filesystem: Registry<dyn Filesystem>,
    pub gateway: Registry<dyn Gateway>,
    pub mds: Registry<dyn MetadataServer>,
    pub mgr: Registry<dyn Manager>,
    pub mon: Registry<dyn Monitor>,
    pub osd: Registry<dyn ObjectStorage>,
    pub pool: Registry<dyn PoolAllocator>,
}

impl Registries {
    /// Registries with no implementations
    pub fn empty() -> Self {
        Self {
            device: Registry::new(Category::Device),
            filesystem: Registry::new(Category::Filesystem),
            gateway: Registry::new(Category::Gateway),
            mds: Registry::new(Category::Mds),
            mgr: Registry::new(Category::Mgr),
            mon: Registry::new(Category::Mon),
            osd: Registry::new(Category::Osd),
            pool: Registry::new(Category::Pool),
        }
    }
}

/// The active backend of every category
#[derive(Clone)]
pub struct Backends {
    pub device: Arc<dyn Device>,
    pub filesystem: Arc<dyn Filesystem>,
    pub gateway: Arc<dyn Gateway>,
    pub mds: Arc<dyn MetadataServer>,
    pub mgr: Arc<dyn Manager>,
    pub mon: Arc<dyn Monitor>,
    pub osd: Arc<dyn ObjectStorage>,
    pub pool: Arc<dyn PoolAllocator>,
}

impl Backends {
    /// Resolve every category from `registries`
    pub fn resolve(
        registries: &mut Registries,
        selection: &BackendSelection,
        ctx: &BackendContext,
    ) -> Result<Self> {
        let storage = selection.storage.as_str();
        Ok(Self {
            device: registries.device.resolve(&selection.device, ctx)?.backend,
            filesystem: registries.filesystem.resolve(storage, ctx)?.backend,
            gateway: registries.gateway.resolve(storage, ctx)?.backend,
            mds: registries.mds.resolve(storage, ctx)?.backend,
            mgr: registries.mgr.resolve(storage, ctx)?.backend,
            mon: registries.mon.resolve(storage, ctx)?.backend,
            osd: registries.osd.resolve(storage, ctx)?.backend,
            pool: registries.pool.resolve(storage, ctx)?.backend,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controlplane::backends::default_registries;
    use crate::testing::TestBed;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::path::PathBuf;

    struct NullDevice;

    #[async_trait]
    impl Device for NullDevice {
        async fn create_devices(&self, _size_gib: u64, count: u32) -> Result<Vec<PathBuf>> {
            Ok(self.device_paths(count))
        }

        async fn remove_devices(&self) -> Result<()> {
            Ok(())
        }

        fn device_paths(&self, count: u32) -> Vec<PathBuf> {
            (0..count).map(|i| PathBuf::from(format!("/dev/null{}", i))).collect()
        }
    }

    fn null_device(_: &BackendContext) -> Arc<dyn Device> {
        Arc::new(NullDevice)
    }

    #[test]
    fn test_select_and_resolve() {
        let bed = TestBed::new();
        let ctx = bed.context();
        let mut registries = default_registries();
        registries.device = registries.device.register("null", null_device);

        assert_eq!(registries.device.available(), vec!["brd", "null"]);
        assert!(registries.device.active().is_none());

        assert_eq!(registries.device.select("NULL", &ctx).unwrap().name, "null");
        let active = registries.device.resolve("", &ctx).unwrap();
        assert_eq!(active.name, "null");
        assert_eq!(active.backend.device_paths(1), vec![PathBuf::from("/dev/null0")]);

        assert_eq!(registries.device.resolve("brd", &ctx).unwrap().name, "brd");
    }

    #[test]
    fn test_resolve_defaults_to_first() {
        let bed = TestBed::new();
        let mut registry = default_registries().mon;
        let active = registry.resolve("", &bed.context()).unwrap();
        assert_eq!(active.name, "ceph");
    }

    #[test]
    fn test_unknown_backend() {
        let bed = TestBed::new();
        let mut registry = default_registries().osd;
        let err = registry.select("lustre", &bed.context()).err().unwrap();
        assert_matches!(err, Error::UnknownBackend { ref category, ref name, ref available }
            if category == "osd" && name == "lustre" && available == &vec!["ceph".to_string()]);
        assert!(registry.active().is_none());
    }

    #[test]
    fn test_empty_registry() {
        let bed = TestBed::new();
        let mut registry = Registry::<dyn Device>::new(Category::Device);
        assert_matches!(
            registry.resolve("", &bed.context()).err(),
            Some(Error::UnknownBackend { .. })
        );
    }

    #[test]
    fn test_resolve_all_backends() {
        let bed = TestBed::new();
        let selection = BackendSelection {
            storage: "ceph".into(),
            device: "brd".into(),
        };
        let mut registries = default_registries();
        let backends = Backends::resolve(&mut registries, &selection, &bed.context()).unwrap();
        assert_eq!(backends.device.device_paths(2).len(), 2);
        assert_eq!(registries.pool.active().map(|a| a.name), Some("ceph"));

        let bad = BackendSelection {
            storage: "gluster".into(),
            device: "brd".into(),
        };
        assert_matches!(
            Backends::resolve(&mut default_registries(), &bad, &bed.context()).err(),
            Some(Error::UnknownBackend { .. })
        );
    }
}
