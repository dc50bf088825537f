//! Typed capability registry
//!
//! Modules receive their collaborators through an explicit registry passed
//! at initialization instead of attaching them to shared global state. Each
//! capability is addressed by a typed [`Capability`] key, so lookups return
//! the right trait object without casting at call sites.

use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::normalize::Normalizer;
use crate::notify::Notifier;
use crate::{Error, Result};

/// Typed key for a capability of type `T`.
pub struct Capability<T: ?Sized> {
    name: Cow<'static, str>,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized> Capability<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            _marker: PhantomData,
        }
    }

    /// The same capability scoped to one module, e.g. `normalizer:spells`.
    pub fn scoped(&self, scope: &str) -> Self {
        Self {
            name: Cow::Owned(format!("{}:{}", self.name, scope)),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T: ?Sized> Clone for Capability<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized> fmt::Debug for Capability<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Capability").field(&self.name).finish()
    }
}

/// Record normalization hook applied before fingerprinting
pub const NORMALIZER: Capability<dyn Normalizer> = Capability::new("normalizer");

/// Operator notification sink
pub const NOTIFIER: Capability<dyn Notifier> = Capability::new("notifier");

/// Map of capability name to implementation.
#[derive(Default)]
pub struct CapabilityRegistry {
    entries: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `value`, replacing any earlier provider.
    pub fn provide<T>(&mut self, capability: &Capability<T>, value: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        if self
            .entries
            .insert(capability.name().to_string(), Box::new(value))
            .is_some()
        {
            tracing::debug!(capability = capability.name(), "Replaced capability provider");
        }
    }

    pub fn get<T>(&self, capability: &Capability<T>) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.entries
            .get(capability.name())?
            .downcast_ref::<Arc<T>>()
            .cloned()
    }

    /// Like [`get`](Self::get), failing with [`Error::CapabilityMissing`].
    pub fn require<T>(&self, capability: &Capability<T>) -> Result<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.get(capability)
            .ok_or_else(|| Error::CapabilityMissing(capability.name().to_string()))
    }

    /// Module-scoped provider first, then the global one.
    pub fn get_scoped<T>(&self, capability: &Capability<T>, scope: &str) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.get(&capability.scoped(scope))
            .or_else(|| self.get(capability))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("capabilities", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedded::EmbeddedIdNormalizer;
    use crate::notify::MemoryNotifier;

    #[test]
    fn provide_and_get_trait_object() {
        let mut registry = CapabilityRegistry::new();
        registry.provide(&NORMALIZER, Arc::new(EmbeddedIdNormalizer::default()));

        let normalizer = registry.get(&NORMALIZER).unwrap();
        assert_eq!(normalizer.name(), "embedded-ids");
        assert!(registry.get(&NOTIFIER).is_none());
    }

    #[test]
    fn require_reports_missing_name() {
        let registry = CapabilityRegistry::new();
        let err = registry.require(&NOTIFIER).err().unwrap();
        assert_eq!(err.to_string(), "Capability not registered: notifier");
    }

    #[test]
    fn scoped_provider_wins_over_global() {
        let mut registry = CapabilityRegistry::new();
        registry.provide(&NORMALIZER, Arc::new(EmbeddedIdNormalizer::default()));
        registry.provide(
            &NORMALIZER.scoped("pets"),
            Arc::new(EmbeddedIdNormalizer::new(["items"])),
        );

        assert!(registry.contains("normalizer:pets"));
        assert_eq!(registry.names(), vec!["normalizer", "normalizer:pets"]);
        assert!(registry.get_scoped(&NORMALIZER, "pets").is_some());
        assert!(registry.get_scoped(&NORMALIZER, "spells").is_some());
    }

    #[test]
    fn notifier_round_trip() {
        let mut registry = CapabilityRegistry::new();
        let notifier = Arc::new(MemoryNotifier::new());
        registry.provide(&NOTIFIER, notifier.clone());
        assert!(registry.require(&NOTIFIER).is_ok());
    }
}
