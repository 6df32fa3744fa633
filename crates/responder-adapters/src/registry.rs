// crates/responder-adapters/src/registry.rs
// ============================================================================
// Module: Adapter Registry
// Description: Name-indexed adapter storage with an action reverse index.
// Purpose: Route step dispatch to registered adapters and sweep their health.
// Dependencies: responder-core
// ============================================================================

//! ## Overview
//! The registry owns every adapter instance the engine may dispatch through.
//! Adapters are keyed by unique name; a reverse index maps each supported
//! action to the set of adapter names serving it, invalidated atomically
//! under the same write lock as `register`/`unregister`. The registry is
//! read-mostly: dispatch takes a shared lock, registration an exclusive one.
//! Health and shutdown sweeps snapshot the instance list first so no lock is
//! held across adapter I/O.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;

use responder_core::Action;
use responder_core::Adapter;
use responder_core::AdapterConfig;
use responder_core::AdapterError;
use responder_core::AdapterName;
use responder_core::HealthReport;
use responder_core::Timestamp;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Registry operation errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// An adapter is already registered under the name.
    #[error("adapter already registered: {0}")]
    AlreadyRegistered(AdapterName),
    /// No adapter is registered under the name.
    #[error("adapter not registered: {0}")]
    NotRegistered(AdapterName),
    /// Adapter initialization failed during registration.
    #[error(transparent)]
    Initialization(#[from] AdapterError),
}

// ============================================================================
// SECTION: Registration Record
// ============================================================================

/// One registered adapter with its configuration and health bookkeeping.
///
/// # Invariants
/// - `registered_at` is fixed at registration.
#[derive(Clone)]
pub struct AdapterRegistration {
    /// Shared adapter instance.
    pub adapter: Arc<dyn Adapter>,
    /// Configuration the adapter was initialized with.
    pub config: AdapterConfig,
    /// Registration time.
    pub registered_at: Timestamp,
    /// Most recent health probe, when any.
    pub last_health_check: Option<HealthReport>,
}

/// Interior registry state guarded by one lock.
#[derive(Default)]
struct RegistryInner {
    /// Registrations keyed by adapter name.
    adapters: BTreeMap<AdapterName, AdapterRegistration>,
    /// Reverse index from action to serving adapter names.
    by_action: BTreeMap<Action, BTreeSet<AdapterName>>,
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Name-indexed adapter registry with an action reverse index.
///
/// # Invariants
/// - Adapter names are unique.
/// - The reverse index always reflects the registered adapters exactly.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    /// Shared interior state.
    inner: Arc<RwLock<RegistryInner>>,
}

impl AdapterRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers and initializes an adapter.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyRegistered`] on a name collision and
    /// [`RegistryError::Initialization`] when the adapter rejects its config.
    pub async fn register(
        &self,
        adapter: Arc<dyn Adapter>,
        config: AdapterConfig,
    ) -> Result<(), RegistryError> {
        let name = AdapterName::new(adapter.name());
        {
            let inner = self.read_inner();
            if inner.adapters.contains_key(&name) {
                return Err(RegistryError::AlreadyRegistered(name));
            }
        }
        adapter.initialize(&config).await?;
        let actions = adapter.supported_actions();
        let registration = AdapterRegistration {
            adapter,
            config,
            registered_at: Timestamp::now(),
            last_health_check: None,
        };
        let mut inner = self.write_inner();
        if inner.adapters.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }
        for action in actions {
            inner.by_action.entry(action).or_default().insert(name.clone());
        }
        inner.adapters.insert(name, registration);
        Ok(())
    }

    /// Removes an adapter and invalidates its reverse index entries.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotRegistered`] when the name is unknown.
    pub fn unregister(&self, name: &AdapterName) -> Result<AdapterRegistration, RegistryError> {
        let mut inner = self.write_inner();
        let Some(registration) = inner.adapters.remove(name) else {
            return Err(RegistryError::NotRegistered(name.clone()));
        };
        for names in inner.by_action.values_mut() {
            names.remove(name);
        }
        inner.by_action.retain(|_, names| !names.is_empty());
        Ok(registration)
    }

    /// Looks up an adapter by name.
    #[must_use]
    pub fn get(&self, name: &AdapterName) -> Option<Arc<dyn Adapter>> {
        self.read_inner().adapters.get(name).map(|registration| Arc::clone(&registration.adapter))
    }

    /// Returns the registration record for a name.
    #[must_use]
    pub fn registration(&self, name: &AdapterName) -> Option<AdapterRegistration> {
        self.read_inner().adapters.get(name).cloned()
    }

    /// Returns every adapter declaring support for the action.
    #[must_use]
    pub fn get_for_action(&self, action: Action) -> Vec<Arc<dyn Adapter>> {
        let inner = self.read_inner();
        inner.by_action.get(&action).map_or_else(Vec::new, |names| {
            names
                .iter()
                .filter_map(|name| inner.adapters.get(name))
                .map(|registration| Arc::clone(&registration.adapter))
                .collect()
        })
    }

    /// Lists registered adapter names in order.
    #[must_use]
    pub fn list(&self) -> Vec<AdapterName> {
        self.read_inner().adapters.keys().cloned().collect()
    }

    /// Returns the number of registered adapters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read_inner().adapters.len()
    }

    /// Returns true when no adapters are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read_inner().adapters.is_empty()
    }

    /// Probes every adapter and records the reports.
    ///
    /// Instances are snapshotted before probing so no lock is held across
    /// adapter I/O; reports are written back afterwards.
    pub async fn health_check_all(&self) -> BTreeMap<AdapterName, HealthReport> {
        let snapshot: Vec<(AdapterName, Arc<dyn Adapter>)> = {
            let inner = self.read_inner();
            inner
                .adapters
                .iter()
                .map(|(name, registration)| (name.clone(), Arc::clone(&registration.adapter)))
                .collect()
        };
        let mut reports = BTreeMap::new();
        for (name, adapter) in snapshot {
            let report = adapter.health_check().await;
            reports.insert(name, report);
        }
        {
            let mut inner = self.write_inner();
            for (name, report) in &reports {
                if let Some(registration) = inner.adapters.get_mut(name) {
                    registration.last_health_check = Some(report.clone());
                }
            }
        }
        reports
    }

    /// Shuts down every adapter, collecting per-adapter outcomes.
    pub async fn shutdown_all(&self) -> Vec<(AdapterName, Result<(), AdapterError>)> {
        let snapshot: Vec<(AdapterName, Arc<dyn Adapter>)> = {
            let inner = self.read_inner();
            inner
                .adapters
                .iter()
                .map(|(name, registration)| (name.clone(), Arc::clone(&registration.adapter)))
                .collect()
        };
        let mut outcomes = Vec::with_capacity(snapshot.len());
        for (name, adapter) in snapshot {
            outcomes.push((name, adapter.shutdown().await));
        }
        outcomes
    }

    /// Returns the narrow lookup capability handed to the scheduler.
    #[must_use]
    pub fn resolver(&self) -> AdapterResolver {
        AdapterResolver {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Acquires the shared lock, recovering from poisoning.
    fn read_inner(&self) -> std::sync::RwLockReadGuard<'_, RegistryInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquires the exclusive lock, recovering from poisoning.
    fn write_inner(&self) -> std::sync::RwLockWriteGuard<'_, RegistryInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// SECTION: Resolver Capability
// ============================================================================

/// Name-to-adapter lookup capability for the scheduler.
///
/// # Invariants
/// - Shares the registry's state; registrations are visible immediately.
#[derive(Clone)]
pub struct AdapterResolver {
    /// Shared registry state.
    inner: Arc<RwLock<RegistryInner>>,
}

impl AdapterResolver {
    /// Resolves an adapter by name.
    #[must_use]
    pub fn resolve(&self, name: &AdapterName) -> Option<Arc<dyn Adapter>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .adapters
            .get(name)
            .map(|registration| Arc::clone(&registration.adapter))
    }

    /// Returns the retry policy configured for an adapter.
    #[must_use]
    pub fn retry_policy(&self, name: &AdapterName) -> Option<responder_core::RetryPolicy> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .adapters
            .get(name)
            .map(|registration| registration.config.retry)
    }
}
