//! VerificationManager - adapter registry with priority-based fallback
//!
//! Adapters are keyed by lowercase name. Instances come either from
//! [`VerificationManager::register_adapter`] or from a factory combined with
//! an enabled [`AdapterConfig`] entry. Resolution tries the preferred
//! adapter, then the default, then (with fallback enabled) every remaining
//! ready adapter by descending priority. Equal priorities resolve in
//! registration order.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info, warn};

use crate::adapter::{CapabilitySet, VerificationAdapter, VerificationError};
use crate::config::{AdapterConfig, AdapterSettings, ManagerConfig, normalize_adapter_name as normalize};
use crate::events::{AdapterEventData, EventBus, EventType, ServiceType, panic_message};

/// Builds an adapter instance from its settings
pub type AdapterFactory =
    Arc<dyn Fn(&AdapterSettings) -> Result<Arc<dyn VerificationAdapter>, VerificationError> + Send + Sync>;

struct RegisteredAdapter {
    instance: Arc<dyn VerificationAdapter>,
    capabilities: CapabilitySet,
    seq: u64,
}

#[derive(Default)]
struct ManagerState {
    adapters: HashMap<String, RegisteredAdapter>,
    factories: HashMap<String, AdapterFactory>,
    configs: HashMap<String, AdapterConfig>,
    default_adapter: Option<String>,
    fallback_enabled: bool,
    next_seq: u64,
}

impl ManagerState {
    fn install(&mut self, name: String, instance: Arc<dyn VerificationAdapter>) {
        let capabilities = instance.capabilities();
        // replacing keeps the original registration position
        let seq = match self.adapters.get(&name) {
            Some(existing) => existing.seq,
            None => {
                self.next_seq += 1;
                self.next_seq
            }
        };
        self.adapters.insert(
            name,
            RegisteredAdapter {
                instance,
                capabilities,
                seq,
            },
        );
    }

    fn priority(&self, name: &str) -> i32 {
        self.configs.get(name).map(|c| c.priority).unwrap_or(0)
    }

    /// Names in registration order
    fn names(&self) -> Vec<String> {
        let mut entries: Vec<(&String, u64)> = self.adapters.iter().map(|(n, a)| (n, a.seq)).collect();
        entries.sort_by_key(|(_, seq)| *seq);
        entries.into_iter().map(|(n, _)| n.clone()).collect()
    }

    /// Default name, only when it refers to a registered adapter
    fn effective_default(&self) -> Option<String> {
        self.default_adapter
            .as_ref()
            .filter(|name| self.adapters.contains_key(*name))
            .cloned()
    }

    /// Instances by descending priority, ties in registration order
    fn by_priority(&self) -> Vec<(String, Arc<dyn VerificationAdapter>)> {
        let mut entries: Vec<(&String, &RegisteredAdapter)> = self.adapters.iter().collect();
        entries.sort_by(|(a_name, a), (b_name, b)| {
            self.priority(b_name)
                .cmp(&self.priority(a_name))
                .then(a.seq.cmp(&b.seq))
        });
        entries
            .into_iter()
            .map(|(name, adapter)| (name.clone(), adapter.instance.clone()))
            .collect()
    }
}

/// Registry of verification adapters
pub struct VerificationManager {
    state: Mutex<ManagerState>,
    bus: Option<Arc<EventBus>>,
}

impl VerificationManager {
    /// Empty registry with fallback disabled
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ManagerState::default()),
            bus: None,
        }
    }

    /// Registry seeded with adapter configs, default name, and fallback flag
    ///
    /// No instances exist until matching factories are registered.
    pub fn from_config(config: &ManagerConfig) -> Self {
        debug!(
            adapters = config.adapters.len(),
            default = ?config.default_adapter,
            fallback = config.enable_fallback,
            "VerificationManager::from_config: called"
        );
        let mut state = ManagerState {
            default_adapter: config.default_adapter.as_deref().map(normalize),
            fallback_enabled: config.enable_fallback,
            ..Default::default()
        };
        for adapter in &config.adapters {
            state.configs.insert(adapter.normalized_name(), adapter.clone());
        }
        Self {
            state: Mutex::new(state),
            bus: None,
        }
    }

    /// Emit adapter lifecycle events onto `bus`
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn event_bus(&self) -> Option<&Arc<EventBus>> {
        self.bus.as_ref()
    }

    fn state(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event_type: EventType, data: AdapterEventData) {
        if let Some(bus) = &self.bus {
            bus.emit(event_type, data);
        }
    }

    /// Store a factory; construct an instance now if an enabled config exists
    ///
    /// Returns true when an instance was constructed. Factory errors and
    /// panics are logged and leave the adapter unregistered.
    pub fn register_factory<F>(&self, name: &str, factory: F) -> bool
    where
        F: Fn(&AdapterSettings) -> Result<Arc<dyn VerificationAdapter>, VerificationError> + Send + Sync + 'static,
    {
        let name = normalize(name);
        debug!(%name, "VerificationManager::register_factory: called");
        let factory: AdapterFactory = Arc::new(factory);

        let settings = {
            let mut state = self.state();
            state.factories.insert(name.clone(), factory.clone());
            match state.configs.get(&name) {
                Some(config) if config.enabled => config.config.clone(),
                Some(_) => {
                    debug!(%name, "VerificationManager::register_factory: config disabled, not constructing");
                    return false;
                }
                None => {
                    debug!(%name, "VerificationManager::register_factory: no config, not constructing");
                    return false;
                }
            }
        };

        let built = catch_unwind(AssertUnwindSafe(|| factory(&settings)))
            .unwrap_or_else(|panic| Err(VerificationError::configuration(panic_message(&*panic), vec![])));

        match built {
            Ok(instance) => {
                {
                    let mut state = self.state();
                    // a concurrent re-registration or removal wins
                    let current = state.factories.get(&name).is_some_and(|f| Arc::ptr_eq(f, &factory));
                    if !current {
                        debug!(%name, "VerificationManager::register_factory: factory superseded, discarding instance");
                        return false;
                    }
                    state.install(name.clone(), instance);
                }
                info!(%name, "Adapter initialized");
                self.emit(EventType::AdapterInitialized, AdapterEventData::new(&name, "initialized"));
                true
            }
            Err(e) => {
                error!(%name, error = %e, "Failed to initialize adapter");
                self.emit(
                    EventType::AdapterError,
                    AdapterEventData::new(&name, "error").with_reason(e.to_string()),
                );
                false
            }
        }
    }

    /// Install a pre-built instance, replacing any existing one
    pub fn register_adapter(&self, name: &str, adapter: Arc<dyn VerificationAdapter>) {
        let name = normalize(name);
        debug!(%name, "VerificationManager::register_adapter: called");
        self.state().install(name, adapter);
    }

    /// Install a pre-built instance with a fallback priority
    pub fn register_adapter_with_priority(&self, name: &str, adapter: Arc<dyn VerificationAdapter>, priority: i32) {
        let name = normalize(name);
        debug!(%name, priority, "VerificationManager::register_adapter_with_priority: called");
        let mut state = self.state();
        state
            .configs
            .entry(name.clone())
            .and_modify(|c| c.priority = priority)
            .or_insert_with(|| AdapterConfig::new(name.clone()).with_priority(priority));
        state.install(name, adapter);
    }

    /// Ready adapter by name
    pub fn get_adapter(&self, name: &str) -> Result<Arc<dyn VerificationAdapter>, VerificationError> {
        let key = normalize(name);
        debug!(name = %key, "VerificationManager::get_adapter: called");
        let instance = {
            let state = self.state();
            match state.adapters.get(&key) {
                Some(adapter) => adapter.instance.clone(),
                None => {
                    return Err(VerificationError::AdapterNotFound {
                        name: name.to_string(),
                        available: state.names(),
                    });
                }
            }
        };

        if !instance.is_ready() {
            return Err(VerificationError::NotReady { name: key });
        }
        Ok(instance)
    }

    /// Configured default, or the first registered adapter when none is set
    pub fn get_default_adapter(&self) -> Result<Arc<dyn VerificationAdapter>, VerificationError> {
        debug!("VerificationManager::get_default_adapter: called");
        let (default, first, available) = {
            let state = self.state();
            let names = state.names();
            let first = names
                .first()
                .and_then(|n| state.adapters.get(n))
                .map(|a| a.instance.clone());
            (state.effective_default(), first, names)
        };

        match default {
            Some(name) => self.get_adapter(&name),
            None => first.ok_or_else(|| {
                VerificationError::configuration("No default adapter configured and no adapters available", available)
            }),
        }
    }

    /// Resolve the best available adapter
    ///
    /// Order: `preferred`, then the default, then (fallback enabled) every
    /// other ready adapter by descending priority. With fallback disabled,
    /// resolution errors propagate and an empty resolution is a
    /// configuration error. With fallback enabled, `Ok(None)` means every
    /// candidate was exhausted.
    pub fn get_adapter_with_fallback(
        &self,
        preferred: Option<&str>,
    ) -> Result<Option<Arc<dyn VerificationAdapter>>, VerificationError> {
        Ok(self.resolve_adapter(preferred)?.map(|(_, adapter)| adapter))
    }

    /// Same resolution as [`Self::get_adapter_with_fallback`], also
    /// returning the registration name the adapter was found under
    pub fn resolve_adapter(
        &self,
        preferred: Option<&str>,
    ) -> Result<Option<(String, Arc<dyn VerificationAdapter>)>, VerificationError> {
        let preferred = preferred.map(normalize);
        debug!(preferred = ?preferred, "VerificationManager::resolve_adapter: called");
        let (default, fallback_enabled) = {
            let state = self.state();
            (state.effective_default(), state.fallback_enabled)
        };

        if let Some(name) = &preferred {
            match self.get_adapter(name) {
                Ok(adapter) => return Ok(Some((name.clone(), adapter))),
                Err(e) if !fallback_enabled => return Err(e),
                Err(e) => warn!(adapter = %name, error = %e, "Preferred adapter not available, trying fallback"),
            }
        }

        if let Some(name) = default.as_ref().filter(|d| preferred.as_ref() != Some(*d)) {
            match self.get_adapter(name) {
                Ok(adapter) => {
                    if let Some(requested) = &preferred {
                        self.emit_fallback(name, requested);
                    }
                    return Ok(Some((name.clone(), adapter)));
                }
                Err(e) if !fallback_enabled => return Err(e),
                Err(e) => warn!(adapter = %name, error = %e, "Default adapter not available, trying fallback"),
            }
        }

        if !fallback_enabled {
            return Err(VerificationError::configuration(
                "No preferred or default adapter to resolve and fallback is disabled",
                self.available_adapters(),
            ));
        }

        let candidates = self.state().by_priority();
        for (name, adapter) in candidates {
            if preferred.as_ref() == Some(&name) || default.as_ref() == Some(&name) {
                continue;
            }
            if adapter.is_ready() {
                warn!(adapter = %name, "Using fallback adapter");
                if let Some(requested) = preferred.as_ref().or(default.as_ref()) {
                    self.emit_fallback(&name, requested);
                }
                return Ok(Some((name, adapter)));
            }
        }

        warn!("No ready adapter found during fallback resolution");
        Ok(None)
    }

    fn emit_fallback(&self, chosen: &str, requested: &str) {
        self.emit(
            EventType::AdapterFallback,
            AdapterEventData::new(chosen, "fallback")
                .with_previous(requested)
                .with_reason(format!("'{}' unavailable", requested)),
        );
    }

    /// Names of every registered adapter, in registration order
    pub fn available_adapters(&self) -> Vec<String> {
        self.state().names()
    }

    /// Names of registered adapters that currently report ready
    pub fn ready_adapters(&self) -> Vec<String> {
        let entries: Vec<(String, Arc<dyn VerificationAdapter>)> = {
            let state = self.state();
            state
                .names()
                .into_iter()
                .filter_map(|n| state.adapters.get(&n).map(|a| (n.clone(), a.instance.clone())))
                .collect()
        };
        entries
            .into_iter()
            .filter(|(_, adapter)| adapter.is_ready())
            .map(|(name, _)| name)
            .collect()
    }

    pub fn has_adapter(&self, name: &str) -> bool {
        self.state().adapters.contains_key(&normalize(name))
    }

    pub fn is_adapter_ready(&self, name: &str) -> bool {
        let instance = self.state().adapters.get(&normalize(name)).map(|a| a.instance.clone());
        instance.is_some_and(|adapter| adapter.is_ready())
    }

    /// Capabilities captured at registration
    pub fn capabilities_of(&self, name: &str) -> Option<CapabilitySet> {
        self.state().adapters.get(&normalize(name)).map(|a| a.capabilities)
    }

    /// Registered adapters serving `service`, in registration order
    pub fn adapters_supporting(&self, service: ServiceType) -> Vec<String> {
        let state = self.state();
        state
            .names()
            .into_iter()
            .filter(|n| state.adapters.get(n).is_some_and(|a| a.capabilities.contains(service)))
            .collect()
    }

    /// Configured fallback priority (0 when unset)
    pub fn priority_of(&self, name: &str) -> i32 {
        self.state().priority(&normalize(name))
    }

    /// Registered adapters in fallback order
    pub fn fallback_order(&self) -> Vec<String> {
        self.state().by_priority().into_iter().map(|(name, _)| name).collect()
    }

    /// Make `name` the default; it must be registered
    pub fn set_default_adapter(&self, name: &str) -> Result<(), VerificationError> {
        let key = normalize(name);
        debug!(name = %key, "VerificationManager::set_default_adapter: called");
        let previous = {
            let mut state = self.state();
            if !state.adapters.contains_key(&key) {
                return Err(VerificationError::configuration(
                    format!("Cannot set '{}' as default adapter. Adapter not registered", name),
                    state.names(),
                ));
            }
            state.default_adapter.replace(key.clone())
        };

        if previous.as_deref() != Some(key.as_str()) {
            info!(adapter = %key, previous = ?previous, "Default adapter switched");
            let mut data = AdapterEventData::new(&key, "switched");
            if let Some(previous) = previous {
                data = data.with_previous(previous);
            }
            self.emit(EventType::AdapterSwitched, data);
        }
        Ok(())
    }

    /// Default adapter name, if it refers to a registered adapter
    pub fn default_adapter_name(&self) -> Option<String> {
        self.state().effective_default()
    }

    pub fn set_fallback_enabled(&self, enabled: bool) {
        debug!(enabled, "VerificationManager::set_fallback_enabled: called");
        self.state().fallback_enabled = enabled;
    }

    pub fn is_fallback_enabled(&self) -> bool {
        self.state().fallback_enabled
    }

    /// Drop an adapter with its factory and config; returns true if an
    /// instance was registered
    pub fn remove_adapter(&self, name: &str) -> bool {
        let key = normalize(name);
        debug!(name = %key, "VerificationManager::remove_adapter: called");
        let mut state = self.state();
        let removed = state.adapters.remove(&key).is_some();
        state.factories.remove(&key);
        state.configs.remove(&key);
        if state.default_adapter.as_deref() == Some(key.as_str()) {
            state.default_adapter = None;
        }
        removed
    }

    /// Remove every adapter, factory, and config, and unset the default
    pub fn clear(&self) {
        debug!("VerificationManager::clear: called");
        let mut state = self.state();
        state.adapters.clear();
        state.factories.clear();
        state.configs.clear();
        state.default_adapter = None;
    }
}

impl Default for VerificationManager {
    fn default() -> Self {
        Self::new()
    }
}
