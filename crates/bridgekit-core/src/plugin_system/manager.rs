use std::fmt::{self, Debug};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::kernel::component::KernelComponent;
use crate::kernel::context::HostContext;
use crate::kernel::error::{Error, KernelLifecyclePhase, Result};
use crate::plugin_system::descriptor::{
    LoadMode, LockToken, Operation, PluginDescriptor, SkipReason, TransitionError,
    TransitionOutcome,
};
use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::loader::PluginLoader;
use crate::plugin_system::manifest::{self, PluginManifest};
use crate::plugin_system::registry::{EntrySnapshot, PluginEntry, PluginRegistry};
use crate::plugin_system::resolver::{Resolver, is_valid_package_name};
use crate::plugin_system::traits::{Platform, PlatformContext, PlatformType, PluginError};
use crate::storage::{ConfigData, PluginConfigManager, RegistryStore};

/// Outcome of one plugin in a batch operation
pub type BatchOutcome = (String, Result<TransitionOutcome>);

/// Result of trying to take a plugin's transition lock
enum Acquired {
    Ready {
        descriptor: PluginDescriptor,
        platform: Option<Arc<dyn Platform>>,
        token: LockToken,
    },
    Refused(Refusal),
}

/// Why a transition was not attempted
enum Refusal {
    NotFound,
    Busy(EntrySnapshot),
    Skipped(EntrySnapshot, SkipReason),
}

impl Refusal {
    /// Reads device counters, so call it with the registry unlocked
    fn into_outcome(self) -> TransitionOutcome {
        match self {
            Refusal::NotFound => TransitionOutcome::NotFound,
            Refusal::Busy(snapshot) => TransitionOutcome::Busy(snapshot.with_counters()),
            Refusal::Skipped(snapshot, reason) => TransitionOutcome::Skipped {
                descriptor: snapshot.with_counters(),
                reason,
            },
        }
    }
}

/// What a successful load produced
struct LoadedPlatform {
    manifest: PluginManifest,
    platform: Arc<dyn Platform>,
    config: ConfigData,
    schema: Value,
}

/// The plugin lifecycle controller.
///
/// Owns the registry and every platform instance. Structural changes happen
/// under a short registry lock; a plugin's callbacks run outside of it with
/// only that plugin's [`LockToken`] held, so distinct plugins never wait on
/// each other. A transition requested while another one holds the token is
/// refused with [`TransitionOutcome::Busy`].
pub struct PluginManager {
    name: &'static str,
    context: Arc<HostContext>,
    registry: Arc<Mutex<PluginRegistry>>,
    loader: PluginLoader,
    resolver: Resolver,
    store: RegistryStore,
    configs: PluginConfigManager,
    save_lock: Mutex<()>,
}

impl PluginManager {
    pub fn new(context: Arc<HostContext>) -> Self {
        Self::with_loader(context, PluginLoader::new())
    }

    pub fn with_loader(context: Arc<HostContext>, loader: PluginLoader) -> Self {
        let store = RegistryStore::new(Arc::clone(context.storage()), context.registry_file());
        let configs = PluginConfigManager::new(
            Arc::clone(context.storage()),
            context.config_dir().to_path_buf(),
        );
        Self {
            name: "PluginManager",
            resolver: Resolver::new(Arc::clone(&context)),
            context,
            registry: Arc::new(Mutex::new(PluginRegistry::new())),
            loader,
            store,
            configs,
            save_lock: Mutex::new(()),
        }
    }

    pub fn context(&self) -> &Arc<HostContext> {
        &self.context
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn loader(&self) -> &PluginLoader {
        &self.loader
    }

    // --- Queries ---

    pub async fn get(&self, name: &str) -> Option<PluginDescriptor> {
        let snapshot = self.registry.lock().await.get(name).map(PluginEntry::snapshot);
        snapshot.map(EntrySnapshot::with_counters)
    }

    pub async fn has(&self, name: &str) -> bool {
        self.registry.lock().await.contains(name)
    }

    pub async fn len(&self) -> usize {
        self.registry.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.registry.lock().await.is_empty()
    }

    /// Every descriptor, in insertion order
    pub async fn descriptors(&self) -> Vec<PluginDescriptor> {
        let snapshots = self.registry.lock().await.snapshots();
        snapshots.into_iter().map(EntrySnapshot::with_counters).collect()
    }

    pub async fn names(&self) -> Vec<String> {
        self.registry.lock().await.names()
    }

    /// The live platform instance of a loaded plugin
    pub async fn platform(&self, name: &str) -> Option<Arc<dyn Platform>> {
        self.registry
            .lock()
            .await
            .get(name)
            .and_then(|entry| entry.platform.clone())
    }

    // --- Registration ---

    /// Register the plugin `identifier` resolves to.
    ///
    /// Returns `None` for an empty, unresolvable or malformed identifier, for a
    /// manifest whose name is not a valid package name, and for a plugin that
    /// is already registered. A package name whose manifest
    /// declares a different name is rejected with an error.
    pub async fn add(&self, identifier: &str) -> Result<Option<PluginDescriptor>> {
        self.context.ensure_active()?;
        let identifier = identifier.trim();
        if identifier.is_empty() {
            log::debug!("Refusing to add an empty plugin identifier");
            return Ok(None);
        }

        let Some(path) = self.resolver.resolve(identifier).await? else {
            log::warn!("Plugin {} not found", identifier);
            return Ok(None);
        };
        let Some(manifest) = manifest::read_manifest(&path).await? else {
            log::warn!("Plugin {} has a malformed manifest at {}", identifier, path.display());
            return Ok(None);
        };
        if !is_valid_package_name(&manifest.name) {
            log::warn!(
                "Plugin {} declares an invalid package name {:?} in {}",
                identifier,
                manifest.name,
                path.display()
            );
            return Ok(None);
        }
        if is_valid_package_name(identifier) && manifest.name != identifier {
            return Err(PluginSystemError::ManifestNameMismatch {
                expected: identifier.to_string(),
                found: manifest.name,
                path,
            }
            .into());
        }

        let descriptor = {
            let mut registry = self.registry.lock().await;
            if registry.contains(&manifest.name) || registry.find_by_path(&path).is_some() {
                log::warn!("Plugin {} already registered", manifest.name);
                return Ok(None);
            }
            let descriptor = PluginDescriptor::new(manifest.name.clone(), path);
            registry.insert(descriptor.clone());
            descriptor
        };

        if let Err(e) = self.persist().await {
            self.registry.lock().await.remove(&descriptor.name);
            return Err(e);
        }
        log::info!("Added plugin {}", descriptor.name);
        Ok(Some(descriptor))
    }

    /// Unregister a plugin, shutting it down first if it is loaded.
    ///
    /// Returns `None` if the plugin is not registered or a transition is in flight.
    pub async fn remove(&self, identifier: &str) -> Result<Option<PluginDescriptor>> {
        self.context.ensure_active()?;
        let Some(name) = self.lookup(identifier).await? else {
            log::warn!("Plugin {} not registered", identifier.trim());
            return Ok(None);
        };

        // Loaded state is re-checked under the lock that removes; a load may land in between
        let (index, entry) = loop {
            let removed = {
                let mut registry = self.registry.lock().await;
                let state = registry.get(&name).map(|entry| {
                    let loaded = entry.descriptor.is_loaded() || entry.platform.is_some();
                    (entry.descriptor.is_locked(), loaded)
                });
                match state {
                    None => return Ok(None),
                    Some((true, _)) => {
                        log::warn!("Cannot remove plugin {} while a transition is in flight", name);
                        return Ok(None);
                    }
                    Some((false, true)) => None,
                    Some((false, false)) => registry.remove(&name),
                }
            };
            if let Some(removed) = removed {
                break removed;
            }
            let outcome = self.shutdown(&name, "The plugin has been removed.", true).await?;
            if outcome.is_busy() || outcome.is_not_found() {
                return Ok(None);
            }
        };

        if let Err(e) = self.persist().await {
            self.registry.lock().await.restore(index, entry);
            return Err(e);
        }
        log::info!("Removed plugin {}", name);
        Ok(Some(entry.descriptor))
    }

    /// Allow the plugin to be loaded. Does not load it.
    pub async fn enable(&self, identifier: &str) -> Result<Option<PluginDescriptor>> {
        self.set_enabled(identifier, true).await
    }

    /// Refuse future loads of the plugin. A loaded plugin keeps running.
    pub async fn disable(&self, identifier: &str) -> Result<Option<PluginDescriptor>> {
        self.set_enabled(identifier, false).await
    }

    async fn set_enabled(&self, identifier: &str, enabled: bool) -> Result<Option<PluginDescriptor>> {
        self.context.ensure_active()?;
        let Some(name) = self.lookup(identifier).await? else {
            log::warn!("Plugin {} not registered", identifier.trim());
            return Ok(None);
        };

        let (snapshot, changed) = {
            let mut registry = self.registry.lock().await;
            let Some(entry) = registry.get_mut(&name) else {
                return Ok(None);
            };
            let changed = entry.descriptor.enabled != enabled;
            entry.descriptor.enabled = enabled;
            (entry.snapshot(), changed)
        };
        let descriptor = snapshot.with_counters();
        if !changed {
            return Ok(Some(descriptor));
        }

        if let Err(e) = self.persist().await {
            if let Some(entry) = self.registry.lock().await.get_mut(&name) {
                entry.descriptor.enabled = !enabled;
            }
            return Err(e);
        }
        log::info!("{} plugin {}", if enabled { "Enabled" } else { "Disabled" }, name);
        Ok(Some(descriptor))
    }

    /// Refresh a registered plugin's metadata from its manifest.
    ///
    /// `None` if the plugin is unknown or its manifest is malformed; the
    /// placeholders then stay in place.
    pub async fn parse(&self, name: &str) -> Result<Option<PluginDescriptor>> {
        self.context.ensure_active()?;
        let Some(mut descriptor) = self.get(name).await else {
            return Ok(None);
        };
        let Some(manifest) = manifest::parse(&mut descriptor).await? else {
            return Ok(None);
        };

        let snapshot = {
            let mut registry = self.registry.lock().await;
            let Some(entry) = registry.get_mut(name) else {
                return Ok(None);
            };
            manifest.apply_to(&mut entry.descriptor);
            entry.snapshot()
        };
        log::debug!("Parsed plugin {} version {}", name, manifest.version);
        Ok(Some(snapshot.with_counters()))
    }

    /// Name of the registered plugin `identifier` refers to, by name, then by manifest path
    async fn lookup(&self, identifier: &str) -> Result<Option<String>> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Ok(None);
        }
        if self.registry.lock().await.contains(identifier) {
            return Ok(Some(identifier.to_string()));
        }
        let Some(path) = self.resolver.resolve(identifier).await? else {
            return Ok(None);
        };
        Ok(self
            .registry
            .lock()
            .await
            .find_by_path(&path)
            .map(str::to_string))
    }

    // --- Lifecycle transitions ---

    /// Load the plugin's platform, then optionally start and configure it.
    ///
    /// The returned outcome is that of the last transition attempted.
    /// Failures of the plugin itself are recorded in its `error` field; only a
    /// host storage failure while snapshotting its config is an `Err`.
    pub async fn load(&self, name: &str, mode: LoadMode, reason: &str) -> Result<TransitionOutcome> {
        self.context.ensure_active()?;
        let (descriptor, token) = match self.acquire(name, Operation::Load).await {
            Acquired::Ready { descriptor, token, .. } => (descriptor, token),
            Acquired::Refused(refusal) => return Ok(refusal.into_outcome()),
        };
        log::info!("Loading plugin {} type {}", name, descriptor.plugin_type);

        let loaded = match self.prepare_platform(&descriptor).await {
            Ok(loaded) => loaded,
            Err(e) => {
                let failure = TransitionError::new(Operation::Load, e.to_string());
                self.finish(name, token, |entry| {
                    entry.descriptor.error = Some(failure);
                    false
                })
                .await;
                return Err(e);
            }
        };

        let outcome = match loaded {
            Ok(loaded) => {
                let platform_type = loaded.platform.platform_type();
                log::info!(
                    "Loaded plugin {} type {} (entrypoint {})",
                    name,
                    platform_type,
                    loaded.manifest.entry_point
                );
                self.finish(name, token, move |entry| {
                    loaded.manifest.apply_to(&mut entry.descriptor);
                    entry.descriptor.plugin_type = platform_type;
                    entry.descriptor.config = Some(loaded.config);
                    entry.descriptor.schema = Some(loaded.schema);
                    entry.descriptor.loaded = Some(true);
                    entry.descriptor.error = None;
                    entry.platform = Some(loaded.platform);
                    true
                })
                .await
            }
            Err(failure) => {
                log::error!("Failed to load plugin {}: {}", name, failure.message);
                self.finish(name, token, move |entry| {
                    entry.descriptor.error = Some(failure);
                    false
                })
                .await
            }
        };

        if outcome.is_completed() && mode.starts() {
            return self.start(name, reason, mode.configures()).await;
        }
        Ok(outcome)
    }

    /// Start a loaded plugin, optionally configuring it afterwards.
    pub async fn start(&self, name: &str, reason: &str, configure_after: bool) -> Result<TransitionOutcome> {
        self.context.ensure_active()?;
        let (platform, token) = match self.acquire(name, Operation::Start).await {
            Acquired::Ready { platform, token, .. } => (platform, token),
            Acquired::Refused(refusal) => return Ok(refusal.into_outcome()),
        };
        log::info!("Starting plugin {}: {}", name, reason);

        let result = match &platform {
            Some(platform) => self.bounded(name, Operation::Start, platform.on_start(reason)).await,
            None => Err(missing_platform(name, Operation::Start)),
        };
        let outcome = self
            .finish(name, token, |entry| match result {
                Ok(()) => {
                    log::info!("Started plugin {}", name);
                    entry.descriptor.started = Some(true);
                    entry.descriptor.error = None;
                    true
                }
                Err(failure) => {
                    log::error!("Failed to start plugin {}: {}", name, failure.message);
                    entry.descriptor.error = Some(failure);
                    false
                }
            })
            .await;

        if outcome.is_completed() && configure_after {
            return self.configure(name).await;
        }
        Ok(outcome)
    }

    /// Configure a started plugin.
    pub async fn configure(&self, name: &str) -> Result<TransitionOutcome> {
        self.context.ensure_active()?;
        let (platform, token) = match self.acquire(name, Operation::Configure).await {
            Acquired::Ready { platform, token, .. } => (platform, token),
            Acquired::Refused(refusal) => return Ok(refusal.into_outcome()),
        };
        log::info!("Configuring plugin {}", name);

        let result = match &platform {
            Some(platform) => self.bounded(name, Operation::Configure, platform.on_configure()).await,
            None => Err(missing_platform(name, Operation::Configure)),
        };
        Ok(self
            .finish(name, token, |entry| match result {
                Ok(()) => {
                    log::info!("Configured plugin {}", name);
                    entry.descriptor.configured = Some(true);
                    entry.descriptor.error = None;
                    true
                }
                Err(failure) => {
                    log::error!("Failed to configure plugin {}: {}", name, failure.message);
                    entry.descriptor.error = Some(failure);
                    false
                }
            })
            .await)
    }

    /// Shut a loaded plugin down and release its platform instance.
    ///
    /// Runtime state is cleared even when the callback fails or times out; the
    /// outcome is then `Failed` and `error` records the shutdown failure.
    /// Accepted after the host context was torn down, so resources can still
    /// be released.
    pub async fn shutdown(&self, name: &str, reason: &str, remove_devices: bool) -> Result<TransitionOutcome> {
        let (platform, token) = match self.acquire(name, Operation::Shutdown).await {
            Acquired::Ready { platform, token, .. } => (platform, token),
            Acquired::Refused(refusal) => return Ok(refusal.into_outcome()),
        };
        log::info!("Shutting down plugin {}: {}", name, reason);

        let result = match &platform {
            Some(platform) => {
                self.bounded(name, Operation::Shutdown, platform.on_shutdown(reason, remove_devices))
                    .await
            }
            None => Ok(()),
        };
        drop(platform);

        Ok(self
            .finish(name, token, |entry| {
                entry.platform = None;
                entry.descriptor.reset_runtime_state();
                match result {
                    Ok(()) => {
                        log::info!("Shutdown of plugin {} completed", name);
                        true
                    }
                    Err(failure) => {
                        log::error!(
                            "Shutdown of plugin {} failed, state cleared: {}",
                            name,
                            failure.message
                        );
                        entry.descriptor.error = Some(failure);
                        false
                    }
                }
            })
            .await)
    }

    /// Take the transition lock if the plugin exists, is idle and is in the
    /// right state. A shutdown takes the platform instance out of the entry.
    async fn acquire(&self, name: &str, operation: Operation) -> Acquired {
        let mut registry = self.registry.lock().await;
        let Some(entry) = registry.get_mut(name) else {
            log::warn!("Cannot {} plugin {}: not registered", operation, name);
            return Acquired::Refused(Refusal::NotFound);
        };
        if let Some(held) = entry.descriptor.locked {
            log::warn!(
                "Cannot {} plugin {}: {} in progress for {:?}",
                operation,
                name,
                held.operation,
                held.held_for()
            );
            return Acquired::Refused(Refusal::Busy(entry.snapshot()));
        }
        if let Some(reason) = entry.descriptor.check_transition(operation) {
            log_skip(name, operation, reason);
            return Acquired::Refused(Refusal::Skipped(entry.snapshot(), reason));
        }

        let token = LockToken::new(operation);
        entry.descriptor.locked = Some(token);
        let platform = match operation {
            Operation::Shutdown => entry.platform.take(),
            _ => entry.platform.clone(),
        };
        Acquired::Ready {
            descriptor: entry.descriptor.clone(),
            platform,
            token,
        }
    }

    /// Apply a transition's result and release the lock taken with `token`.
    ///
    /// If the entry was removed or replaced in the meantime the result is
    /// dropped and `NotFound` returned.
    async fn finish<F>(&self, name: &str, token: LockToken, apply: F) -> TransitionOutcome
    where
        F: FnOnce(&mut PluginEntry) -> bool,
    {
        let (succeeded, snapshot) = {
            let mut registry = self.registry.lock().await;
            let Some(entry) = registry.get_mut(name).filter(|e| e.descriptor.locked == Some(token)) else {
                log::warn!(
                    "Plugin {} left the registry while its {} was in flight",
                    name,
                    token.operation
                );
                return TransitionOutcome::NotFound;
            };
            let succeeded = apply(entry);
            entry.descriptor.locked = None;
            (succeeded, entry.snapshot())
        };

        let descriptor = snapshot.with_counters();
        if succeeded {
            TransitionOutcome::Completed(descriptor)
        } else {
            TransitionOutcome::Failed(descriptor)
        }
    }

    /// Run a platform callback within the transition timeout
    async fn bounded<F>(&self, name: &str, operation: Operation, callback: F) -> std::result::Result<(), TransitionError>
    where
        F: Future<Output = std::result::Result<(), PluginError>>,
    {
        let timeout = self.context.transition_timeout();
        match tokio::time::timeout(timeout, callback).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TransitionError::new(
                operation,
                PluginSystemError::CallbackError {
                    plugin_id: name.to_string(),
                    operation: operation.to_string(),
                    message: e.to_string(),
                }
                .to_string(),
            )),
            Err(_) => Err(TransitionError::new(
                operation,
                PluginSystemError::Timeout {
                    plugin_id: name.to_string(),
                    operation: operation.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                }
                .to_string(),
            )),
        }
    }

    /// Everything `load` does between taking and releasing the lock.
    ///
    /// The outer `Err` is a host storage failure, the inner one a failure of the plugin.
    async fn prepare_platform(
        &self,
        descriptor: &PluginDescriptor,
    ) -> Result<std::result::Result<LoadedPlatform, TransitionError>> {
        let name = descriptor.name.as_str();
        let fail = |message: String| -> Result<std::result::Result<LoadedPlatform, TransitionError>> {
            Ok(Err(TransitionError::new(Operation::Load, message)))
        };
        // The name becomes part of the config file path
        if !is_valid_package_name(name) {
            return fail(format!("Invalid plugin name {:?}", name));
        }

        let manifest = match manifest::read_manifest(&descriptor.path).await {
            Ok(Some(manifest)) => manifest,
            Ok(None) => return fail(format!("Manifest {} is malformed", descriptor.path.display())),
            Err(e) => return fail(e.to_string()),
        };
        if manifest.name != name {
            return fail(
                PluginSystemError::ManifestNameMismatch {
                    expected: name.to_string(),
                    found: manifest.name,
                    path: descriptor.path.clone(),
                }
                .to_string(),
            );
        }

        let declared_type = manifest.platform_type.unwrap_or(PlatformType::Unknown);
        let mut config = self.configs.load_or_create(name, declared_type)?;
        let schema = self.configs.load_schema(&manifest)?;

        let context = PlatformContext {
            name: name.to_string(),
            manifest_path: manifest.manifest_path.clone(),
            config: config.clone(),
        };
        let timeout = self.context.transition_timeout();
        let platform = match tokio::time::timeout(timeout, self.loader.instantiate(&manifest, context)).await {
            Ok(Ok(platform)) => platform,
            Ok(Err(e)) => return fail(e.to_string()),
            Err(_) => {
                return fail(
                    PluginSystemError::Timeout {
                        plugin_id: name.to_string(),
                        operation: Operation::Load.to_string(),
                        timeout_ms: timeout.as_millis() as u64,
                    }
                    .to_string(),
                );
            }
        };

        let platform_type = platform.platform_type();
        if config.get::<PlatformType>("type") != Some(platform_type) {
            let updated = config
                .set("type", platform_type)
                .and_then(|_| self.configs.save(name, &config));
            if let Err(e) = updated {
                log::warn!("Could not record type {} in config of plugin {}: {}", platform_type, name, e);
            }
        }

        Ok(Ok(LoadedPlatform { manifest, platform, config, schema }))
    }

    // --- Persistence ---

    async fn persist(&self) -> Result<()> {
        if self.context.persist_on_change() {
            self.save_to_storage().await?;
        }
        Ok(())
    }

    /// Write the stable fields of every descriptor, returning how many were written.
    pub async fn save_to_storage(&self) -> Result<usize> {
        self.context.ensure_active()?;
        let _guard = self.save_lock.lock().await;
        let records = self.registry.lock().await.to_stored();
        let count = self.store.save(&records)?;
        log::debug!("Saved {} plugin(s) to {}", count, self.store.path().display());
        Ok(count)
    }

    /// Replace the in-memory registry with the persisted one.
    pub async fn load_from_storage(&self) -> Result<Vec<PluginDescriptor>> {
        self.context.ensure_active()?;
        let stored = self.store.load()?;
        let fresh = PluginRegistry::from_stored(stored);
        let descriptors: Vec<PluginDescriptor> = fresh
            .snapshots()
            .into_iter()
            .map(EntrySnapshot::with_counters)
            .collect();

        let mut previous = {
            let mut registry = self.registry.lock().await;
            std::mem::replace(&mut *registry, fresh)
        };
        warn_dropped(&mut previous, "reloading from storage");
        log::info!("Loaded {} plugin(s) from storage", descriptors.len());
        Ok(descriptors)
    }

    /// Empty the in-memory registry. Persisted state changes on the next save.
    pub async fn clear(&self) {
        let mut previous = {
            let mut registry = self.registry.lock().await;
            std::mem::take(&mut *registry)
        };
        warn_dropped(&mut previous, "clearing the registry");
    }

    // --- Batch operations and supervision ---

    /// Bring every enabled plugin to configured, concurrently.
    pub async fn start_all(&self, reason: &str) -> Vec<BatchOutcome> {
        let names: Vec<String> = {
            let registry = self.registry.lock().await;
            registry
                .iter()
                .filter(|entry| entry.descriptor.enabled)
                .map(|entry| entry.descriptor.name.clone())
                .collect()
        };
        join_all(names.into_iter().map(|name| async move {
            let outcome = self.bring_up(&name, reason).await;
            (name, outcome)
        }))
        .await
    }

    /// Continue from whatever state the plugin is in towards configured
    async fn bring_up(&self, name: &str, reason: &str) -> Result<TransitionOutcome> {
        let Some(descriptor) = self.get(name).await else {
            return Ok(TransitionOutcome::NotFound);
        };
        if !descriptor.is_loaded() {
            self.load(name, LoadMode::StartAndConfigure, reason).await
        } else if !descriptor.is_started() {
            self.start(name, reason, true).await
        } else {
            self.configure(name).await
        }
    }

    /// Shut down every loaded plugin, concurrently.
    pub async fn shutdown_all(&self, reason: &str, remove_devices: bool) -> Vec<BatchOutcome> {
        let names: Vec<String> = {
            let registry = self.registry.lock().await;
            registry
                .iter()
                .filter(|entry| entry.descriptor.is_loaded())
                .map(|entry| entry.descriptor.name.clone())
                .collect()
        };
        join_all(names.into_iter().map(|name| async move {
            let outcome = self.shutdown(&name, reason, remove_devices).await;
            (name, outcome)
        }))
        .await
    }

    /// Plugins whose transition lock has been held longer than `threshold`
    pub async fn stuck_transitions(&self, threshold: Duration) -> Vec<PluginDescriptor> {
        let stuck: Vec<EntrySnapshot> = {
            let registry = self.registry.lock().await;
            registry
                .iter()
                .filter(|entry| {
                    entry
                        .descriptor
                        .locked
                        .is_some_and(|token| token.held_for() > threshold)
                })
                .map(PluginEntry::snapshot)
                .collect()
        };
        stuck.into_iter().map(EntrySnapshot::with_counters).collect()
    }

    /// Shut everything down, save, and tear the host context down.
    pub async fn teardown(&self) -> Result<()> {
        let outcomes = self.shutdown_all("The host is shutting down", false).await;
        log_batch_failures(&outcomes, "shutdown");
        if !self.context.is_torn_down() {
            self.save_to_storage().await?;
        }
        self.context.teardown();
        Ok(())
    }

    /// Manifest path of a registered plugin
    pub async fn manifest_path(&self, name: &str) -> Option<PathBuf> {
        self.registry
            .lock()
            .await
            .get(name)
            .map(|entry| entry.descriptor.path.clone())
    }
}

fn missing_platform(name: &str, operation: Operation) -> TransitionError {
    TransitionError::new(
        operation,
        PluginSystemError::InternalError(format!("plugin {} is loaded without a platform instance", name))
            .to_string(),
    )
}

fn log_skip(name: &str, operation: Operation, reason: SkipReason) {
    match reason {
        SkipReason::Disabled => log::warn!("Cannot {} plugin {}: {}", operation, name, reason),
        _ => log::debug!("Skipping {} of plugin {}: {}", operation, name, reason),
    }
}

fn warn_dropped(previous: &mut PluginRegistry, action: &str) {
    for entry in previous.drain() {
        if entry.platform.is_some() || entry.descriptor.is_locked() {
            log::warn!(
                "Dropping plugin {} without shutdown while {}",
                entry.descriptor.name,
                action
            );
        }
    }
}

fn log_batch_failures(outcomes: &[BatchOutcome], operation: &str) {
    for (name, outcome) in outcomes {
        match outcome {
            Ok(TransitionOutcome::Failed(descriptor)) => log::warn!(
                "Plugin {} failed during {}: {}",
                name,
                operation,
                descriptor
                    .error
                    .as_ref()
                    .map(|e| e.message.as_str())
                    .unwrap_or("unknown error")
            ),
            Ok(TransitionOutcome::Busy(_)) => log::warn!("Plugin {} was busy during {}", name, operation),
            Err(e) => log::error!("Plugin {} hit a host error during {}: {}", name, operation, e),
            _ => {}
        }
    }
}

impl Debug for PluginManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginManager")
            .field("name", &self.name)
            .field("context", &self.context)
            .field("loader", &self.loader)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl KernelComponent for PluginManager {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn initialize(&self) -> Result<()> {
        self.load_from_storage()
            .await
            .map(|_| ())
            .map_err(|e| Error::KernelLifecycleError {
                phase: KernelLifecyclePhase::Initialize,
                component_name: Some(self.name.to_string()),
                message: "Failed to restore the plugin registry".to_string(),
                source: Some(Box::new(e)),
            })
    }

    async fn start(&self) -> Result<()> {
        let outcomes = self.start_all("The host is starting").await;
        log_batch_failures(&outcomes, "start");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let outcomes = self.shutdown_all("The host is stopping", false).await;
        log_batch_failures(&outcomes, "shutdown");
        self.save_to_storage()
            .await
            .map(|_| ())
            .map_err(|e| Error::KernelLifecycleError {
                phase: KernelLifecyclePhase::Shutdown,
                component_name: Some(self.name.to_string()),
                message: "Failed to save the plugin registry".to_string(),
                source: Some(Box::new(e)),
            })
    }
}
