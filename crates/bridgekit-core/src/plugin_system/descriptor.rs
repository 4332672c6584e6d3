use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::kernel::constants;
use crate::plugin_system::traits::PlatformType;
use crate::storage::{ConfigData, StoredPlugin};

/// A lifecycle transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Load,
    Start,
    Configure,
    Shutdown,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Load => "load",
            Operation::Start => "start",
            Operation::Configure => "configure",
            Operation::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// Marks a plugin as having a transition in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockToken {
    pub operation: Operation,
    pub acquired_at: Instant,
}

impl LockToken {
    pub fn new(operation: Operation) -> Self {
        Self { operation, acquired_at: Instant::now() }
    }

    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

/// Why the last transition of a plugin failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub operation: Operation,
    pub message: String,
}

impl TransitionError {
    pub fn new(operation: Operation, message: impl Into<String>) -> Self {
        Self { operation, message: message.into() }
    }
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.operation, self.message)
    }
}

/// A transition that was refused because the plugin is not in the required state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    AlreadyLoaded,
    NotLoaded,
    AlreadyStarted,
    NotStarted,
    AlreadyConfigured,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::Disabled => "plugin is disabled",
            SkipReason::AlreadyLoaded => "plugin is already loaded",
            SkipReason::NotLoaded => "plugin is not loaded",
            SkipReason::AlreadyStarted => "plugin is already started",
            SkipReason::NotStarted => "plugin is not started",
            SkipReason::AlreadyConfigured => "plugin is already configured",
        };
        f.write_str(text)
    }
}

/// What happened to a load/start/configure/shutdown request.
///
/// Every variant except `NotFound` carries a snapshot of the descriptor taken
/// when the request finished.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// The transition ran and succeeded
    Completed(PluginDescriptor),
    /// The platform callback failed or timed out; `error` is set
    Failed(PluginDescriptor),
    /// The plugin was not in a state that allows the transition
    Skipped { descriptor: PluginDescriptor, reason: SkipReason },
    /// Another transition holds the plugin's lock
    Busy(PluginDescriptor),
    /// No plugin registered under that name
    NotFound,
}

impl TransitionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TransitionOutcome::Completed(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TransitionOutcome::Failed(_))
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, TransitionOutcome::Busy(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, TransitionOutcome::NotFound)
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            TransitionOutcome::Skipped { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    pub fn descriptor(&self) -> Option<&PluginDescriptor> {
        match self {
            TransitionOutcome::Completed(d)
            | TransitionOutcome::Failed(d)
            | TransitionOutcome::Busy(d)
            | TransitionOutcome::Skipped { descriptor: d, .. } => Some(d),
            TransitionOutcome::NotFound => None,
        }
    }

    pub fn into_descriptor(self) -> Option<PluginDescriptor> {
        match self {
            TransitionOutcome::Completed(d)
            | TransitionOutcome::Failed(d)
            | TransitionOutcome::Busy(d)
            | TransitionOutcome::Skipped { descriptor: d, .. } => Some(d),
            TransitionOutcome::NotFound => None,
        }
    }
}

/// How far `load` should take a plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadMode {
    #[default]
    LoadOnly,
    Start,
    StartAndConfigure,
}

impl LoadMode {
    pub fn starts(&self) -> bool {
        !matches!(self, LoadMode::LoadOnly)
    }

    pub fn configures(&self) -> bool {
        matches!(self, LoadMode::StartAndConfigure)
    }
}

/// Host-side record of one plugin: identity, metadata and lifecycle state.
///
/// `loaded`, `started` and `configured` are `Some(true)` once the matching
/// transition succeeded and `None` otherwise; they are cleared together.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginDescriptor {
    pub name: String,
    pub path: PathBuf,
    pub plugin_type: PlatformType,
    pub version: String,
    pub description: String,
    pub author: String,
    pub enabled: bool,
    pub locked: Option<LockToken>,
    pub loaded: Option<bool>,
    pub started: Option<bool>,
    pub configured: Option<bool>,
    pub error: Option<TransitionError>,
    pub registered_devices: Option<usize>,
    pub added_devices: Option<usize>,
    pub config: Option<ConfigData>,
    pub schema: Option<Value>,
}

impl PluginDescriptor {
    /// A freshly added, enabled descriptor with placeholder metadata
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            plugin_type: PlatformType::Unknown,
            version: constants::PLACEHOLDER_VERSION.to_string(),
            description: constants::PLACEHOLDER_TEXT.to_string(),
            author: constants::PLACEHOLDER_TEXT.to_string(),
            enabled: true,
            locked: None,
            loaded: None,
            started: None,
            configured: None,
            error: None,
            registered_devices: None,
            added_devices: None,
            config: None,
            schema: None,
        }
    }

    pub fn from_stored(stored: StoredPlugin) -> Self {
        let mut descriptor = Self::new(stored.name, stored.path);
        descriptor.plugin_type = stored.plugin_type;
        descriptor.version = stored.version;
        descriptor.description = stored.description;
        descriptor.author = stored.author;
        descriptor.enabled = stored.enabled;
        descriptor
    }

    pub fn to_stored(&self) -> StoredPlugin {
        StoredPlugin {
            name: self.name.clone(),
            path: self.path.clone(),
            plugin_type: self.plugin_type,
            version: self.version.clone(),
            description: self.description.clone(),
            author: self.author.clone(),
            enabled: self.enabled,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked.is_some()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded == Some(true)
    }

    pub fn is_started(&self) -> bool {
        self.started == Some(true)
    }

    pub fn is_configured(&self) -> bool {
        self.configured == Some(true)
    }

    /// The reason `operation` may not run in the current state, if any.
    /// Does not look at the lock.
    pub fn check_transition(&self, operation: Operation) -> Option<SkipReason> {
        match operation {
            Operation::Load if !self.enabled => Some(SkipReason::Disabled),
            Operation::Load if self.is_loaded() => Some(SkipReason::AlreadyLoaded),
            Operation::Load => None,
            Operation::Start if !self.is_loaded() => Some(SkipReason::NotLoaded),
            Operation::Start if self.is_started() => Some(SkipReason::AlreadyStarted),
            Operation::Start => None,
            Operation::Configure if !self.is_loaded() => Some(SkipReason::NotLoaded),
            Operation::Configure if !self.is_started() => Some(SkipReason::NotStarted),
            Operation::Configure if self.is_configured() => Some(SkipReason::AlreadyConfigured),
            Operation::Configure => None,
            Operation::Shutdown if !self.is_loaded() => Some(SkipReason::NotLoaded),
            Operation::Shutdown => None,
        }
    }

    /// Back to "registered, not loaded": drops every runtime field.
    pub fn reset_runtime_state(&mut self) {
        self.plugin_type = PlatformType::Unknown;
        self.locked = None;
        self.loaded = None;
        self.started = None;
        self.configured = None;
        self.error = None;
        self.registered_devices = None;
        self.added_devices = None;
        self.config = None;
        self.schema = None;
    }
}
