use std::fmt;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::plugin_system::descriptor::PluginDescriptor;
use crate::plugin_system::traits::Platform;
use crate::storage::StoredPlugin;

/// A registered plugin and, while it is loaded, its platform instance
pub struct PluginEntry {
    pub descriptor: PluginDescriptor,
    pub platform: Option<Arc<dyn Platform>>,
}

impl PluginEntry {
    pub fn new(descriptor: PluginDescriptor) -> Self {
        Self { descriptor, platform: None }
    }

    /// Copy of the descriptor along with the platform to read counters from
    pub fn snapshot(&self) -> EntrySnapshot {
        EntrySnapshot {
            descriptor: self.descriptor.clone(),
            platform: self.platform.clone(),
        }
    }
}

/// A descriptor copied under the registry lock.
///
/// Device counters are plugin code, so they are only read by
/// [`EntrySnapshot::with_counters`] once the lock has been released.
pub struct EntrySnapshot {
    descriptor: PluginDescriptor,
    platform: Option<Arc<dyn Platform>>,
}

impl EntrySnapshot {
    /// The descriptor with live device counters
    pub fn with_counters(self) -> PluginDescriptor {
        let mut descriptor = self.descriptor;
        match &self.platform {
            Some(platform) => {
                descriptor.registered_devices = Some(platform.registered_devices());
                descriptor.added_devices = Some(platform.added_devices());
            }
            None => {
                descriptor.registered_devices = None;
                descriptor.added_devices = None;
            }
        }
        descriptor
    }
}

impl fmt::Debug for PluginEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginEntry")
            .field("descriptor", &self.descriptor)
            .field("platform", &self.platform.as_ref().map(|p| p.platform_type()))
            .finish()
    }
}

/// Ordered registry of plugins, keyed by name, in insertion order
#[derive(Debug, Default)]
pub struct PluginRegistry {
    entries: IndexMap<String, PluginEntry>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from persisted records. Later duplicates of a name are dropped.
    pub fn from_stored(stored: Vec<StoredPlugin>) -> Self {
        let mut registry = Self::new();
        for record in stored {
            let descriptor = PluginDescriptor::from_stored(record);
            if registry.contains(&descriptor.name) {
                log::warn!("Ignoring duplicate registry record for plugin {}", descriptor.name);
                continue;
            }
            registry.insert(descriptor);
        }
        registry
    }

    /// Insert a new descriptor. Returns false if the name is taken.
    pub fn insert(&mut self, descriptor: PluginDescriptor) -> bool {
        if self.entries.contains_key(&descriptor.name) {
            return false;
        }
        self.entries
            .insert(descriptor.name.clone(), PluginEntry::new(descriptor));
        true
    }

    /// Remove an entry, keeping the order of the rest. Returns its former position.
    pub fn remove(&mut self, name: &str) -> Option<(usize, PluginEntry)> {
        self.entries
            .shift_remove_full(name)
            .map(|(index, _, entry)| (index, entry))
    }

    /// Put a removed entry back at `index`
    pub fn restore(&mut self, index: usize, entry: PluginEntry) {
        let index = index.min(self.entries.len());
        self.entries
            .shift_insert(index, entry.descriptor.name.clone(), entry);
    }

    pub fn get(&self, name: &str) -> Option<&PluginEntry> {
        self.entries.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut PluginEntry> {
        self.entries.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Name of the plugin whose manifest lives at `path`
    pub fn find_by_path(&self, path: &Path) -> Option<&str> {
        self.entries
            .values()
            .find(|entry| entry.descriptor.path == path)
            .map(|entry| entry.descriptor.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry, returning them in order
    pub fn drain(&mut self) -> Vec<PluginEntry> {
        self.entries.drain(..).map(|(_, entry)| entry).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PluginEntry> {
        self.entries.values()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn snapshots(&self) -> Vec<EntrySnapshot> {
        self.entries
            .values()
            .map(PluginEntry::snapshot)
            .collect()
    }

    pub fn to_stored(&self) -> Vec<StoredPlugin> {
        self.entries
            .values()
            .map(|entry| entry.descriptor.to_stored())
            .collect()
    }
}
