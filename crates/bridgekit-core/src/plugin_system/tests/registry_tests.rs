#![cfg(test)]

use std::path::Path;

use crate::plugin_system::descriptor::PluginDescriptor;
use crate::plugin_system::registry::PluginRegistry;

fn descriptor(name: &str) -> PluginDescriptor {
    PluginDescriptor::new(name, format!("/plugins/{}/manifest.json", name))
}

fn registry_with(names: &[&str]) -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    for name in names {
        assert!(registry.insert(descriptor(name)));
    }
    registry
}

#[test]
fn test_insertion_order_is_kept() {
    let registry = registry_with(&["zeta", "alpha", "mid"]);
    assert_eq!(registry.names(), vec!["zeta", "alpha", "mid"]);
    assert_eq!(registry.len(), 3);
}

#[test]
fn test_duplicate_insert_is_refused() {
    let mut registry = registry_with(&["alpha"]);
    let mut other = descriptor("alpha");
    other.enabled = false;

    assert!(!registry.insert(other));
    assert!(registry.get("alpha").expect("registered").descriptor.enabled);
}

#[test]
fn test_remove_keeps_remaining_order_and_restore_reinserts_in_place() {
    let mut registry = registry_with(&["a", "b", "c", "d"]);

    let (index, entry) = registry.remove("b").expect("b registered");
    assert_eq!(index, 1);
    assert_eq!(registry.names(), vec!["a", "c", "d"]);
    assert!(registry.remove("b").is_none());

    registry.restore(index, entry);
    assert_eq!(registry.names(), vec!["a", "b", "c", "d"]);
}

#[test]
fn test_find_by_path() {
    let registry = registry_with(&["a", "b"]);
    assert_eq!(registry.find_by_path(Path::new("/plugins/b/manifest.json")), Some("b"));
    assert_eq!(registry.find_by_path(Path::new("/plugins/x/manifest.json")), None);
}

#[test]
fn test_from_stored_drops_duplicate_names() {
    let stored = vec![
        descriptor("a").to_stored(),
        descriptor("b").to_stored(),
        {
            let mut dup = descriptor("a");
            dup.enabled = false;
            dup.to_stored()
        },
    ];
    let registry = PluginRegistry::from_stored(stored);
    assert_eq!(registry.names(), vec!["a", "b"]);
    assert!(registry.get("a").expect("a").descriptor.enabled);
}

#[test]
fn test_drain_empties_registry() {
    let mut registry = registry_with(&["a", "b"]);
    let drained = registry.drain();
    assert_eq!(drained.len(), 2);
    assert!(registry.is_empty());
    assert_eq!(registry.to_stored().len(), 0);
}
