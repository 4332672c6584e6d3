use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tokio::fs;

use crate::kernel::constants;
use crate::kernel::context::HostContext;
use crate::kernel::error::{Error, Result};

/// Finds plugin manifests without loading any plugin code.
///
/// Identifiers come in three shapes:
/// - empty: the host's own manifest, if one is configured
/// - path-like (absolute, starting with `.`, or containing a separator):
///   a manifest file or a directory holding `manifest.json`
/// - a package name such as `eve-door` or `@scope/eve-door`, looked up as
///   `<dir>/<name>/manifest.json` over the host's search path
#[derive(Debug, Clone)]
pub struct Resolver {
    context: Arc<HostContext>,
}

impl Resolver {
    pub fn new(context: Arc<HostContext>) -> Self {
        Self { context }
    }

    /// Absolute path of the manifest `identifier` names, or `None`.
    ///
    /// Only I/O failures other than "not found" are errors.
    pub async fn resolve(&self, identifier: &str) -> Result<Option<PathBuf>> {
        let identifier = identifier.trim();

        if identifier.is_empty() {
            let Some(host_manifest) = self.context.host_manifest() else {
                log::debug!("No host manifest configured");
                return Ok(None);
            };
            return manifest_at(&host_manifest).await;
        }

        if is_path_like(identifier) {
            let path = self.context.working_dir().join(identifier);
            let resolved = manifest_at(&path).await?;
            log::debug!("Resolved path {} to {:?}", identifier, resolved);
            return Ok(resolved);
        }

        if !is_valid_package_name(identifier) {
            log::debug!("'{}' is not a valid package name", identifier);
            return Ok(None);
        }

        for dir in self.context.search_paths() {
            let candidate = dir.join(identifier).join(constants::MANIFEST_FILE_NAME);
            if let Some(found) = manifest_at(&candidate).await? {
                log::debug!("Resolved package {} to {}", identifier, found.display());
                return Ok(Some(found));
            }
        }
        log::debug!("Package {} not found in module search path", identifier);
        Ok(None)
    }
}

fn is_path_like(identifier: &str) -> bool {
    let has_separator = identifier.contains('/') || identifier.contains(std::path::MAIN_SEPARATOR);
    Path::new(identifier).is_absolute()
        || identifier.starts_with('.')
        || (has_separator && !identifier.starts_with('@'))
}

/// Package naming rules: lowercase ASCII letters, digits, `-`, `_`, `.`,
/// an optional `@scope/` prefix, no leading `.` or `_`.
pub fn is_valid_package_name(name: &str) -> bool {
    if name.is_empty() || name.len() > constants::MAX_PACKAGE_NAME_LEN {
        return false;
    }
    let bare = match name.strip_prefix('@') {
        Some(scoped) => match scoped.split_once('/') {
            Some((scope, bare)) if is_valid_segment(scope) => bare,
            _ => return false,
        },
        None => name,
    };
    is_valid_segment(bare)
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && !segment.starts_with('.')
        && !segment.starts_with('_')
        && segment
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.'))
}

fn is_missing(error: &std::io::Error) -> bool {
    matches!(error.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory)
}

/// `path` itself if it is a file, `path/manifest.json` if it is a directory holding one
async fn manifest_at(path: &Path) -> Result<Option<PathBuf>> {
    let metadata = match fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if is_missing(&e) => return Ok(None),
        Err(e) => return Err(Error::io(e, "resolve_manifest", path.to_path_buf())),
    };
    if metadata.is_file() {
        return Ok(Some(normalize(path)));
    }

    let manifest = path.join(constants::MANIFEST_FILE_NAME);
    match fs::metadata(&manifest).await {
        Ok(metadata) if metadata.is_file() => Ok(Some(normalize(&manifest))),
        Ok(_) => Ok(None),
        Err(e) if is_missing(&e) => Ok(None),
        Err(e) => Err(Error::io(e, "resolve_manifest", manifest)),
    }
}

/// Lexically drop `.` and `..` components
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
