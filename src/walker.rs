use std::path::{Path, PathBuf};

use crate::error::Result;

/// A discovered documentation page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPage {
    /// Path relative to the corpus root, `/`-separated. This is the entry's
    /// `page` value.
    pub page: String,
    /// Fully resolved absolute path.
    pub absolute_path: PathBuf,
}

/// Supported file extensions for page discovery.
const SUPPORTED_EXTENSIONS: &[&str] = &["htm", "html"];

/// Recursively walk a corpus root and discover HTML pages.
///
/// Skips hidden files/directories (names starting with `.`). Results are
/// sorted by page path so builds see pages in a stable order.
pub fn discover_pages(root: &Path) -> Result<Vec<DiscoveredPage>> {
    let canonical_root = root.canonicalize()?;
    let mut results = Vec::new();
    walk_dir(&canonical_root, &canonical_root, &mut results)?;
    results.sort_by(|a, b| a.page.cmp(&b.page));
    Ok(results)
}

fn walk_dir(
    root: &Path,
    current: &Path,
    results: &mut Vec<DiscoveredPage>,
) -> Result<()> {
    for entry in std::fs::read_dir(current)? {
        let entry = entry?;
        let file_name = entry.file_name();
        if file_name.to_string_lossy().starts_with('.') {
            continue;
        }

        let file_type = entry.file_type()?;
        let path = entry.path();

        if file_type.is_dir() {
            walk_dir(root, &path, results)?;
        } else if file_type.is_symlink() {
            // Only follow symlinks to files; directories could cycle.
            let Ok(resolved) = path.canonicalize() else {
                continue;
            };
            if resolved.is_file() && is_supported(&resolved) {
                results.push(make_discovered(root, &path, resolved));
            }
        } else if file_type.is_file() && is_supported(&path) {
            let abs = path.canonicalize()?;
            results.push(make_discovered(root, &path, abs));
        }
    }

    Ok(())
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|s| s.eq_ignore_ascii_case(ext))
        })
}

fn make_discovered(
    root: &Path,
    original_path: &Path,
    absolute_path: PathBuf,
) -> DiscoveredPage {
    let relative = original_path.strip_prefix(root).unwrap_or(original_path);
    let page = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");

    DiscoveredPage {
        page,
        absolute_path,
    }
}
