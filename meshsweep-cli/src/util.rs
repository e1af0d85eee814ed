use std::path::{Path, PathBuf};

use meshsweep::CONFIG_FILE_NAME;

/// Walks up the directory tree looking for a sweep config file.
pub(crate) fn find_config_file(path: PathBuf, recursion_levels: usize) -> Option<PathBuf> {
    let mut recursion_levels = recursion_levels;
    let mut path = path;
    loop {
        let candidate = path.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        if recursion_levels == 0 {
            return None;
        }
        recursion_levels -= 1;
        match path.parent() {
            Some(parent_path) => path = parent_path.to_path_buf(),
            None => return None,
        }
    }
}

/// Resolves `p` against `base` unless it's already absolute.
pub(crate) fn resolve_path(base: &Path, p: &str) -> PathBuf {
    let p = PathBuf::from(p);
    if p.is_relative() {
        base.join(p)
    } else {
        p
    }
}
