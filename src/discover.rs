use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Error;

pub const CONFIG_FILE_NAME: &str = "wp-config.php";

/// Path of an existing config file: `explicit` when given, otherwise the
/// nearest `wp-config.php` at or above `start`.
pub fn resolve_existing(explicit: Option<&Path>, start: &Path) -> Result<PathBuf, Error> {
    match explicit {
        Some(path) if path.is_file() => Ok(path.to_path_buf()),
        Some(path) => Err(Error::ConfigNotFound {
            path: path.to_path_buf(),
        }),
        None => find_upward(start).ok_or_else(|| Error::ConfigNotFound {
            path: start.join(CONFIG_FILE_NAME),
        }),
    }
}

pub fn find_upward(start: &Path) -> Option<PathBuf> {
    start.ancestors().find_map(|dir| {
        let candidate = dir.join(CONFIG_FILE_NAME);
        debug!(candidate = %candidate.display(), "looking for config file");
        candidate.is_file().then_some(candidate)
    })
}

/// Where `create` writes: `explicit`, or `wp-config.php` in `cwd`.
pub fn creation_target(explicit: Option<&Path>, cwd: &Path) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| cwd.join(CONFIG_FILE_NAME))
}
