use std::path::PathBuf;

use crate::Result;
use crate::config::DB_FILE_NAME;

const APP_DIR_NAME: &str = "tokenboard";

#[derive(Clone, Debug)]
pub struct AppPaths {
    pub app_data_dir: PathBuf,
    pub db_path: PathBuf,
}

impl AppPaths {
    pub fn new(app_data_dir: PathBuf) -> Self {
        let db_path = app_data_dir.join(DB_FILE_NAME);
        Self {
            app_data_dir,
            db_path,
        }
    }

    /// Uses an explicit database location; its parent becomes the data dir.
    pub fn for_db(db_path: PathBuf) -> Self {
        let app_data_dir = db_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            app_data_dir,
            db_path,
        }
    }
}

/// `$XDG_DATA_HOME/tokenboard`, falling back to `~/.local/share/tokenboard`.
pub fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("XDG_DATA_HOME")
        && !dir.trim().is_empty()
    {
        return PathBuf::from(dir).join(APP_DIR_NAME);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR_NAME);
    }
    PathBuf::from(".").join(APP_DIR_NAME)
}

pub fn ensure_app_data_dir(paths: &AppPaths) -> Result<()> {
    std::fs::create_dir_all(&paths.app_data_dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_db_uses_parent_directory() {
        let paths = AppPaths::for_db(PathBuf::from("/var/lib/tokenboard/usage.sqlite"));
        assert_eq!(paths.app_data_dir, PathBuf::from("/var/lib/tokenboard"));

        let bare = AppPaths::for_db(PathBuf::from("usage.sqlite"));
        assert_eq!(bare.app_data_dir, PathBuf::from("."));
    }

    #[test]
    fn ensure_app_data_dir_creates_nested_dirs() {
        let dir = tempfile::tempdir().expect("temp dir");
        let paths = AppPaths::new(dir.path().join("a/b/c"));
        ensure_app_data_dir(&paths).expect("create");
        assert!(paths.app_data_dir.is_dir());
        assert!(paths.db_path.ends_with(DB_FILE_NAME));
    }
}
