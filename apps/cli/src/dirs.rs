use tokenboard_app::{AppConfig, AppPaths};

#[derive(Debug, Clone)]
pub struct DataDirResolution {
    pub paths: AppPaths,
    pub matched_existing: bool,
}

/// Data directory follows the configured database location.
pub fn resolve_data_dir(config: &AppConfig) -> DataDirResolution {
    let paths = AppPaths::for_db(config.db_path.clone());
    let matched_existing = paths.db_path.exists();
    DataDirResolution {
        paths,
        matched_existing,
    }
}
