use std::fs;
use std::path::{Path, PathBuf};

use tokenboard_app::AppConfig;

const CONFIG_DIR_NAME: &str = "tokenboard";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: AppConfig,
    pub file: PathBuf,
    pub created: bool,
}

/// Reads the config file, writing the defaults first if it does not exist.
/// Environment overrides are applied after the file and the result is
/// validated.
pub fn load_or_create(path: Option<&Path>) -> Result<ConfigLoad, String> {
    let file = match path {
        Some(path) => path.to_path_buf(),
        None => config_dir()?.join(CONFIG_FILE_NAME),
    };

    let (mut config, created) = if file.exists() {
        let contents = fs::read_to_string(&file)
            .map_err(|err| format!("read config {}: {}", file.display(), err))?;
        let config: AppConfig = toml::from_str(&contents)
            .map_err(|err| format!("parse config {}: {}", file.display(), err))?;
        (config, false)
    } else {
        let config = AppConfig::default();
        write_config(&file, &config)?;
        (config, true)
    };

    config
        .apply_env_overrides()
        .map_err(|err| format!("environment override: {}", err))?;
    config
        .validate()
        .map_err(|err| format!("invalid config {}: {}", file.display(), err))?;

    Ok(ConfigLoad {
        config,
        file,
        created,
    })
}

fn write_config(file: &Path, config: &AppConfig) -> Result<(), String> {
    if let Some(dir) = file.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .map_err(|err| format!("create config dir {}: {}", dir.display(), err))?;
    }
    let contents =
        toml::to_string_pretty(config).map_err(|err| format!("serialize config: {}", err))?;
    fs::write(file, contents).map_err(|err| format!("write config {}: {}", file.display(), err))
}

fn config_dir() -> Result<PathBuf, String> {
    if let Ok(dir) = std::env::var("XDG_CONFIG_HOME")
        && !dir.trim().is_empty()
    {
        return Ok(PathBuf::from(dir).join(CONFIG_DIR_NAME));
    }
    let home = std::env::var("HOME").map_err(|err| format!("resolve HOME: {}", err))?;
    Ok(PathBuf::from(home).join(".config").join(CONFIG_DIR_NAME))
}
