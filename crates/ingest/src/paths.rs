use std::path::PathBuf;

/// `$CLAUDE_DATA_PATH/projects`, falling back to `~/.claude/projects`.
pub fn default_log_root() -> PathBuf {
    if let Ok(path) = std::env::var("CLAUDE_DATA_PATH")
        && !path.trim().is_empty()
    {
        return PathBuf::from(path).join("projects");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".claude").join("projects");
    }
    PathBuf::from(".claude").join("projects")
}
