use std::path::{Path, PathBuf};

use super::types::{AppConfig, ProgressBackend};

/// Get the default artiflow data directory: ~/.artiflow
pub fn get_artiflow_data_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(PathBuf::from(home).join(".artiflow"))
}

pub fn load_from_path(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let mut cfg = toml::from_str::<AppConfig>(&s)?;
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    // Priority 1: ~/.artiflow/config.toml (highest)
    let data_dir = get_artiflow_data_dir()?;
    let home_config = data_dir.join("config.toml");

    // Priority 2: ./config.toml (current directory)
    let local_config = Path::new("config.toml");

    let mut cfg: AppConfig = if home_config.exists() {
        let s = std::fs::read_to_string(&home_config)?;
        toml::from_str::<AppConfig>(&s)?
    } else if local_config.exists() {
        let s = std::fs::read_to_string(local_config)?;
        toml::from_str::<AppConfig>(&s)?
    } else {
        AppConfig::default()
    };

    if cfg.progress.backend == ProgressBackend::File && is_blank(cfg.progress.directory.as_deref())
    {
        cfg.progress.directory = Some(
            data_dir
                .join("sessions")
                .to_string_lossy()
                .to_string(),
        );
    }

    if cfg.logging.file && is_blank(cfg.logging.directory.as_deref()) {
        cfg.logging.directory = Some(data_dir.join("logs").to_string_lossy().to_string());
    }

    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

fn is_blank(v: Option<&str>) -> bool {
    v.map(|s| s.trim().is_empty()).unwrap_or(true)
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

// Environment variable overrides (Priority 0: highest)
fn apply_env_overrides(cfg: &mut AppConfig) {
    if let Some(v) = env_value("ARTIFLOW_LOG_LEVEL") {
        cfg.logging.level = v;
    }
    if let Some(v) = env_value("ARTIFLOW_PROGRESS_DIR") {
        cfg.progress.backend = ProgressBackend::File;
        cfg.progress.directory = Some(v);
    }
    if let Some(v) = env_value("ARTIFLOW_RETRY_MAX_ATTEMPTS") {
        match v.parse() {
            Ok(n) => cfg.retry.max_attempts = n,
            Err(_) => tracing::warn!(value = %v, "ignoring invalid ARTIFLOW_RETRY_MAX_ATTEMPTS"),
        }
    }
    if let Some(v) = env_value("ARTIFLOW_HTTP_PORT") {
        match v.parse() {
            Ok(port) => cfg.http_server.port = port,
            Err(_) => tracing::warn!(value = %v, "ignoring invalid ARTIFLOW_HTTP_PORT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_from_path_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[executor]\nmax_parallel_tasks = 2\n[output]\nformat = \"jsonl\"\n",
        )
        .unwrap();

        let cfg = load_from_path(&path).unwrap();
        assert_eq!(cfg.executor.max_parallel_tasks, 2);
        assert_eq!(cfg.output.format, "jsonl");
    }

    #[test]
    fn load_from_missing_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_from_path(&dir.path().join("nope.toml")).is_err());
    }
}
