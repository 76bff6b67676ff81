//! Settings parser for .clickwatch/config.toml

use std::path::{Path, PathBuf};

use clickwatch_core::prelude::*;

use super::types::Settings;

const CONFIG_FILENAME: &str = "config.toml";
const CLICKWATCH_DIR: &str = ".clickwatch";

/// Location of the config file for a base directory
pub fn config_path(base: &Path) -> PathBuf {
    base.join(CLICKWATCH_DIR).join(CONFIG_FILENAME)
}

/// Load settings from `<base>/.clickwatch/config.toml`.
///
/// Falls back to defaults when the file is missing or unreadable.
pub fn load_settings(base: &Path) -> Settings {
    let path = config_path(base);

    if !path.exists() {
        debug!("No config file at {:?}, using defaults", path);
        return Settings::default();
    }

    match load_settings_file(&path) {
        Ok(settings) => settings,
        Err(e) => {
            warn!("{}; using defaults", e);
            Settings::default()
        }
    }
}

/// Load settings from an explicit path. Unlike [`load_settings`], a
/// missing or malformed file is an error.
pub fn load_settings_file(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Err(Error::ConfigNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::config_invalid(path, format!("unreadable: {}", e)))?;

    let settings = toml::from_str(&content).map_err(|e| Error::config_invalid(path, e.to_string()))?;
    debug!("Loaded settings from {:?}", path);
    Ok(settings)
}

/// Create `.clickwatch/config.toml` with commented defaults.
///
/// An existing file is left untouched. Returns the config path.
pub fn init_config_dir(base: &Path) -> Result<PathBuf> {
    let path = config_path(base);
    if path.exists() {
        debug!("Config already exists at {:?}", path);
        return Ok(path);
    }

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .map_err(|e| Error::config(format!("Failed to create .clickwatch dir: {}", e)))?;
    }

    std::fs::write(&path, DEFAULT_CONFIG)
        .map_err(|e| Error::config(format!("Failed to write {:?}: {}", path, e)))?;

    info!("Created default config at {:?}", path);
    Ok(path)
}

const DEFAULT_CONFIG: &str = r#"# clickwatch configuration

[worker]
program = "python3"
args = ["app.py"]
# working_dir = "."

[supervisor]
auto_start = true
stop_grace_ms = 3000    # time to exit after SIGTERM
kill_wait_ms = 2000     # time to wait after a forced kill

[log]
file = "log.txt"        # raw worker output, appended
details = false         # emit every worker line as an event
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_config(base: &Path, content: &str) -> PathBuf {
        let path = config_path(base);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_missing_config_gives_defaults() {
        let dir = tempdir().unwrap();
        assert_eq!(load_settings(dir.path()), Settings::default());
    }

    #[test]
    fn test_invalid_config_gives_defaults() {
        let dir = tempdir().unwrap();
        write_config(dir.path(), "[supervisor\nauto_start = maybe");
        assert_eq!(load_settings(dir.path()), Settings::default());
    }

    #[test]
    fn test_load_custom_settings() {
        let dir = tempdir().unwrap();
        write_config(
            dir.path(),
            r#"
            [worker]
            program = "python"
            args = ["-u", "bridge.py"]

            [supervisor]
            auto_start = false
            "#,
        );

        let settings = load_settings(dir.path());
        assert_eq!(settings.worker.program, "python");
        assert_eq!(settings.worker.args, vec!["-u", "bridge.py"]);
        assert!(!settings.supervisor.auto_start);
    }

    #[test]
    fn test_strict_load_reports_missing_file() {
        let dir = tempdir().unwrap();
        let result = load_settings_file(&dir.path().join("nope.toml"));
        assert!(matches!(result, Err(Error::ConfigNotFound { .. })));
    }

    #[test]
    fn test_strict_load_reports_invalid_file() {
        let dir = tempdir().unwrap();
        let path = write_config(dir.path(), "[log]\ndetails = \"yes please\"");

        let err = load_settings_file(&path).unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_init_config_dir_writes_loadable_defaults() {
        let dir = tempdir().unwrap();

        let path = init_config_dir(dir.path()).unwrap();
        assert_eq!(load_settings_file(&path).unwrap(), Settings::default());
    }

    #[test]
    fn test_init_config_dir_keeps_existing_file() {
        let dir = tempdir().unwrap();
        write_config(dir.path(), "[log]\ndetails = true\n");

        init_config_dir(dir.path()).unwrap();
        assert!(load_settings(dir.path()).log.details);
    }
}
