//! Standard locations for normplay configuration

use std::path::PathBuf;

/// File name of the configuration inside [`config_dir`]
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Per-user configuration directory
///
/// `<platform config dir>/normplay`, or `./normplay` when the platform
/// reports none.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("normplay")
}

/// Default configuration file path
pub fn default_config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_layout() {
        let path = default_config_path();
        assert!(path.ends_with("normplay/config.yaml"));
        assert_eq!(path.parent(), Some(config_dir().as_path()));
    }
}
