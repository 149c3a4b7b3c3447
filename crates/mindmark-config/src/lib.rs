use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {config_path}: {source}")]
    ConfigReadError {
        config_path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {config_path}: {source}")]
    ConfigParseError {
        config_path: PathBuf,
        source: toml::de::Error,
    },
}

/// An external command; the block source is piped to its stdin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

/// The `[render]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub default_width: u32,
    pub default_height: u32,
    pub base_font_px: f64,
    pub flatten_math_lines: bool,
    pub frame_interval_ms: u64,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            default_width: 480,
            default_height: 240,
            base_font_px: 16.0,
            flatten_math_lines: false,
            frame_interval_ms: 16,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub render: RenderSettings,
    /// Diagram renderers keyed by fence language, e.g. `[renderers.dot]`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub renderers: BTreeMap<String, CommandSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub math: Option<CommandSpec>,
}

impl Config {
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Option<Self>, ConfigError> {
        let config_path = config_path.as_ref();
        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(config_path).map_err(|source| {
            ConfigError::ConfigReadError {
                config_path: config_path.to_path_buf(),
                source,
            }
        })?;

        let mut config: Config =
            toml::from_str(&content).map_err(|source| ConfigError::ConfigParseError {
                config_path: config_path.to_path_buf(),
                source,
            })?;

        // Expand shell variables and tilde in command paths
        for spec in config.renderers.values_mut().chain(config.math.as_mut()) {
            spec.command = Self::expand_path(Path::new(&spec.command))
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_else(|| spec.command.clone());
        }

        Ok(Some(config))
    }

    pub fn load() -> Result<Option<Self>, ConfigError> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, config_path: P) -> anyhow::Result<()> {
        let config_path = config_path.as_ref();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        self.save_to_path(&config_path)
    }

    pub fn config_path() -> PathBuf {
        let config_dir = shellexpand::tilde("~/.config/mindmark");
        PathBuf::from(config_dir.as_ref()).join("config.toml")
    }

    pub fn expand_path(path: &Path) -> Option<PathBuf> {
        let path_str = path.to_string_lossy();
        match shellexpand::full(&path_str) {
            Ok(expanded) => Some(PathBuf::from(expanded.as_ref())),
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::env;
    use tempfile::TempDir;

    fn sample() -> Config {
        let mut renderers = BTreeMap::new();
        renderers.insert(
            "dot".to_string(),
            CommandSpec {
                command: "/usr/bin/dot".to_string(),
                args: vec!["-T{format}".to_string()],
            },
        );
        Config {
            render: RenderSettings {
                flatten_math_lines: true,
                ..RenderSettings::default()
            },
            renderers,
            math: Some(CommandSpec {
                command: "/usr/local/bin/tex2svg".to_string(),
                args: Vec::new(),
            }),
        }
    }

    #[test]
    fn test_config_path() {
        let config_path = Config::config_path();
        let path_str = config_path.to_string_lossy();

        assert!(!path_str.starts_with('~'));
        assert!(path_str.ends_with(".config/mindmark/config.toml"));
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config: Config = toml::from_str("").unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.render.default_width, 480);
        assert_eq!(config.render.frame_interval_ms, 16);
    }

    #[test]
    fn test_partial_render_table() {
        let config: Config = toml::from_str("[render]\nbase_font_px = 20.0\n").unwrap();

        assert_eq!(config.render.base_font_px, 20.0);
        assert_eq!(config.render.default_height, 240);
        assert!(!config.render.flatten_math_lines);
    }

    #[test]
    fn test_renderer_tables() {
        let config: Config = toml::from_str(
            r#"
[renderers.mermaid]
command = "mmdc"
args = ["-i", "-", "-o", "-"]

[renderers.dot]
command = "dot"

[math]
command = "tex2svg"
args = ["--{display}"]
"#,
        )
        .unwrap();

        assert_eq!(config.renderers.len(), 2);
        assert_eq!(config.renderers["mermaid"].args, ["-i", "-", "-o", "-"]);
        assert!(config.renderers["dot"].args.is_empty());
        assert_eq!(config.math.unwrap().command, "tex2svg");
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let expanded = Config::expand_path(Path::new("~/bin/render")).unwrap();

        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().ends_with("bin/render"));
    }

    #[test]
    fn test_expand_path_with_absolute_path() {
        let path = PathBuf::from("/absolute/path");
        assert_eq!(Config::expand_path(&path).unwrap(), path);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let non_existent_config = temp_dir.path().join("nonexistent.toml");

        let result = Config::load_from_path(&non_existent_config).unwrap();

        assert!(result.is_none());
    }

    #[test]
    fn test_load_invalid_toml_is_parse_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("config.toml");
        std::fs::write(&config_file, "[render\n").unwrap();

        let err = Config::load_from_path(&config_file).unwrap_err();

        assert!(matches!(err, ConfigError::ConfigParseError { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("nested/config.toml");
        let test_config = sample();

        test_config.save_to_path(&config_file).unwrap();
        let loaded_config = Config::load_from_path(&config_file).unwrap().unwrap();

        assert_eq!(loaded_config, test_config);
    }

    #[test]
    fn test_command_with_env_var_is_expanded_on_load() {
        unsafe {
            env::set_var("MINDMARK_TEST_BIN", "/opt/render");
        }
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("config.toml");
        std::fs::write(
            &config_file,
            "[renderers.wavedrom]\ncommand = \"$MINDMARK_TEST_BIN/wavedrom\"\n",
        )
        .unwrap();

        let config = Config::load_from_path(&config_file).unwrap().unwrap();

        assert_eq!(config.renderers["wavedrom"].command, "/opt/render/wavedrom");
        unsafe {
            env::remove_var("MINDMARK_TEST_BIN");
        }
    }
}
