//! Compiler configuration.
//!
//! A small TOML-backed config controls the link stage: optimization level,
//! the clang driver, where the runtime C source lives, and extra library
//! flags. Everything has a default, so most builds never need a file.

use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum OptimizationLevel {
    O0,
    O1,
    O2,
    O3,
}

impl OptimizationLevel {
    pub fn as_flag(self) -> &'static str {
        match self {
            OptimizationLevel::O0 => "-O0",
            OptimizationLevel::O1 => "-O1",
            OptimizationLevel::O2 => "-O2",
            OptimizationLevel::O3 => "-O3",
        }
    }
}

impl Default for OptimizationLevel {
    fn default() -> Self {
        OptimizationLevel::O1
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    /// Optimization level for both the runtime object and the final link.
    pub optimization_level: OptimizationLevel,
    /// clang driver binary.
    #[serde(rename = "clang")]
    pub clang_path: Option<String>,
    /// Runtime C source, overriding the embedded copy and the
    /// `FLYUX_RUNTIME_SRC` environment variable.
    pub runtime_source: Option<PathBuf>,
    /// Extra `-L` search paths.
    pub library_paths: Vec<String>,
    /// Extra `-l` libraries.
    pub libraries: Vec<String>,
}

impl CompilerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clang(&self) -> &str {
        self.clang_path.as_deref().unwrap_or("clang")
    }

    /// Load from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config '{}': {}", path.display(), e))?;
        toml::from_str(&text)
            .map_err(|e| format!("Failed to parse config '{}': {}", path.display(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::default();
        assert_eq!(config.optimization_level, OptimizationLevel::O1);
        assert_eq!(config.clang(), "clang");
        assert!(config.runtime_source.is_none());
        assert!(config.libraries.is_empty());
    }

    #[test]
    fn test_opt_flags() {
        assert_eq!(OptimizationLevel::O0.as_flag(), "-O0");
        assert_eq!(OptimizationLevel::O3.as_flag(), "-O3");
    }

    #[test]
    fn test_parse_toml() {
        let config: CompilerConfig = toml::from_str(
            r#"
            optimization_level = "O2"
            clang = "clang-17"
            libraries = ["m"]
            "#,
        )
        .unwrap();
        assert_eq!(config.optimization_level, OptimizationLevel::O2);
        assert_eq!(config.clang(), "clang-17");
        assert_eq!(config.libraries, vec!["m"]);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<CompilerConfig, _> = toml::from_str("not_a_field = 1");
        assert!(result.is_err());
    }
}
