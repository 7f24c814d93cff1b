//! Configuration: defaults ← optional TOML file ← explicit flags.

use std::path::Path;

use anyhow::{Context, Result};
use installnet_core::Config;

use crate::args::RunArgs;

/// Read `path` if given, defaults otherwise.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("failed to parse config {}", path.display()))
}

/// Flags given on the command line win over the file.
pub fn apply(mut config: Config, args: &RunArgs) -> Config {
    if let Some(v) = &args.cache_dir {
        config.cache_root = v.clone();
    }
    if let Some(v) = &args.output_dir {
        config.output_root = v.clone();
    }
    if let Some(v) = &args.index_url {
        config.index_url = v.clone();
    }
    if let Some(v) = args.workers {
        config.workers = v;
    }
    if let Some(v) = args.stagger_secs {
        config.stagger_secs = v;
    }
    if let Some(v) = args.install_timeout_secs {
        config.install_timeout_secs = v;
    }
    if let Some(v) = &args.network {
        config.sandbox.network = v.clone();
    }
    if let Some(v) = &args.log_file {
        config.log_file = v.clone();
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn missing_path_means_defaults() {
        assert_eq!(load(None).unwrap(), Config::default());
    }

    #[test]
    fn file_values_then_flags() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("installnet.toml");
        std::fs::write(
            &path,
            r#"
workers = 3
index_url = "https://mirror.example/simple/"

[sandbox]
network = "none"
"#,
        )
        .unwrap();

        let config = load(Some(&path)).unwrap();
        assert_eq!(config.workers, 3);
        assert_eq!(config.sandbox.network, "none");
        assert_eq!(config.sandbox.image_tag, "installnet-sandbox");
        assert_eq!(config.stagger_secs, 60);

        let args = RunArgs {
            workers: Some(8),
            output_dir: Some(PathBuf::from("/data/out")),
            ..Default::default()
        };
        let config = apply(config, &args);
        assert_eq!(config.workers, 8);
        assert_eq!(config.output_root, PathBuf::from("/data/out"));
        assert_eq!(config.index_url, "https://mirror.example/simple/");
    }

    #[test]
    fn unreadable_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(load(Some(&tmp.path().join("nope.toml"))).is_err());
    }
}
