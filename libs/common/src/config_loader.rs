//! Layered configuration loading
//!
//! Priority (highest last): struct defaults, YAML file, prefixed environment.
//! Nested keys use a double underscore: `REGOSRV_MQTT__HOST=broker`.

use std::path::Path;

use errors::{RegoError, RegoResult};
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{info, warn};

/// Load `T` from defaults, an optional YAML file and `<prefix>*` variables
pub fn load_layered<T>(path: &Path, env_prefix: &str) -> RegoResult<T>
where
    T: DeserializeOwned + Serialize + Default,
{
    let mut figment = Figment::from(Serialized::defaults(T::default()));

    if path.exists() {
        info!("Loading configuration from {}", path.display());
        figment = figment.merge(Yaml::file(path));
    } else {
        warn!(
            "Configuration file {} not found, using defaults and environment",
            path.display()
        );
    }

    figment
        .merge(Env::prefixed(env_prefix).split("__"))
        .extract()
        .map_err(|e| RegoError::Configuration(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
    #[serde(default)]
    struct Inner {
        host: String,
        port: u16,
    }

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
    #[serde(default)]
    struct Sample {
        name: String,
        inner: Inner,
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let loaded: Sample =
            load_layered(Path::new("/nonexistent/regosrv.yaml"), "CFGTEST_MISSING_").unwrap();
        assert_eq!(loaded, Sample::default());
    }

    #[test]
    fn test_yaml_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "name: gateway\ninner:\n  host: broker\n  port: 1884").unwrap();

        let loaded: Sample = load_layered(file.path(), "CFGTEST_YAML_").unwrap();
        assert_eq!(loaded.name, "gateway");
        assert_eq!(loaded.inner.host, "broker");
        assert_eq!(loaded.inner.port, 1884);
    }

    #[test]
    fn test_env_overrides_yaml() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "inner:\n  port: 1884").unwrap();

        std::env::set_var("CFGTEST_ENV_INNER__PORT", "1999");
        let loaded: Sample = load_layered(file.path(), "CFGTEST_ENV_").unwrap();
        std::env::remove_var("CFGTEST_ENV_INNER__PORT");

        assert_eq!(loaded.inner.port, 1999);
    }

    #[test]
    fn test_malformed_yaml_is_configuration_error() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "inner: [unclosed").unwrap();

        let err = load_layered::<Sample>(file.path(), "CFGTEST_BAD_").unwrap_err();
        assert!(matches!(err, RegoError::Configuration(_)));
    }
}
