use figment::{
    providers::{Env, Format, Json, Toml, Yaml},
    Figment,
};
use std::path::Path;

use crate::acl::MongoPermissions;
use crate::error::{ConfigError, Result};

use super::schema::Config;

pub async fn load_from_env_or_file() -> Result<Config> {
    let config: Config = Figment::new()
        .merge(Toml::file("docgate.toml"))
        .merge(Json::file("docgate.json"))
        .merge(Yaml::file("docgate.yaml"))
        .merge(Yaml::file("docgate.yml"))
        // Override with environment variables (DOCGATE_ prefix)
        .merge(Env::prefixed("DOCGATE_").split("_"))
        .extract()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    validate(&config)?;
    let config = apply_env_substitutions(config)?;

    Ok(config)
}

pub async fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();

    let config = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("DOCGATE_").split("_"))
            .extract(),
        Some("json") => Figment::new()
            .merge(Json::file(path))
            .merge(Env::prefixed("DOCGATE_").split("_"))
            .extract(),
        Some("yaml") | Some("yml") => Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("DOCGATE_").split("_"))
            .extract(),
        _ => {
            return Err(ConfigError::Parse(
                "Unsupported config file format. Use .toml, .json, .yaml, or .yml".into(),
            )
            .into())
        }
    };

    let config: Config = config.map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate(&config)?;
    let config = apply_env_substitutions(config)?;

    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.gateway.port == 0 {
        return Err(ConfigError::Validation("Gateway port must be set".into()).into());
    }

    if config.buffers.segment_size_bytes == 0 {
        return Err(ConfigError::Validation(
            "buffers.segmentSizeBytes must be greater than 0".into(),
        )
        .into());
    }

    if config.buffers.max_segments == 0 {
        return Err(
            ConfigError::Validation("buffers.maxSegments must be greater than 0".into()).into(),
        );
    }

    if config.identity.header.trim().is_empty() {
        return Err(ConfigError::Validation("identity.header must not be empty".into()).into());
    }

    // ACL entries are all-or-nothing: one malformed role aborts startup
    for (role, raw) in &config.acl {
        MongoPermissions::from_value(raw)
            .map_err(|e| ConfigError::Validation(format!("acl role '{role}': {e}")))?;
    }

    Ok(())
}

fn apply_env_substitutions(mut config: Config) -> Result<Config> {
    if let Some(connection_string) = &mut config.store.connection_string {
        *connection_string = substitute_env_vars(connection_string)?;
    }

    Ok(config)
}

fn substitute_env_vars(input: &str) -> Result<String> {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("static pattern");

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(value) => {
                result = result.replace(&cap[0], &value);
            }
            Err(_) => {
                // ${VAR:-default} falls back when VAR is unset
                if let Some((name, default)) = var_name.split_once(":-") {
                    match std::env::var(name) {
                        Ok(value) => result = result.replace(&cap[0], &value),
                        Err(_) => result = result.replace(&cap[0], default),
                    }
                } else {
                    return Err(ConfigError::EnvVar(format!(
                        "Environment variable '{var_name}' not found"
                    ))
                    .into());
                }
            }
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn env_substitution_resolves_vars_and_defaults() {
        std::env::set_var("DOCGATE_TEST_VAR", "resolved");

        let result = substitute_env_vars("mongodb://${DOCGATE_TEST_VAR}:27017").unwrap();
        assert_eq!(result, "mongodb://resolved:27017");

        let result = substitute_env_vars("${DOCGATE_MISSING:-fallback}").unwrap();
        assert_eq!(result, "fallback");

        assert!(substitute_env_vars("${DOCGATE_MISSING_NO_DEFAULT}").is_err());

        std::env::remove_var("DOCGATE_TEST_VAR");
    }

    #[test]
    fn validation_rejects_zero_buffer_budget() {
        let mut config = Config::default();
        config.buffers.max_segments = 0;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.buffers.segment_size_bytes = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn validation_rejects_malformed_acl_roles() {
        let mut config = Config::default();
        config
            .acl
            .insert("ops".to_string(), json!({ "whitelistBulkDelete": "yes" }));
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("ops"));
        assert!(err.to_string().contains("whitelistBulkDelete"));
    }

    #[test]
    fn defaults_validate_cleanly() {
        assert!(validate(&Config::default()).is_ok());
    }
}
