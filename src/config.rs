use std::env;
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(String),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub mongodb_uri: String,
    pub database_name: String,
    pub jwk_set_uri: String,
    pub auth_audience: Option<String>,
    pub auth_issuer: Option<String>,
    pub frontend_url: String,
    pub workers: usize,
    /// Insert the demo experts and projects at startup.
    pub seed_demo_data: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "PORT", 5000)?,
            mongodb_uri: required(&lookup, "MONGODB_URI")?,
            database_name: lookup("DATABASE_NAME").unwrap_or_else(|| "squadup".to_string()),
            jwk_set_uri: required(&lookup, "JWK_SET_URI")?,
            auth_audience: lookup("AUTH_AUDIENCE").filter(|v| !v.is_empty()),
            auth_issuer: lookup("AUTH_ISSUER").filter(|v| !v.is_empty()),
            frontend_url: lookup("FRONTEND_URL")
                .unwrap_or_else(|| "http://localhost:5173".to_string()),
            workers: parse_or(&lookup, "WORKERS", 4)?,
            seed_demo_data: parse_or(&lookup, "SEED_DEMO_DATA", false)?,
        })
    }
}

fn required<F>(lookup: &F, name: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::Missing(name.to_string()))
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(name) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name: name.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn applies_defaults() {
        let config = Config::from_lookup(lookup_from(&[
            ("MONGODB_URI", "mongodb://localhost:27017"),
            ("JWK_SET_URI", "https://example.com/jwks.json"),
        ]))
        .unwrap();

        assert_eq!(config.port, 5000);
        assert_eq!(config.database_name, "squadup");
        assert_eq!(config.frontend_url, "http://localhost:5173");
        assert_eq!(config.workers, 4);
        assert!(config.auth_audience.is_none());
        assert!(!config.seed_demo_data);
    }

    #[test]
    fn reads_seed_flag() {
        let config = Config::from_lookup(lookup_from(&[
            ("MONGODB_URI", "mongodb://localhost"),
            ("JWK_SET_URI", "https://x"),
            ("SEED_DEMO_DATA", "true"),
        ]))
        .unwrap();
        assert!(config.seed_demo_data);

        let err = Config::from_lookup(lookup_from(&[
            ("MONGODB_URI", "mongodb://localhost"),
            ("JWK_SET_URI", "https://x"),
            ("SEED_DEMO_DATA", "sometimes"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name, .. } if name == "SEED_DEMO_DATA"));
    }

    #[test]
    fn rejects_missing_database_uri() {
        let err = Config::from_lookup(lookup_from(&[("JWK_SET_URI", "https://x")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(name) if name == "MONGODB_URI"));
    }

    #[test]
    fn rejects_bad_port() {
        let err = Config::from_lookup(lookup_from(&[
            ("MONGODB_URI", "mongodb://localhost"),
            ("JWK_SET_URI", "https://x"),
            ("PORT", "eighty"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name, .. } if name == "PORT"));
    }
}
