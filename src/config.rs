//! Process configuration, read from the environment at startup.
//!
//! | Variable | Required | Default |
//! |---|---|---|
//! | `GATEHOUSE_BIND_ADDR` | no | `0.0.0.0:8080` |
//! | `GATEHOUSE_BASIC_AUTH_USERNAME` | yes | |
//! | `GATEHOUSE_BASIC_AUTH_PASSWORD` | yes | |
//! | `GATEHOUSE_AUTH_REALM` | no | `gatehouse` |
//! | `GATEHOUSE_MAX_BODY_BYTES` | no | 16 MiB |
//!
//! There is no default username or password: a missing credential is a
//! startup error.

use std::env;
use std::net::SocketAddr;

use crate::body::DEFAULT_BODY_LIMIT;
use crate::gate::{BasicAuthGate, Credentials};

pub const BIND_ADDR: &str = "GATEHOUSE_BIND_ADDR";
pub const USERNAME: &str = "GATEHOUSE_BASIC_AUTH_USERNAME";
pub const PASSWORD: &str = "GATEHOUSE_BASIC_AUTH_PASSWORD";
pub const REALM: &str = "GATEHOUSE_AUTH_REALM";
pub const MAX_BODY_BYTES: &str = "GATEHOUSE_MAX_BODY_BYTES";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{name} has an invalid value `{value}`: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub credentials: Credentials,
    pub realm: String,
    pub max_body_bytes: usize,
}

impl Config {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| lookup(name).ok_or(ConfigError::Missing(name));

        let bind_addr = parse_or(&lookup, BIND_ADDR, DEFAULT_BIND_ADDR.parse().ok())?;
        let max_body_bytes = parse_or(&lookup, MAX_BODY_BYTES, Some(DEFAULT_BODY_LIMIT))?;
        let credentials = Credentials::new(required(USERNAME)?, required(PASSWORD)?);
        let realm = lookup(REALM).unwrap_or_else(|| BasicAuthGate::DEFAULT_REALM.to_owned());

        Ok(Self { bind_addr, credentials, realm, max_body_bytes })
    }

    /// The authentication gate this configuration describes.
    pub fn auth_gate(&self) -> BasicAuthGate {
        BasicAuthGate::new(self.credentials.clone()).realm(&self.realm)
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: Option<T>,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
            value,
        }),
        None => default.ok_or(ConfigError::Missing(name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_credentials_are_present() {
        let cfg = config(&[(USERNAME, "admin"), (PASSWORD, "secret")]).unwrap();
        assert_eq!(cfg.bind_addr.port(), 8080);
        assert_eq!(cfg.credentials, Credentials::new("admin", "secret"));
        assert_eq!(cfg.realm, "gatehouse");
        assert_eq!(cfg.max_body_bytes, DEFAULT_BODY_LIMIT);
    }

    #[test]
    fn credentials_have_no_default() {
        let err = config(&[(USERNAME, "admin")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(PASSWORD)));
        assert_eq!(err.to_string(), "GATEHOUSE_BASIC_AUTH_PASSWORD is not set");
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = config(&[
            (USERNAME, "admin"),
            (PASSWORD, "secret"),
            (MAX_BODY_BYTES, "lots"),
        ])
        .unwrap_err();
        assert!(err.to_string().starts_with("GATEHOUSE_MAX_BODY_BYTES has an invalid value `lots`"));
    }

    #[test]
    fn overrides_are_read() {
        let cfg = config(&[
            (USERNAME, "admin"),
            (PASSWORD, "sec:ret"),
            (BIND_ADDR, "127.0.0.1:9000"),
            (REALM, "fhir"),
            (MAX_BODY_BYTES, "1024"),
        ])
        .unwrap();
        assert_eq!(cfg.bind_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(cfg.max_body_bytes, 1024);
        assert_eq!(cfg.realm, "fhir");
    }
}
