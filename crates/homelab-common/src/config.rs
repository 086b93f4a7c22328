//! Component configuration
//!
//! Stack settings are a flat map keyed `<component>:<key>`:
//!
//! ```yaml
//! config:
//!   overseerr:image: sctx/overseerr:1.33.2
//!   overseerr:port: 5055
//!   overseerr:domain: overseerr.example.com
//!   twingate:accessToken:
//!     secure: v1:...
//! ```
//!
//! A [`ComponentConfig`] scopes lookups to one component name so an
//! application definition only ever sees its own keys. Secure entries come
//! back as [`SecretValue`], which never prints its contents.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::yaml::parse_yaml;
use crate::{Error, Result};

/// Key under which secure values are stored
const SECURE_KEY: &str = "secure";

/// A configuration value that must not be logged
#[derive(Clone, PartialEq)]
pub struct SecretValue(String);

impl SecretValue {
    /// Wrap a secret
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret for building a resource body
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretValue([REDACTED])")
    }
}

impl fmt::Display for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// All configuration for one stack
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConfigSource {
    values: BTreeMap<String, Value>,
}

impl ConfigSource {
    /// An empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a stack settings file. Only the top-level `config` map is read.
    pub fn from_yaml(input: &str) -> Result<Self> {
        let doc = parse_yaml(input)?;
        let Some(config) = doc.get("config") else {
            return Ok(Self::new());
        };
        let map = config
            .as_object()
            .ok_or_else(|| Error::Yaml("`config` must be a mapping".to_string()))?;
        Ok(Self {
            values: map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        })
    }

    /// Set a value directly (`component:key`)
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Scope lookups to one component
    pub fn component(&self, component: impl Into<String>) -> ComponentConfig<'_> {
        ComponentConfig {
            source: self,
            component: component.into(),
        }
    }

    fn lookup(&self, component: &str, key: &str) -> Option<&Value> {
        self.values.get(&format!("{}:{}", component, key))
    }
}

/// Configuration lookups for one component
#[derive(Clone, Debug)]
pub struct ComponentConfig<'a> {
    source: &'a ConfigSource,
    component: String,
}

impl ComponentConfig<'_> {
    /// Component name this view is scoped to
    pub fn component(&self) -> &str {
        &self.component
    }

    fn raw(&self, key: &str) -> Option<&Value> {
        self.source
            .lookup(&self.component, key)
            .filter(|v| !v.is_null())
    }

    fn missing(&self, key: &str) -> Error {
        Error::config(&self.component, key, "missing required configuration")
    }

    /// Get a plain string value. Numbers and booleans are rendered as text.
    pub fn get(&self, key: &str) -> Option<String> {
        match self.raw(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Get a required string value
    pub fn require(&self, key: &str) -> Result<String> {
        if self.is_secure(key) {
            return Err(Error::config(
                &self.component,
                key,
                "value is secure; use require_secret",
            ));
        }
        self.get(key).ok_or_else(|| self.missing(key))
    }

    /// Get a required integer value; quoted numbers are accepted
    pub fn require_i64(&self, key: &str) -> Result<i64> {
        let value = self.raw(key).ok_or_else(|| self.missing(key))?;
        let parsed = match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        parsed.ok_or_else(|| Error::config(&self.component, key, "expected an integer"))
    }

    /// Get a required port number
    pub fn require_u16(&self, key: &str) -> Result<u16> {
        let n = self.require_i64(key)?;
        u16::try_from(n).map_err(|_| {
            Error::config(&self.component, key, format!("{} is out of range for a port", n))
        })
    }

    /// Get a required boolean value; `"true"`/`"false"` strings are accepted
    pub fn require_bool(&self, key: &str) -> Result<bool> {
        let value = self.raw(key).ok_or_else(|| self.missing(key))?;
        match value {
            Value::Bool(b) => Ok(*b),
            Value::String(s) if s == "true" => Ok(true),
            Value::String(s) if s == "false" => Ok(false),
            _ => Err(Error::config(&self.component, key, "expected a boolean")),
        }
    }

    /// Get a required secret. Both secure and plain entries are accepted.
    pub fn require_secret(&self, key: &str) -> Result<SecretValue> {
        let value = self.raw(key).ok_or_else(|| self.missing(key))?;
        let inner = value.get(SECURE_KEY).unwrap_or(value);
        match inner {
            Value::String(s) => Ok(SecretValue::new(s.clone())),
            _ => Err(Error::config(&self.component, key, "expected a string secret")),
        }
    }

    /// Deserialize a structured value
    pub fn get_object<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.raw(key) {
            None => Ok(None),
            Some(v) => serde_json::from_value(v.clone())
                .map(Some)
                .map_err(|e| Error::config(&self.component, key, e.to_string())),
        }
    }

    fn is_secure(&self, key: &str) -> bool {
        self.raw(key)
            .and_then(|v| v.as_object())
            .is_some_and(|m| m.contains_key(SECURE_KEY))
    }
}
