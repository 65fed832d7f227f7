// Copyright 2025 The Drasi Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Typed configuration model.
//!
//! The document tree is decoded into [`Config`] and [`PoolerConfig`] with
//! serde. Scalars are accepted leniently where interpolation can change
//! their type: a port written as `$(EXPORTER_PORT)` becomes the string
//! `"9127"` after interpolation and still decodes as an integer, and label
//! values such as `pool_id: 1` decode to `"1"`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::de::Deserializer;
use serde::Deserialize;
use serde_yaml::Value;

use super::dsn::{ConnectionAttributes, DsnError};
use super::env_interpolation::process_env;
use super::loader::{self, ConfigError};
use super::validation::{self, ValidationError};

pub const DEFAULT_EXPORTER_HOST: &str = "127.0.0.1";
pub const DEFAULT_EXPORTER_PORT: u16 = 9100;
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 5;

/// Exporter configuration: where to bind and which poolers to observe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    exporter_host: String,
    exporter_port: u16,
    poolers: Vec<PoolerConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            exporter_host: DEFAULT_EXPORTER_HOST.to_string(),
            exporter_port: DEFAULT_EXPORTER_PORT,
            poolers: Vec::new(),
        }
    }
}

impl Config {
    /// Build a config from an already interpolated document tree.
    ///
    /// `Null` and an empty mapping both yield the defaults with no poolers.
    /// Nothing is validated here.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        let document: Option<ConfigDocument> = serde_yaml::from_value(value)?;
        let document = document.unwrap_or_default();

        Ok(Self {
            exporter_host: document.exporter.global.host,
            exporter_port: document.exporter.global.port,
            poolers: document.pgbouncers,
        })
    }

    /// Read a config file using the process environment for interpolation.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        loader::load_config_file(path)
    }

    /// Replace this config with the content of `path`.
    ///
    /// On error the current state is left untouched.
    pub fn read<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ConfigError> {
        self.read_with_env(path, &process_env)
    }

    /// Same as [`Config::read`] with an explicit environment lookup.
    pub fn read_with_env<P, F>(&mut self, path: P, lookup: &F) -> Result<(), ConfigError>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        *self = loader::load_config_file_with_env(path, lookup)?;
        Ok(())
    }

    /// Check that at least one pooler is configured, that each pooler is
    /// valid, and that no two poolers share the same extra labels.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_config(self)
    }

    pub fn exporter_host(&self) -> &str {
        &self.exporter_host
    }

    pub fn exporter_port(&self) -> u16 {
        self.exporter_port
    }

    /// Poolers in document order.
    pub fn poolers(&self) -> &[PoolerConfig] {
        &self.poolers
    }
}

/// Configuration of a single pooler instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PoolerConfig {
    #[serde(default, deserialize_with = "string_or_empty")]
    dsn: String,
    #[serde(default = "default_connect_timeout", deserialize_with = "connect_timeout")]
    connect_timeout: u64,
    #[serde(default, deserialize_with = "string_list")]
    include_databases: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    exclude_databases: Vec<String>,
    #[serde(default, deserialize_with = "label_map")]
    extra_labels: BTreeMap<String, String>,
}

impl Default for PoolerConfig {
    fn default() -> Self {
        Self::new("")
    }
}

impl PoolerConfig {
    /// A pooler with the given descriptor and every other field defaulted.
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            include_databases: Vec::new(),
            exclude_databases: Vec::new(),
            extra_labels: BTreeMap::new(),
        }
    }

    /// Build a pooler from one entry of the `pgbouncers` list.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        let pooler: Option<Self> = serde_yaml::from_value(value)?;
        Ok(pooler.unwrap_or_default())
    }

    /// Connection attributes for this pooler.
    pub fn connection_attributes(&self) -> Result<ConnectionAttributes, DsnError> {
        ConnectionAttributes::parse(&self.dsn, self.connect_timeout)
    }

    /// The libpq key/value connection string, with the password replaced by
    /// `****` when `remove_password` is set.
    pub fn get_key_value_connection(&self, remove_password: bool) -> Result<String, DsnError> {
        Ok(self.connection_attributes()?.render(remove_password))
    }

    /// Only checks that a DSN is present. Parse errors surface from
    /// [`PoolerConfig::get_key_value_connection`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_pooler(self)
    }

    /// Whether metrics for `database` should be collected.
    ///
    /// An empty include list includes everything. Exclusion wins.
    pub fn includes_database(&self, database: &str) -> bool {
        let included = self.include_databases.is_empty()
            || self.include_databases.iter().any(|d| d == database);
        included && !self.exclude_databases.iter().any(|d| d == database)
    }

    pub fn dsn(&self) -> &str {
        &self.dsn
    }

    pub fn connect_timeout(&self) -> u64 {
        self.connect_timeout
    }

    pub fn include_databases(&self) -> &[String] {
        &self.include_databases
    }

    pub fn exclude_databases(&self) -> &[String] {
        &self.exclude_databases
    }

    pub fn extra_labels(&self) -> &BTreeMap<String, String> {
        &self.extra_labels
    }
}

/// On-disk layout:
///
/// ```yaml
/// exporter:
///   global:
///     host: 0.0.0.0
///     port: 9100
/// pgbouncers: []
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigDocument {
    #[serde(deserialize_with = "null_as_default")]
    exporter: ExporterSection,
    #[serde(deserialize_with = "null_as_default")]
    pgbouncers: Vec<PoolerConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExporterSection {
    #[serde(deserialize_with = "null_as_default")]
    global: GlobalSettings,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct GlobalSettings {
    #[serde(deserialize_with = "exporter_host")]
    host: String,
    #[serde(deserialize_with = "exporter_port")]
    port: u16,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_EXPORTER_HOST.to_string(),
            port: DEFAULT_EXPORTER_PORT,
        }
    }
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn string_or_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    string_or(deserializer, "")
}

fn exporter_host<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    string_or(deserializer, DEFAULT_EXPORTER_HOST)
}

fn exporter_port<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    integer_or(deserializer, DEFAULT_EXPORTER_PORT)
}

fn connect_timeout<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    integer_or(deserializer, DEFAULT_CONNECT_TIMEOUT)
}

fn string_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(items) => items
            .iter()
            .map(|item| scalar_to_string(item).ok_or_else(|| unexpected(item, "a string")))
            .collect(),
        other => Err(unexpected(&other, "a list of strings")),
    }
}

fn label_map<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<String, String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(BTreeMap::new()),
        Value::Mapping(map) => map
            .iter()
            .map(|(k, v)| -> Result<(String, String), D::Error> {
                let key = scalar_to_string(k).ok_or_else(|| unexpected(k, "a label name"))?;
                let value = scalar_to_string(v).ok_or_else(|| unexpected(v, "a label value"))?;
                Ok((key, value))
            })
            .collect(),
        other => Err(unexpected(&other, "a mapping of labels")),
    }
}

fn string_or<'de, D: Deserializer<'de>>(
    deserializer: D,
    default: &str,
) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(default.to_string()),
        other => scalar_to_string(&other).ok_or_else(|| unexpected(&other, "a string")),
    }
}

fn integer_or<'de, D, T>(deserializer: D, default: T) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<u64>,
{
    let value = Value::deserialize(deserializer)?;
    let number = match &value {
        Value::Null => return Ok(default),
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    number
        .and_then(|n| T::try_from(n).ok())
        .ok_or_else(|| unexpected(&value, "a non-negative integer in range"))
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn unexpected<E: serde::de::Error>(found: &Value, expected: &str) -> E {
    let found = match found {
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("boolean `{b}`"),
        Value::Number(n) => format!("number `{n}`"),
        Value::String(s) => format!("string {s:?}"),
        Value::Sequence(_) => "a sequence".to_string(),
        Value::Mapping(_) => "a mapping".to_string(),
        Value::Tagged(t) => format!("tagged value {}", t.tag),
    };
    E::custom(format!("invalid value: {found}, expected {expected}"))
}
