//! Typed access to block configuration values.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dim::{Dim, DimError};

/// Type-specific configuration of a block.
///
/// This holds every key of a block's JSON object that is not one of the
/// common block fields (id, type, inputs etc.).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Config(BTreeMap<String, Value>);

impl Config {
    pub fn new() -> Config {
        Config::default()
    }

    /// Set a configuration value, returning the updated config.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Config {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Get a boolean option, or `default` if not set.
    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(Value::Bool(val)) => Ok(*val),
            Some(_) => Err(ConfigError::wrong_type(key, "a boolean")),
        }
    }

    /// Get an integer option.
    pub fn get_int(&self, key: &str) -> Result<Option<i64>, ConfigError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(val) => val
                .as_i64()
                .map(Some)
                .ok_or_else(|| ConfigError::wrong_type(key, "an integer")),
        }
    }

    /// Get an option holding one integer, or one integer per spatial axis.
    ///
    /// A single integer is repeated `count` times. Returns `default` repeated
    /// `count` times if the option is not set.
    pub fn get_ints(&self, key: &str, count: usize, default: i64) -> Result<Vec<i64>, ConfigError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(vec![default; count]),
            Some(Value::Array(items)) => {
                if items.len() != count {
                    return Err(ConfigError::new(
                        key,
                        ConfigErrorKind::WrongLength {
                            expected: count,
                            actual: items.len(),
                        },
                    ));
                }
                items
                    .iter()
                    .map(|item| {
                        item.as_i64()
                            .ok_or_else(|| ConfigError::wrong_type(key, "a list of integers"))
                    })
                    .collect()
            }
            Some(val) => {
                let val = val
                    .as_i64()
                    .ok_or_else(|| ConfigError::wrong_type(key, "an integer or list of integers"))?;
                Ok(vec![val; count])
            }
        }
    }

    /// Get a string option.
    pub fn get_str(&self, key: &str) -> Result<Option<&str>, ConfigError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(_) => Err(ConfigError::wrong_type(key, "a string")),
        }
    }

    /// Get an option holding a dimension size.
    pub fn get_dim(&self, key: &str) -> Result<Option<Dim>, ConfigError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(val) => value_to_dim(key, val).map(Some),
        }
    }

    /// Get an option holding either a single dimension or a list of
    /// dimensions.
    pub fn get_dims(&self, key: &str) -> Result<Option<Vec<Dim>>, ConfigError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| value_to_dim(key, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(val) => value_to_dim(key, val).map(|dim| Some(vec![dim])),
        }
    }
}

fn value_to_dim(key: &str, val: &Value) -> Result<Dim, ConfigError> {
    match val {
        Value::Number(num) => num
            .as_i64()
            .map(Dim::value)
            .ok_or_else(|| ConfigError::wrong_type(key, "an integer dimension")),
        Value::String(text) => {
            Dim::parse(text).map_err(|err| ConfigError::new(key, ConfigErrorKind::InvalidDim(err)))
        }
        _ => Err(ConfigError::wrong_type(key, "a dimension")),
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ConfigErrorKind {
    /// A required option is not set.
    Missing,
    /// An option has the wrong JSON type.
    WrongType { expected: &'static str },
    /// A list option has the wrong number of entries.
    WrongLength { expected: usize, actual: usize },
    /// A dimension option could not be parsed or is invalid.
    InvalidDim(DimError),
    /// An option has a value outside its allowed range.
    InvalidValue { message: String },
}

/// Error reading a block configuration option.
#[derive(Clone, Debug, PartialEq)]
pub struct ConfigError {
    key: String,
    kind: ConfigErrorKind,
}

impl ConfigError {
    pub fn new(key: &str, kind: ConfigErrorKind) -> ConfigError {
        ConfigError {
            key: key.to_string(),
            kind,
        }
    }

    pub fn missing(key: &str) -> ConfigError {
        ConfigError::new(key, ConfigErrorKind::Missing)
    }

    pub fn invalid_value(key: &str, message: impl Into<String>) -> ConfigError {
        ConfigError::new(
            key,
            ConfigErrorKind::InvalidValue {
                message: message.into(),
            },
        )
    }

    fn wrong_type(key: &str, expected: &'static str) -> ConfigError {
        ConfigError::new(key, ConfigErrorKind::WrongType { expected })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> &ConfigErrorKind {
        &self.kind
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ConfigErrorKind::Missing => write!(f, "missing required option \"{}\"", self.key),
            ConfigErrorKind::WrongType { expected } => {
                write!(f, "option \"{}\" must be {}", self.key, expected)
            }
            ConfigErrorKind::WrongLength { expected, actual } => write!(
                f,
                "option \"{}\" must have {} entries, found {}",
                self.key, expected, actual
            ),
            ConfigErrorKind::InvalidDim(err) => {
                write!(f, "option \"{}\" is not a valid dimension: {}", self.key, err)
            }
            ConfigErrorKind::InvalidValue { message } => {
                write!(f, "invalid value for option \"{}\": {}", self.key, message)
            }
        }
    }
}

impl Error for ConfigError {}
