// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Device and stream arguments.
//!
//! Devices and streamers are configured with flat argument strings of the form
//! `key=value,key=value`. [`DeviceArgs`] keeps the pairs in the order they were
//! given and offers typed accessors on top of the raw strings.

#![deny(clippy::all, clippy::pedantic, clippy::unwrap_used)]
#![allow(clippy::missing_errors_doc)]

use ordermap::OrderMap;
use std::fmt::Display;
use std::str::FromStr;
#[allow(unused)]
use tracing::{debug, error, warn};

/// Separator between pairs.
pub const PAIR_SEPARATOR: char = ',';
/// Separator between key and value.
pub const KEY_VALUE_SEPARATOR: char = '=';

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DeviceArgsError {
    #[error("Bad syntax: missing '{KEY_VALUE_SEPARATOR}' in '{0}'")]
    MissingSeparator(String),
    #[error("Bad syntax: empty key in '{0}'")]
    EmptyKey(String),
    #[error("Invalid value '{value}' for key '{key}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// An ordered set of `key=value` arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceArgs(OrderMap<String, String>);

impl DeviceArgs {
    #[must_use]
    pub fn new() -> Self {
        Self(OrderMap::new())
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    #[must_use]
    pub fn has_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Set `key` to `value`, returning the previous value if there was one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    /// Iterate over the pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Look up a boolean argument. Accepts `1/0`, `true/false` and `yes/no`, ignoring case.
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, DeviceArgsError> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(Some(true)),
            "0" | "false" | "no" => Ok(Some(false)),
            _ => {
                error!("Argument {key} has non-boolean value '{value}'");
                Err(DeviceArgsError::InvalidValue {
                    key: key.to_owned(),
                    value: value.to_owned(),
                    reason: "expected a boolean".to_string(),
                })
            }
        }
    }

    /// Look up an argument and parse it with [`FromStr`].
    pub fn get_parsed<T>(&self, key: &str) -> Result<Option<T>, DeviceArgsError>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get(key)
            .map(|value| {
                value.parse::<T>().map_err(|e| {
                    error!("Failed to parse argument {key}='{value}': {e}");
                    DeviceArgsError::InvalidValue {
                        key: key.to_owned(),
                        value: value.to_owned(),
                        reason: e.to_string(),
                    }
                })
            })
            .transpose()
    }

    /// Returns a copy of these arguments where every key of `other` overrides (or is added to)
    /// the ones in `self`.
    #[must_use]
    pub fn merge(&self, other: &DeviceArgs) -> DeviceArgs {
        let mut merged = self.clone();
        for (key, value) in other.iter() {
            merged.insert(key, value);
        }
        merged
    }
}

impl FromStr for DeviceArgs {
    type Err = DeviceArgsError;
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut args = DeviceArgs::new();
        for pair in input.split(PAIR_SEPARATOR) {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair
                .split_once(KEY_VALUE_SEPARATOR)
                .ok_or_else(|| DeviceArgsError::MissingSeparator(pair.to_owned()))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(DeviceArgsError::EmptyKey(pair.to_owned()));
            }
            if let Some(old) = args.insert(key, value.trim()) {
                debug!("Argument {key} given more than once, dropping earlier value '{old}'");
            }
        }
        Ok(args)
    }
}

impl Display for DeviceArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (n, (key, value)) in self.iter().enumerate() {
            if n > 0 {
                write!(f, "{PAIR_SEPARATOR}")?;
            }
            write!(f, "{key}{KEY_VALUE_SEPARATOR}{value}")?;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for DeviceArgs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut args = DeviceArgs::new();
        for (key, value) in iter {
            args.insert(key, value);
        }
        args
    }
}
