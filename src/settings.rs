//! Session configuration: which model answers and how creative it is.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

pub const TEMPERATURE_MIN: f64 = 0.0;
pub const TEMPERATURE_MAX: f64 = 2.0;
pub const TEMPERATURE_STEP: f64 = 0.1;

#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    #[error("unknown model '{0}' (expected one of: gpt-4o, gpt-4o-mini, gpt-4-turbo)")]
    UnknownModel(String),
    #[error("temperature must be a number between 0.0 and 2.0, got {0}")]
    InvalidTemperature(String),
}

/// The fixed set of models offered in the settings panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Model {
    #[default]
    #[serde(rename = "gpt-4o")]
    Gpt4o,
    #[serde(rename = "gpt-4o-mini")]
    Gpt4oMini,
    #[serde(rename = "gpt-4-turbo")]
    Gpt4Turbo,
}

impl Model {
    pub const ALL: [Model; 3] = [Model::Gpt4o, Model::Gpt4oMini, Model::Gpt4Turbo];

    /// Identifier sent to the completion API.
    pub fn id(self) -> &'static str {
        match self {
            Model::Gpt4o => "gpt-4o",
            Model::Gpt4oMini => "gpt-4o-mini",
            Model::Gpt4Turbo => "gpt-4-turbo",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Model::Gpt4o => "GPT-4o",
            Model::Gpt4oMini => "GPT-4o mini",
            Model::Gpt4Turbo => "GPT-4 Turbo",
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Model {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Model::ALL
            .into_iter()
            .find(|m| m.id() == s)
            .ok_or_else(|| SettingsError::UnknownModel(s.to_string()))
    }
}

/// Sampling temperature, always within [0.0, 2.0] on the 0.1 slider grid.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize)]
pub struct Temperature(f64);

impl Temperature {
    pub fn new(value: f64) -> Result<Self, SettingsError> {
        if !value.is_finite() {
            return Err(SettingsError::InvalidTemperature(value.to_string()));
        }
        let clamped = value.clamp(TEMPERATURE_MIN, TEMPERATURE_MAX);
        // Snap via whole tenths so 0.3 stays 0.3 and not 0.30000000000000004.
        let tenths = (clamped / TEMPERATURE_STEP).round();
        Ok(Self(tenths / 10.0))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl FromStr for Temperature {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed: f64 = s
            .trim()
            .parse()
            .map_err(|_| SettingsError::InvalidTemperature(s.trim().to_string()))?;
        Temperature::new(parsed)
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}", self.0)
    }
}

impl<'de> Deserialize<'de> for Temperature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = f64::deserialize(deserializer)?;
        Temperature::new(value).map_err(serde::de::Error::custom)
    }
}

/// Per-session model and temperature. Survives a conversation reset.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Settings {
    pub model: Model,
    pub temperature: Temperature,
}

impl Settings {
    /// Validates raw settings-panel input as a whole; nothing changes unless both parts are valid.
    pub fn parse(model: &str, temperature: &str) -> Result<Self, SettingsError> {
        Ok(Self {
            model: model.parse()?,
            temperature: temperature.parse()?,
        })
    }
}
