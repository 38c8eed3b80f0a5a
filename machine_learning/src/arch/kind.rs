use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// The families of models a host can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// Maps a feature vector to the label of its nearest training examples.
    Classification,
    /// Maps a feature vector to continuous outputs.
    Regression,
    /// Maps a series of feature vectors to the label of the closest recorded series.
    DynamicTimewarp,
}

impl ModelType {
    /// The tag used in file names and on the command line.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Classification => "classification",
            Self::Regression => "regression",
            Self::DynamicTimewarp => "dtw",
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Returned when parsing an unknown model type tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownModelType(pub String);

impl fmt::Display for UnknownModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown model type '{}', expected classification, regression or dtw",
            self.0
        )
    }
}

impl std::error::Error for UnknownModelType {}

impl FromStr for ModelType {
    type Err = UnknownModelType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "classification" | "classifier" => Ok(Self::Classification),
            "regression" | "regressor" => Ok(Self::Regression),
            "dtw" | "dynamic_timewarp" | "series" => Ok(Self::DynamicTimewarp),
            _ => Err(UnknownModelType(s.to_string())),
        }
    }
}
