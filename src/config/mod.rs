//! Quiz engine settings.
//!
//! Layered with figment: built-in defaults, then `quizkit.toml` (or the file
//! named by `QUIZKIT_CONFIG`), then `QUIZKIT_*` environment variables.
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::learn::error::{QuizError, Result};
use crate::learn::types::{validate_passing_score, DEFAULT_SAMPLE_SIZE};

pub const DEFAULT_CONFIG_FILE: &str = "quizkit.toml";
const ENV_PREFIX: &str = "QUIZKIT_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizSettings {
    /// Questions drawn per attempt.
    pub sample_size: usize,
    /// Threshold for the offline `score` command when `--passing` is not
    /// given. Stored quizzes always carry their own passing score.
    pub default_passing_score: i32,
    /// Mixed into every attempt seed. Changing it reshuffles every
    /// in-flight attempt, so it must stay fixed for a deployment.
    pub seed_salt: String,
}

impl Default for QuizSettings {
    fn default() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
            default_passing_score: 70,
            seed_salt: String::new(),
        }
    }
}

impl QuizSettings {
    pub fn figment(path: impl AsRef<Path>) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]))
    }

    pub fn load() -> Result<Self> {
        let path = std::env::var(format!("{ENV_PREFIX}CONFIG"))
            .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(path)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let settings: Self = Self::figment(path)
            .extract()
            .map_err(|e| QuizError::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_size == 0 {
            return Err(QuizError::InvalidConfig(
                "sample_size must be positive".to_string(),
            ));
        }
        validate_passing_score(self.default_passing_score)?;
        Ok(())
    }
}
