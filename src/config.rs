//! Settings for connecting to a mine, loadable from any serde format.

use crate::constants::{
    DEFAULT_DESCRIPTION, DEFAULT_LIST_NAME, INITIAL_BACKOFF, INITIAL_DECAY, MAX_BACKOFF,
};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSecondsWithFrac};
use std::time::Duration;

/// Polling schedule for id resolution jobs.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSettings {
    /// Wait before the first status check, in seconds.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub initial_backoff: Duration,
    /// Factor the wait grows by after every check.
    pub decay: f64,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub max_backoff: Duration,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            initial_backoff: INITIAL_BACKOFF,
            decay: INITIAL_DECAY,
            max_backoff: MAX_BACKOFF,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListSettings {
    /// Prefix of generated list names, which are `<prefix>_<n>`.
    pub default_list_name: String,
    pub default_description: String,
}

impl Default for ListSettings {
    fn default() -> Self {
        Self {
            default_list_name: DEFAULT_LIST_NAME.to_string(),
            default_description: DEFAULT_DESCRIPTION.to_string(),
        }
    }
}

/// Everything needed to connect to a mine. See [crate::Service::from_config].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the mine, in any form [crate::types::ServiceRoot::normalize] accepts.
    pub root: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub jobs: JobSettings,
    #[serde(default)]
    pub lists: ListSettings,
}
