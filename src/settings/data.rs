use std::path::Path;

use chrono::TimeDelta;
use log::warn;
use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    core::{
        models::{
            DEFAULT_PRIORITY,
            MAX_PRIORITY,
            MIN_PRIORITY,
        },
        Result,
    },
    persistence::{
        load_json_from,
        load_json_or_default,
        save_json,
        save_json_to,
    },
};

pub const SETTINGS_FILE: &str = "study_settings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeckSettings {
    pub new_items_per_day: u32,
    /// Minutes a word is kept out of rotation after it was tested.
    pub cooldown_minutes: u32,
    /// Chance of picking the due item with the shortest spacing instead of the
    /// one shown longest ago.
    pub short_interval_chance: f64,
    pub default_priority: u8,
}

impl Default for DeckSettings {
    fn default() -> Self {
        Self {
            new_items_per_day: 20,
            cooldown_minutes: 10,
            short_interval_chance: 0.2,
            default_priority: DEFAULT_PRIORITY,
        }
    }
}

impl DeckSettings {
    pub fn load() -> Self {
        load_json_or_default::<Self>(SETTINGS_FILE).validated()
    }

    pub fn save(&self) -> Result<()> {
        save_json(self, SETTINGS_FILE)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        Ok(load_json_from::<Self>(path)?.validated())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        save_json_to(self, path)
    }

    pub fn cooldown(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.cooldown_minutes))
    }

    /// Clamps out-of-range values back into what the scheduler accepts.
    pub fn validated(mut self) -> Self {
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&self.default_priority) {
            warn!(
                "default priority {} out of range, using {}",
                self.default_priority, DEFAULT_PRIORITY
            );
            self.default_priority = DEFAULT_PRIORITY;
        }
        if !(0.0..=1.0).contains(&self.short_interval_chance) {
            let clamped = if self.short_interval_chance.is_nan() {
                0.0
            } else {
                self.short_interval_chance.clamp(0.0, 1.0)
            };
            warn!(
                "short interval chance {} out of range, using {}",
                self.short_interval_chance, clamped
            );
            self.short_interval_chance = clamped;
        }
        self
    }
}
