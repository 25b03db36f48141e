use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Deserializer, Serialize};

/// A duration as written in configuration files, either a single unit string
/// such as `"500ms"`, `"1s"`, `"30m"`, `"24h"` or `"1d"`, or a unit table such
/// as `{ seconds = 1, milliseconds = 500 }` whose units are summed.
///
/// Layered sources deep merge tables, so a table laid over another table adds
/// units to it. Strings always replace whatever they override.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Serialize)]
pub struct ConfigDuration {
    days: Option<u64>,
    hours: Option<u64>,
    minutes: Option<u64>,
    seconds: Option<u64>,
    milliseconds: Option<u64>,
}

impl ConfigDuration {
    pub fn to_std_duration(&self) -> Duration {
        let secs = [
            (self.days, 24 * 60 * 60),
            (self.hours, 60 * 60),
            (self.minutes, 60),
            (self.seconds, 1),
        ]
        .into_iter()
        .fold(0u64, |total, (value, unit)| {
            total.saturating_add(value.unwrap_or(0).saturating_mul(unit))
        });
        let millis = Duration::from_millis(self.milliseconds.unwrap_or(0));
        Duration::from_secs(secs).saturating_add(millis)
    }

    pub fn from_millis(millis: u64) -> Self {
        Self {
            milliseconds: Some(millis),
            ..Default::default()
        }
    }

    pub fn from_secs(secs: u64) -> Self {
        Self {
            seconds: Some(secs),
            ..Default::default()
        }
    }

    pub fn is_zero(&self) -> bool {
        self.to_std_duration().is_zero()
    }
}

impl From<ConfigDuration> for Duration {
    fn from(value: ConfigDuration) -> Self {
        value.to_std_duration()
    }
}

impl From<Duration> for ConfigDuration {
    fn from(value: Duration) -> Self {
        let millis = value.as_millis();
        if millis % 1000 == 0 {
            Self::from_secs(value.as_secs())
        } else {
            Self::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
        }
    }
}

impl FromStr for ConfigDuration {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| anyhow!("duration {:?} has no unit", s))?;
        let (value, unit) = s.split_at(split);
        let value: u64 = value
            .parse()
            .with_context(|| format!("duration {:?} has no amount", s))?;
        let mut duration = Self::default();
        match unit.trim() {
            "ms" => duration.milliseconds = Some(value),
            "s" => duration.seconds = Some(value),
            "m" | "min" => duration.minutes = Some(value),
            "h" => duration.hours = Some(value),
            "d" => duration.days = Some(value),
            other => return Err(anyhow!("unknown duration unit {:?} in {:?}", other, s)),
        }
        Ok(duration)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DurationRepr {
    Text(String),
    Units {
        days: Option<u64>,
        hours: Option<u64>,
        minutes: Option<u64>,
        seconds: Option<u64>,
        milliseconds: Option<u64>,
    },
}

impl<'de> Deserialize<'de> for ConfigDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match DurationRepr::deserialize(deserializer)? {
            DurationRepr::Text(text) => text.parse().map_err(serde::de::Error::custom),
            DurationRepr::Units {
                days,
                hours,
                minutes,
                seconds,
                milliseconds,
            } => Ok(Self {
                days,
                hours,
                minutes,
                seconds,
                milliseconds,
            }),
        }
    }
}
