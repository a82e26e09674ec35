// Time range domain models
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named shorthand for a time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Hour,
    Day,
    Week,
    Month,
    Custom,
}

impl Preset {
    pub const ALL: [Preset; 5] = [
        Preset::Hour,
        Preset::Day,
        Preset::Week,
        Preset::Month,
        Preset::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::Hour => "hour",
            Preset::Day => "day",
            Preset::Week => "week",
            Preset::Month => "month",
            Preset::Custom => "custom",
        }
    }

    /// Label shown in the filter dropdown
    pub fn label(&self) -> &'static str {
        match self {
            Preset::Hour => "Last Hour",
            Preset::Day => "Per Day",
            Preset::Week => "This Week",
            Preset::Month => "This Month",
            Preset::Custom => "Custom Range",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown preset: {0}")]
pub struct UnknownPreset(pub String);

impl FromStr for Preset {
    type Err = UnknownPreset;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Preset::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownPreset(s.to_string()))
    }
}

/// Concrete interval driving every data fetch. `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeRange {
    /// Builds a range, swapping the endpoints if they arrive reversed.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }
}

/// Date-picker state for the custom preset. Either endpoint may still be unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CustomSelection {
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
}

impl CustomSelection {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        match (from, to) {
            (Some(a), Some(b)) if a > b => Self {
                from: Some(b),
                to: Some(a),
            },
            _ => Self { from, to },
        }
    }

    pub fn from(&self) -> Option<NaiveDate> {
        self.from
    }

    pub fn to(&self) -> Option<NaiveDate> {
        self.to
    }

    pub fn is_empty(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    /// Both endpoints, once the user has picked them.
    pub fn complete(&self) -> Option<(NaiveDate, NaiveDate)> {
        self.from.zip(self.to)
    }
}

/// Filter state held by the dashboard. The custom selection survives
/// switching to another preset and back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FilterState {
    pub preset: Preset,
    pub custom: CustomSelection,
    pub day: Option<NaiveDate>,
}

impl FilterState {
    pub fn new(preset: Preset) -> Self {
        Self {
            preset,
            custom: CustomSelection::default(),
            day: None,
        }
    }
}

impl Default for FilterState {
    fn default() -> Self {
        Self::new(Preset::Day)
    }
}
