//! Risk levels and the precipitation/wind risk analyzer.
//!
//! Scoring is a pure function of the peak precipitation and peak wind a trip
//! would encounter. Each factor is bucketed into low/medium/high against
//! configurable thresholds, then combined.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Overall risk of a trip, totally ordered `Low < Medium < High`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Ordinal used for sorting: 0, 1, 2
    pub fn ordinal(&self) -> u8 {
        *self as u8
    }

    /// Level for a window whose forecast coverage is too thin to trust.
    ///
    /// Only `Low` is raised; missing data never makes a known risk worse.
    pub fn escalate(self) -> RiskLevel {
        match self {
            RiskLevel::Low => RiskLevel::Medium,
            level => level,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What drives a trip's risk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFactor {
    Precipitation,
    Wind,
    /// Both factors are elevated at once
    Combined,
}

impl RiskFactor {
    pub fn label(&self) -> &'static str {
        match self {
            RiskFactor::Precipitation => "precipitation",
            RiskFactor::Wind => "wind",
            RiskFactor::Combined => "rain and wind",
        }
    }
}

/// Thresholds (exclusive) separating the risk buckets
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskThresholds {
    /// mm/h above which precipitation is high risk
    pub precip_high: f64,
    /// mm/h above which precipitation is medium risk
    pub precip_medium: f64,
    /// km/h above which wind is high risk
    pub wind_high: f64,
    /// km/h above which wind is medium risk
    pub wind_medium: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            precip_high: 2.0,
            precip_medium: 0.5,
            wind_high: 50.0,
            wind_medium: 25.0,
        }
    }
}

/// Output of [`RiskAnalyzer::analyze`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub primary_factor: RiskFactor,
}

/// Turns peak precipitation and wind into a risk level
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskAnalyzer {
    thresholds: RiskThresholds,
}

impl RiskAnalyzer {
    pub fn new(thresholds: RiskThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &RiskThresholds {
        &self.thresholds
    }

    /// Bucket a precipitation intensity (mm/h)
    pub fn precipitation_level(&self, max_precip: f64) -> RiskLevel {
        bucket(max_precip, self.thresholds.precip_medium, self.thresholds.precip_high)
    }

    /// Bucket a wind speed (km/h)
    pub fn wind_level(&self, max_wind: f64) -> RiskLevel {
        bucket(max_wind, self.thresholds.wind_medium, self.thresholds.wind_high)
    }

    /// Score a trip from its peak precipitation and wind.
    ///
    /// The overall level is the higher of the two factors, except that two
    /// factors at medium or above amplify to high with `Combined` as the cause.
    /// Ties between factors are attributed to precipitation.
    pub fn analyze(&self, max_precip: f64, max_wind: f64) -> RiskAssessment {
        let precip = self.precipitation_level(max_precip);
        let wind = self.wind_level(max_wind);

        if precip >= RiskLevel::Medium && wind >= RiskLevel::Medium {
            return RiskAssessment {
                level: RiskLevel::High,
                primary_factor: RiskFactor::Combined,
            };
        }

        if wind > precip {
            RiskAssessment {
                level: wind,
                primary_factor: RiskFactor::Wind,
            }
        } else {
            RiskAssessment {
                level: precip,
                primary_factor: RiskFactor::Precipitation,
            }
        }
    }
}

fn bucket(value: f64, medium: f64, high: f64) -> RiskLevel {
    if value > high {
        RiskLevel::High
    } else if value > medium {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}
