use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Coarse time-of-day bucket used to scale the per-km rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimeBand {
    Normal,
    Rush,
    Evening,
    EarlyMorning,
}

impl TimeBand {
    pub const ALL: [TimeBand; 4] = [
        TimeBand::Normal,
        TimeBand::Rush,
        TimeBand::Evening,
        TimeBand::EarlyMorning,
    ];

    /// Band for a pickup time, evaluated in UTC.
    ///
    /// 00:00-05:59 early morning, 07:00-09:59 and 17:00-19:59 rush,
    /// 20:00-23:59 evening, everything else normal.
    pub fn for_time(time: DateTime<Utc>) -> Self {
        match time.hour() {
            0..=5 => TimeBand::EarlyMorning,
            7..=9 | 17..=19 => TimeBand::Rush,
            20..=23 => TimeBand::Evening,
            _ => TimeBand::Normal,
        }
    }
}

/// Business constants for pricing. Loaded from the environment in production.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FareTable {
    pub normal: f64,
    pub rush: f64,
    pub evening: f64,
    pub early_morning: f64,
    pub service_fee: f64,
    pub tip_rate: f64,
}

impl Default for FareTable {
    fn default() -> Self {
        Self {
            normal: 0.7,
            rush: 1.3,
            evening: 0.5,
            early_morning: 0.5,
            service_fee: 2.0,
            tip_rate: 0.05,
        }
    }
}

impl FareTable {
    pub fn multiplier(&self, band: TimeBand) -> f64 {
        match band {
            TimeBand::Normal => self.normal,
            TimeBand::Rush => self.rush,
            TimeBand::Evening => self.evening,
            TimeBand::EarlyMorning => self.early_morning,
        }
    }

    /// Price a trip. Values are unrounded; call [`FareQuote::rounded`] for presentation.
    pub fn estimate(&self, distance_km: f64, rate_per_km: f64, band: TimeBand) -> AppResult<FareQuote> {
        if !distance_km.is_finite() || distance_km < 0.0 {
            return Err(AppError::Validation(format!(
                "Distance must be a non-negative number, got {}",
                distance_km
            )));
        }
        if !rate_per_km.is_finite() || rate_per_km < 0.0 {
            return Err(AppError::Validation(format!(
                "Rate per km must be a non-negative number, got {}",
                rate_per_km
            )));
        }

        let adjusted_rate = (rate_per_km / 10.0) * self.multiplier(band);
        let base_cost = distance_km * adjusted_rate;
        let tip = base_cost * self.tip_rate;
        let total = base_cost + self.service_fee + tip;

        Ok(FareQuote {
            band,
            adjusted_rate,
            base_cost,
            service_fee: self.service_fee,
            tip,
            total,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FareQuote {
    pub band: TimeBand,
    pub adjusted_rate: f64,
    pub base_cost: f64,
    pub service_fee: f64,
    pub tip: f64,
    pub total: f64,
}

impl FareQuote {
    pub fn rounded(&self) -> Self {
        Self {
            band: self.band,
            adjusted_rate: round_money(self.adjusted_rate),
            base_cost: round_money(self.base_cost),
            service_fee: round_money(self.service_fee),
            tip: round_money(self.tip),
            total: round_money(self.total),
        }
    }
}

pub fn round_money(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
