//! fixtures.rs
//! Synthetic model and observation series shared by tests.

use crate::store::{dims, Dimensions, Series, SeriesStore};
use chrono::NaiveDate;

pub const REGIONS: [&str; 2] = ["nh", "sh"];
pub const SCENARIOS: [&str; 2] = ["ssp126", "ssp585"];
pub const MODELS: [&str; 2] = ["NorESM2-LM_sea_ice", "CanESM5_sea_ice"];
pub const FIRST_YEAR: i32 = 2000;
pub const YEARS: i32 = 4;

pub fn month(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).unwrap()
}

fn monthly(id: String, dimensions: Dimensions, level: f64) -> Series {
    let mut timestamps = Vec::new();
    let mut values = Vec::new();
    for y in FIRST_YEAR..FIRST_YEAR + YEARS {
        for m in 1..=12u32 {
            let i = timestamps.len() as f64;
            timestamps.push(month(y, m));
            values.push(Some(level - 0.01 * i + (m as f64 - 6.5).abs() * 0.3));
        }
    }
    Series::new(id, dimensions, timestamps, values).unwrap()
}

/// Two regions, two scenarios and two models for `siextentn` and `siarean`,
/// plus observed `sia` per region.
pub fn sample_store() -> SeriesStore {
    let mut all = Vec::new();
    for (v, variable) in ["siextentn", "siarean"].iter().enumerate() {
        for (r, region) in REGIONS.iter().enumerate() {
            for (s, scenario) in SCENARIOS.iter().enumerate() {
                for (m, model) in MODELS.iter().enumerate() {
                    let mut d = Dimensions::new();
                    d.insert(dims::VARIABLE.into(), variable.to_string());
                    d.insert(dims::REGION.into(), region.to_string());
                    d.insert(dims::SCENARIO.into(), scenario.to_string());
                    d.insert(dims::MODEL.into(), model.to_string());
                    d.insert(dims::SOURCE.into(), "cmip6".into());
                    let level = 12.0 - 2.0 * v as f64 + 2.0 * r as f64 - 0.5 * s as f64 + 0.2 * m as f64;
                    all.push(monthly(format!("{}_{}_{}_{}", variable, region, scenario, model), d, level));
                }
            }
        }
    }
    for (r, region) in REGIONS.iter().enumerate() {
        let mut d = Dimensions::new();
        d.insert(dims::VARIABLE.into(), "sia".into());
        d.insert(dims::REGION.into(), region.to_string());
        d.insert(dims::SOURCE.into(), "osisaf".into());
        all.push(monthly(format!("sia_{}", region), d, 9.0 + r as f64));
    }
    SeriesStore::from_series(all).unwrap()
}
