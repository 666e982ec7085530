//! kernel.rs
//! The numeric core of the built-in indicators. Every kernel is a pure
//! function of validated input series; missing values are `None` throughout.

use super::error::IndicatorError;
use crate::store::{dims, DateRange, Dimensions, Series, SeriesId, Timestamp};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

const DAYS_PER_YEAR: f64 = 365.25;

/// Which part of the series the anomaly is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Baseline {
    /// The first `n` timestamps of the series.
    Leading(usize),
    /// Every timestamp inside the range (inclusive).
    Range(DateRange),
}

/// `value[t] - mean(baseline)`. Missing inputs stay missing; an all-missing
/// baseline makes every output missing.
pub fn anomaly(series: &Series, baseline: Baseline) -> Series {
    let (sum, count) = series
        .iter()
        .enumerate()
        .filter(|(i, (t, _))| match baseline {
            Baseline::Leading(n) => *i < n,
            Baseline::Range(r) => r.contains(*t),
        })
        .filter_map(|(_, (_, v))| v)
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));

    let values = if count == 0 {
        vec![None; series.len()]
    } else {
        let mean = sum / count as f64;
        series.values().iter().map(|v| v.map(|x| x - mean)).collect()
    };
    rebuild(series, values)
}

/// Least-squares slope (units per year) over a trailing, right-aligned window
/// of `window` timestamps. Windows with fewer than two observations yield missing.
pub fn rolling_trend(series: &Series, window: usize) -> Series {
    let ts = series.timestamps();
    let vs = series.values();
    let mut out = Vec::with_capacity(series.len());

    for i in 0..series.len() {
        let lo = (i + 1).saturating_sub(window);
        out.push(slope(&ts[lo..=i], &vs[lo..=i]));
    }
    rebuild(series, out)
}

fn slope(ts: &[Timestamp], vs: &[Option<f64>]) -> Option<f64> {
    let origin = *ts.first()?;
    let points: Vec<(f64, f64)> = ts
        .iter()
        .zip(vs)
        .filter_map(|(t, v)| v.map(|y| ((*t - origin).num_days() as f64 / DAYS_PER_YEAR, y)))
        .collect();
    if points.len() < 2 {
        return None;
    }

    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;
    let (sxy, sxx) = points.iter().fold((0.0, 0.0), |(sxy, sxx), (x, y)| {
        let dx = x - mean_x;
        (sxy + dx * (y - mean_y), sxx + dx * dx)
    });
    if sxx == 0.0 {
        return None;
    }
    Some(sxy / sxx)
}

/// Mean across contributors at every timestamp present in at least one of them.
/// Missing contributors are skipped; a timestamp with none left is missing.
pub fn regional_mean(inputs: &[Arc<Series>]) -> Result<Series, IndicatorError> {
    let Some(first) = inputs.first() else {
        return Err(IndicatorError::Arity { operation: "regional_mean", expected: "at least 1", actual: 0 });
    };

    let mut acc: BTreeMap<Timestamp, (f64, usize)> = BTreeMap::new();
    for s in inputs {
        for (t, v) in s.iter() {
            let slot = acc.entry(t).or_insert((0.0, 0));
            if let Some(x) = v {
                slot.0 += x;
                slot.1 += 1;
            }
        }
    }

    // Keep only the dimensions every contributor agrees on.
    let mut common: Dimensions = first.dimensions().clone();
    common.retain(|k, v| inputs.iter().all(|s| s.dimension(k) == Some(v.as_str())));
    common.remove(dims::REGION);

    let (timestamps, values) = acc
        .into_iter()
        .map(|(t, (sum, n))| (t, if n == 0 { None } else { Some(sum / n as f64) }))
        .unzip();

    Ok(Series::from_parts_unchecked(SeriesId::new("regional_mean"), common, timestamps, values))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Season {
    DJF,
    MAM,
    JJA,
    SON,
}

impl Season {
    pub const ALL: [Season; 4] = [Season::DJF, Season::MAM, Season::JJA, Season::SON];

    pub fn months(&self) -> [u32; 3] {
        match self {
            Season::DJF => [12, 1, 2],
            Season::MAM => [3, 4, 5],
            Season::JJA => [6, 7, 8],
            Season::SON => [9, 10, 11],
        }
    }

    pub fn contains(&self, month: u32) -> bool { self.months().contains(&month) }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:?}", self) }
}

impl FromStr for Season {
    type Err = IndicatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DJF" => Ok(Season::DJF),
            "MAM" => Ok(Season::MAM),
            "JJA" => Ok(Season::JJA),
            "SON" => Ok(Season::SON),
            _ => Err(IndicatorError::InvalidParameter {
                name: "season".into(),
                reason: format!("'{}' is not one of DJF, MAM, JJA, SON", s),
            }),
        }
    }
}

/// Per calendar year, the mean of the observations falling in `season`'s
/// months. Each point is stamped on the first day of the season's first month
/// of that year. Years whose season values are all missing yield missing.
pub fn seasonal_mean(series: &Series, season: Season) -> Series {
    let mut years: BTreeMap<i32, (f64, usize)> = BTreeMap::new();
    for (t, v) in series.iter().filter(|(t, _)| season.contains(t.month())) {
        let slot = years.entry(t.year()).or_insert((0.0, 0));
        if let Some(x) = v {
            slot.0 += x;
            slot.1 += 1;
        }
    }

    let first_month = season.months()[0];
    let (timestamps, values) = years
        .into_iter()
        .filter_map(|(year, (sum, n))| {
            let stamp = NaiveDate::from_ymd_opt(year, first_month, 1)?;
            Some((stamp, if n == 0 { None } else { Some(sum / n as f64) }))
        })
        .unzip();

    Series::from_parts_unchecked(series.id().clone(), series.dimensions().clone(), timestamps, values)
}

/// A constant `mean + k * std` line over the input's timestamps, with the
/// sample standard deviation (`n - 1`). Fewer than two observations yield missing.
pub fn spread_band(series: &Series, k: f64) -> Series {
    let observed: Vec<f64> = series.values().iter().flatten().copied().collect();
    let level = if observed.len() < 2 {
        None
    } else {
        let n = observed.len() as f64;
        let mean = observed.iter().sum::<f64>() / n;
        let var = observed.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
        Some(mean + k * var.sqrt())
    };
    rebuild(series, vec![level; series.len()])
}

fn rebuild(series: &Series, values: Vec<Option<f64>>) -> Series {
    Series::from_parts_unchecked(
        series.id().clone(),
        series.dimensions().clone(),
        series.timestamps().to_vec(),
        values,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ymd(y: i32, m: u32, d: u32) -> Timestamp { NaiveDate::from_ymd_opt(y, m, d).unwrap() }

    /// Yearly points starting 2000-01-01.
    fn yearly(id: &str, region: &str, values: &[Option<f64>]) -> Series {
        let ts = (0..values.len()).map(|i| ymd(2000 + i as i32, 1, 1)).collect();
        let mut d = Dimensions::new();
        d.insert(dims::REGION.into(), region.into());
        d.insert(dims::SCENARIO.into(), "ssp126".into());
        Series::new(id, d, ts, values.to_vec()).unwrap()
    }

    fn close(a: Option<f64>, b: f64) -> bool { a.map_or(false, |a| (a - b).abs() < 1e-9) }

    #[test]
    fn test_anomaly_skips_missing_baseline_entries() {
        // t: [1,2,3,4], v: [1, missing, 3, 4], baseline = first two timestamps.
        let s = yearly("a", "nh", &[Some(1.0), None, Some(3.0), Some(4.0)]);
        let out = anomaly(&s, Baseline::Leading(2));
        assert_eq!(out.values(), &[Some(0.0), None, Some(2.0), Some(3.0)]);

        let by_range = anomaly(&s, Baseline::Range(DateRange { start: ymd(2000, 1, 1), end: ymd(2001, 1, 1) }));
        assert_eq!(by_range.values(), out.values());
    }

    #[test]
    fn test_anomaly_all_missing_baseline() {
        let s = yearly("a", "nh", &[None, None, Some(3.0)]);
        let out = anomaly(&s, Baseline::Leading(2));
        assert_eq!(out.values(), &[None, None, None]);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_rolling_trend_linear_series() {
        let s = yearly("a", "nh", &[Some(0.0), Some(2.0), Some(4.0), Some(6.0)]);
        let out = rolling_trend(&s, 3);
        assert_eq!(out.len(), 4);
        assert_eq!(out.values()[0], None);
        // One leap year in the first window shifts the slope slightly off 2.0.
        for v in &out.values()[1..] {
            assert!((v.unwrap() - 2.0).abs() < 0.01, "{:?}", v);
        }
    }

    #[test]
    fn test_rolling_trend_partial_windows_need_two_points() {
        let s = yearly("a", "nh", &[None, Some(1.0), None, Some(3.0), None]);
        let out = rolling_trend(&s, 2);
        assert_eq!(out.values(), &[None, None, None, None, None]);

        let wide = rolling_trend(&s, 3);
        assert_eq!(wide.values()[..3], [None, None, None]);
        assert!(wide.values()[3].is_some());
        assert!(wide.values()[4].is_none());
    }

    #[test]
    fn test_regional_mean_disjoint_missing() {
        let a = Arc::new(yearly("a", "nh", &[Some(1.0), None, Some(5.0)]));
        let b = Arc::new(yearly("b", "sh", &[Some(3.0), Some(7.0), None]));
        let out = regional_mean(&[a, b]).unwrap();
        assert_eq!(out.values(), &[Some(2.0), Some(7.0), Some(5.0)]);
        assert_eq!(out.dimension(dims::REGION), None);
        assert_eq!(out.dimension(dims::SCENARIO), Some("ssp126"));
    }

    #[test]
    fn test_regional_mean_union_of_timestamps() {
        let a = Arc::new(Series::new("a", Dimensions::new(), vec![ymd(2000, 1, 1)], vec![Some(1.0)]).unwrap());
        let b = Arc::new(Series::new("b", Dimensions::new(), vec![ymd(2000, 2, 1)], vec![None]).unwrap());
        let out = regional_mean(&[a, b]).unwrap();
        assert_eq!(out.timestamps(), &[ymd(2000, 1, 1), ymd(2000, 2, 1)]);
        assert_eq!(out.values(), &[Some(1.0), None]);

        assert!(regional_mean(&[]).is_err());
    }

    #[test]
    fn test_seasonal_mean_groups_by_calendar_year() {
        let ts = vec![ymd(2000, 1, 1), ymd(2000, 2, 1), ymd(2000, 6, 1), ymd(2000, 12, 1), ymd(2001, 1, 1)];
        let s = Series::new("m", Dimensions::new(), ts, vec![Some(1.0), Some(2.0), Some(9.0), Some(3.0), None]).unwrap();

        let djf = seasonal_mean(&s, Season::DJF);
        assert_eq!(djf.timestamps(), &[ymd(2000, 12, 1), ymd(2001, 12, 1)]);
        assert!(close(djf.values()[0], 2.0));
        assert_eq!(djf.values()[1], None);

        let jja = seasonal_mean(&s, Season::JJA);
        assert_eq!(jja.timestamps(), &[ymd(2000, 6, 1)]);
        assert_eq!(jja.values(), &[Some(9.0)]);

        assert!(seasonal_mean(&s, Season::SON).is_empty());
    }

    #[test]
    fn test_season_parse() {
        assert_eq!("jja".parse::<Season>().unwrap(), Season::JJA);
        assert!("winter".parse::<Season>().is_err());
    }

    #[test]
    fn test_spread_band_uses_sample_std() {
        let s = yearly("a", "nh", &[Some(2.0), Some(4.0), None, Some(6.0)]);
        // mean 4, sample std 2
        let upper = spread_band(&s, 1.0);
        let lower = spread_band(&s, -1.0);
        assert!(upper.values().iter().all(|v| close(*v, 6.0)));
        assert!(lower.values().iter().all(|v| close(*v, 2.0)));

        let thin = yearly("b", "nh", &[Some(2.0), None]);
        assert_eq!(spread_band(&thin, 1.0).values(), &[None, None]);
    }

    proptest! {
        #[test]
        fn prop_anomaly_preserves_length_and_missing(
            raw in proptest::collection::vec(proptest::option::of(-1e6f64..1e6), 0..60),
            n in 0usize..10,
        ) {
            let s = yearly("p", "nh", &raw);
            let out = anomaly(&s, Baseline::Leading(n));
            prop_assert_eq!(out.len(), s.len());
            let baseline_empty = raw.iter().take(n).all(|v| v.is_none());
            for (i, v) in out.values().iter().enumerate() {
                if raw[i].is_none() || baseline_empty {
                    prop_assert!(v.is_none());
                } else {
                    prop_assert!(v.is_some());
                }
            }
        }

        #[test]
        fn prop_rolling_trend_length(
            raw in proptest::collection::vec(proptest::option::of(-100f64..100.0), 0..40),
            w in 1usize..8,
        ) {
            let s = yearly("p", "nh", &raw);
            let out = rolling_trend(&s, w);
            prop_assert_eq!(out.len(), raw.len());
            for i in 0..raw.len() {
                let lo = (i + 1).saturating_sub(w);
                let observed = raw[lo..=i].iter().filter(|v| v.is_some()).count();
                prop_assert_eq!(out.values()[i].is_some(), observed >= 2);
            }
        }
    }
}
