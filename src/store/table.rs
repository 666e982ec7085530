//! table.rs
//! Read-only columnar store of loaded series with an inverted dimension index.

use super::error::StoreError;
use super::source::{SeriesSource, SourceDescriptor};
use super::types::{DateRange, Dimensions, Series, SeriesId};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct SeriesStore {
    // Columnar Arrays
    ids: Vec<SeriesId>,
    series: Vec<Arc<Series>>,

    // Lookups (rebuilt on every insert, never mutated after load)
    by_id: HashMap<SeriesId, u32>,
    // (dimension, value) -> ascending row indices
    postings: HashMap<(String, String), Vec<u32>>,
}

impl SeriesStore {
    pub fn new() -> Self { Self::default() }
    pub fn count(&self) -> usize { self.ids.len() }

    /// Builds a store from already-validated series, rejecting duplicate ids.
    pub fn from_series(series: impl IntoIterator<Item = Series>) -> Result<Self, StoreError> {
        let mut store = Self::new();
        for s in series {
            store.push(s)?;
        }
        Ok(store)
    }

    /// Loads every descriptor from the ingestion collaborator. The first series
    /// that violates an invariant aborts the load; nothing partial is returned.
    pub fn load(source: &dyn SeriesSource, descriptors: &[SourceDescriptor]) -> Result<Self, StoreError> {
        let mut store = Self::new();
        for descriptor in descriptors {
            let raw = source.load(descriptor)?;
            tracing::debug!(source = %descriptor.name, count = raw.len(), "loading series");
            for mut r in raw {
                for (k, v) in &descriptor.dimensions {
                    r.dimensions.entry(k.clone()).or_insert_with(|| v.clone());
                }
                store.push(Series::try_from(r)?)?;
            }
        }
        tracing::info!(series = store.count(), "series store loaded");
        Ok(store)
    }

    fn push(&mut self, series: Series) -> Result<(), StoreError> {
        if self.by_id.contains_key(series.id()) {
            return Err(StoreError::DuplicateSeries(series.id().clone()));
        }
        let row = self.ids.len() as u32;

        for (k, v) in series.dimensions() {
            self.postings.entry((k.clone(), v.clone())).or_default().push(row);
        }
        self.by_id.insert(series.id().clone(), row);
        self.ids.push(series.id().clone());
        self.series.push(Arc::new(series));
        Ok(())
    }

    pub fn get(&self, id: &SeriesId) -> Result<Arc<Series>, StoreError> {
        self.by_id
            .get(id)
            .map(|&row| Arc::clone(&self.series[row as usize]))
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    pub fn contains(&self, id: &SeriesId) -> bool { self.by_id.contains_key(id) }

    pub fn ids(&self) -> &[SeriesId] { &self.ids }

    /// Every series whose dimensions contain all `criteria`, ordered by id.
    pub fn select(&self, criteria: &Dimensions) -> Vec<Arc<Series>> {
        let mut rows: Option<Vec<u32>> = None;
        for (k, v) in criteria {
            let Some(posting) = self.postings.get(&(k.clone(), v.clone())) else {
                return Vec::new();
            };
            rows = Some(match rows {
                None => posting.clone(),
                Some(acc) => intersect_sorted(&acc, posting),
            });
        }

        let rows = rows.unwrap_or_else(|| (0..self.ids.len() as u32).collect());
        let mut out: Vec<Arc<Series>> = rows.into_iter().map(|r| Arc::clone(&self.series[r as usize])).collect();
        out.sort_by(|a, b| a.id().cmp(b.id()));
        out
    }

    /// Distinct values of one dimension across the store.
    pub fn dimension_values(&self, name: &str) -> BTreeSet<String> {
        self.postings
            .keys()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
            .collect()
    }
}

/// Restricts `series` to `range` (inclusive), keeping the gap structure of the
/// original. Identity and dimensions are preserved.
pub fn slice(series: &Series, range: &DateRange) -> Result<Series, StoreError> {
    if range.is_inverted() {
        return Err(StoreError::InvalidRange { start: range.start, end: range.end });
    }
    let ts = series.timestamps();
    let lo = ts.partition_point(|t| *t < range.start);
    let hi = ts.partition_point(|t| *t <= range.end);

    Ok(Series::from_parts_unchecked(
        series.id().clone(),
        series.dimensions().clone(),
        ts[lo..hi].to_vec(),
        series.values()[lo..hi].to_vec(),
    ))
}

fn intersect_sorted(a: &[u32], b: &[u32]) -> Vec<u32> {
    let (mut i, mut j) = (0, 0);
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::source::MemorySource;
    use crate::store::types::{dims, RawSeries, Timestamp};
    use chrono::NaiveDate;

    fn d(y: i32, m: u32) -> Timestamp { NaiveDate::from_ymd_opt(y, m, 1).unwrap() }

    fn make(id: &str, region: &str, scenario: &str) -> Series {
        let mut dm = Dimensions::new();
        dm.insert(dims::VARIABLE.into(), "siextentn".into());
        dm.insert(dims::REGION.into(), region.into());
        dm.insert(dims::SCENARIO.into(), scenario.into());
        Series::new(id, dm, vec![d(2000, 1), d(2000, 3), d(2000, 4)], vec![Some(1.0), None, Some(3.0)]).unwrap()
    }

    #[test]
    fn test_get_unknown_is_not_found() {
        let store = SeriesStore::from_series(vec![make("a", "nh", "ssp126")]).unwrap();
        assert!(store.get(&"a".into()).is_ok());
        assert_eq!(store.get(&"zz".into()).unwrap_err(), StoreError::NotFound("zz".into()));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = SeriesStore::from_series(vec![make("a", "nh", "x"), make("a", "sh", "x")]).unwrap_err();
        assert_eq!(err, StoreError::DuplicateSeries("a".into()));
    }

    #[test]
    fn test_select_intersects_dimensions() {
        let store = SeriesStore::from_series(vec![
            make("c", "sh", "ssp126"),
            make("a", "nh", "ssp126"),
            make("b", "nh", "ssp585"),
        ])
        .unwrap();

        let mut crit = Dimensions::new();
        crit.insert(dims::SCENARIO.into(), "ssp126".into());
        let ids: Vec<_> = store.select(&crit).iter().map(|s| s.id().0.clone()).collect();
        assert_eq!(ids, vec!["a", "c"]);

        crit.insert(dims::REGION.into(), "nh".into());
        assert_eq!(store.select(&crit).len(), 1);

        crit.insert(dims::REGION.into(), "antarctic".into());
        assert!(store.select(&crit).is_empty());

        assert_eq!(store.dimension_values(dims::REGION).into_iter().collect::<Vec<_>>(), vec!["nh", "sh"]);
    }

    #[test]
    fn test_slice_is_inclusive_and_keeps_gaps() {
        let s = make("a", "nh", "x");
        let r = DateRange { start: d(2000, 2), end: d(2000, 4) };
        let out = slice(&s, &r).unwrap();
        assert_eq!(out.timestamps(), &[d(2000, 3), d(2000, 4)]);
        assert_eq!(out.values(), &[None, Some(3.0)]);

        let inverted = DateRange { start: d(2001, 1), end: d(2000, 1) };
        assert!(matches!(slice(&s, &inverted), Err(StoreError::InvalidRange { .. })));

        let empty = DateRange { start: d(1990, 1), end: d(1990, 12) };
        assert!(slice(&s, &empty).unwrap().is_empty());
    }

    #[test]
    fn test_load_rejects_malformed_at_boundary() {
        let mut src = MemorySource::new();
        src.insert("good", vec![RawSeries {
            id: "obs".into(),
            dimensions: Dimensions::new(),
            timestamps: vec![d(2000, 1)],
            values: vec![Some(1.0)],
        }]);
        src.insert("bad", vec![RawSeries {
            id: "broken".into(),
            dimensions: Dimensions::new(),
            timestamps: vec![d(2000, 1), d(2000, 2)],
            values: vec![Some(1.0)],
        }]);

        let good = SourceDescriptor::new("osisaf", "good").with_dimension(dims::SOURCE, "osisaf");
        let store = SeriesStore::load(&src, &[good.clone()]).unwrap();
        assert_eq!(store.get(&"obs".into()).unwrap().dimension(dims::SOURCE), Some("osisaf"));

        let bad = SourceDescriptor::new("model", "bad");
        let err = SeriesStore::load(&src, &[good, bad]).unwrap_err();
        assert!(matches!(err, StoreError::MalformedSeries { ref id, .. } if id.as_str() == "broken"));
    }
}
