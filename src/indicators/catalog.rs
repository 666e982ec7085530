//! catalog.rs
//! The standard sea-ice indicator set.
//!
//! Base indicators average the model runs matching the filter's region and
//! scenario. Each base gets anomaly, trend, seasonal and spread-band
//! derivatives plus date-windowed frames for plotting.
//!
//! Model-based indicators take a `model` parameter. Empty selects the
//! ensemble mean; a model name selects that model's run alone. Derived
//! indicators pass it down to their inputs.

use super::definition::{IndicatorDefinition, InputRef, Operation, SeriesSelector};
use super::error::RegistryError;
use super::registry::IndicatorRegistry;
use crate::config::EngineConfig;
use crate::filter::Dimension;
use crate::store::dims;

/// `(indicator, store variable)` for the model ensembles.
pub const MODEL_VARIABLES: [(&str, &str); 2] = [("sea_ice_area", "siarean"), ("sea_ice_extent", "siextentn")];

pub const OBSERVED_AREA: &str = "observed_area";
pub const OBSERVED_VARIABLE: &str = "sia";
pub const OBSERVED_SOURCE: &str = "osisaf";
pub const EXTENT_ALL_REGIONS: &str = "sea_ice_extent_all_regions";
/// Parameter value selecting the ensemble mean.
pub const ENSEMBLE: &str = "";

pub fn standard_registry(config: &EngineConfig) -> Result<IndicatorRegistry, RegistryError> {
    let mut registry = IndicatorRegistry::new();
    register_standard(&mut registry, config)?;
    Ok(registry)
}

pub fn register_standard(registry: &mut IndicatorRegistry, config: &EngineConfig) -> Result<(), RegistryError> {
    for (name, variable) in MODEL_VARIABLES {
        let selector = SeriesSelector::variable(variable)
            .bind(Dimension::Region)
            .bind(Dimension::Scenario)
            .by_param(dims::MODEL);
        registry.register(
            IndicatorDefinition::new(name, Operation::RegionalMean)
                .input(InputRef::Selection(selector))
                .param(dims::MODEL, ENSEMBLE)
                .describe(format!("ensemble mean of {}, or one model's run", variable)),
        )?;
        register_derived(registry, name, config, true)?;
    }

    let observed = SeriesSelector::variable(OBSERVED_VARIABLE)
        .with(dims::SOURCE, OBSERVED_SOURCE)
        .bind(Dimension::Region);
    registry.register(
        IndicatorDefinition::new(OBSERVED_AREA, Operation::Identity)
            .input(InputRef::Selection(observed))
            .describe("observed sea-ice area"),
    )?;
    register_derived(registry, OBSERVED_AREA, config, false)?;

    let all_regions = SeriesSelector::variable("siextentn").bind(Dimension::Scenario);
    registry.register(
        IndicatorDefinition::new(EXTENT_ALL_REGIONS, Operation::RegionalMean)
            .input(InputRef::Selection(all_regions))
            .describe("extent averaged over every region and model"),
    )?;
    registry.register(frame(EXTENT_ALL_REGIONS))?;

    Ok(())
}

fn register_derived(
    registry: &mut IndicatorRegistry,
    base: &str,
    config: &EngineConfig,
    per_model: bool,
) -> Result<(), RegistryError> {
    let anomaly = format!("{}_anomaly", base);
    let seasonal = format!("{}_seasonal", base);

    let defs = [
        IndicatorDefinition::new(anomaly.as_str(), Operation::Anomaly)
            .input(InputRef::indicator(base))
            .param("baseline_window", config.baseline_window),
        IndicatorDefinition::new(format!("{}_trend", base), Operation::RollingTrend)
            .input(InputRef::indicator(anomaly.as_str()))
            .param("window", config.rolling_window),
        IndicatorDefinition::new(seasonal.as_str(), Operation::SeasonalMean).input(InputRef::indicator(base)),
        IndicatorDefinition::new(format!("{}_upper", base), Operation::SpreadBand)
            .input(InputRef::indicator(seasonal.as_str()))
            .param("k", 1.0),
        IndicatorDefinition::new(format!("{}_lower", base), Operation::SpreadBand)
            .input(InputRef::indicator(seasonal.as_str()))
            .param("k", -1.0),
        frame(base),
        frame(&anomaly),
        frame(&seasonal),
    ];
    for def in defs {
        registry.register(if per_model { with_model(def) } else { def })?;
    }
    Ok(())
}

fn with_model(def: IndicatorDefinition) -> IndicatorDefinition {
    def.param(dims::MODEL, ENSEMBLE).forward(dims::MODEL)
}

/// The date-windowed view of `input`.
fn frame(input: &str) -> IndicatorDefinition {
    IndicatorDefinition::new(format!("{}_view", input), Operation::DateWindow).input(InputRef::indicator(input))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::{ComputationGraph, NodeKey};
    use crate::filter::FilterState;
    use crate::fixtures::{month, sample_store, MODELS};
    use crate::indicators::Params;
    use crate::store::DateRange;
    use std::sync::Arc;

    #[test]
    fn test_standard_registry_builds() {
        let config = EngineConfig { baseline_window: 12, ..EngineConfig::default() };
        let reg = standard_registry(&config).unwrap();

        for name in ["sea_ice_extent_anomaly_view", "observed_area_trend", "sea_ice_area_upper", EXTENT_ALL_REGIONS] {
            assert!(reg.contains(name), "missing {}", name);
        }

        let anomaly = reg.resolve("sea_ice_area_anomaly", &Params::new()).unwrap();
        assert_eq!(anomaly.params.int("baseline_window").unwrap(), 12);
    }

    #[test]
    fn test_registering_twice_fails() {
        let config = EngineConfig::default();
        let mut reg = standard_registry(&config).unwrap();
        assert!(matches!(register_standard(&mut reg, &config), Err(RegistryError::DuplicateName(_))));
    }

    #[test]
    fn test_model_parameter_selects_one_run() {
        let registry = Arc::new(standard_registry(&EngineConfig::default()).unwrap());
        let range = DateRange { start: month(2000, 1), end: month(2003, 12) };
        let filter = Arc::new(FilterState::initial("nh", "ssp126", range));
        let graph = ComputationGraph::new(Arc::new(sample_store()), registry, filter);

        let view = "sea_ice_extent_view";
        let keys: Vec<NodeKey> =
            MODELS.iter().map(|m| graph.ensure(view, &Params::new().with(dims::MODEL, *m)).unwrap()).collect();
        let ensemble_key = graph.ensure(view, &Params::new()).unwrap();
        assert_ne!(keys[0], keys[1]);
        assert_ne!(keys[0], ensemble_key);
        assert_eq!(graph.ensure(view, &Params::new().with(dims::MODEL, ENSEMBLE)).unwrap(), ensemble_key);

        let runs: Vec<_> = keys.iter().map(|k| graph.get(k).unwrap()).collect();
        let ensemble = graph.get(&ensemble_key).unwrap();
        assert_eq!(runs[0].dimension(dims::MODEL), Some(MODELS[0]));
        assert_eq!(runs[1].dimension(dims::MODEL), Some(MODELS[1]));
        assert_eq!(ensemble.dimension(dims::MODEL), None);
        assert_eq!(ensemble.len(), 48);
        for i in 0..ensemble.len() {
            let (a, b) = (runs[0].values()[i].unwrap(), runs[1].values()[i].unwrap());
            assert!((a - b).abs() > 0.1);
            assert!((ensemble.values()[i].unwrap() - (a + b) / 2.0).abs() < 1e-9);
        }

        // The base of a single-model view is shared with a direct request.
        let before = graph.node_count();
        graph.ensure("sea_ice_extent", &Params::new().with(dims::MODEL, MODELS[0])).unwrap();
        assert_eq!(graph.node_count(), before);
    }

    #[test]
    fn test_observed_area_has_no_model_parameter() {
        let reg = standard_registry(&EngineConfig::default()).unwrap();
        let err = reg.resolve("observed_area_trend", &Params::new().with(dims::MODEL, MODELS[0])).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownParameter { .. }));
    }
}
