//! definition.rs
//! Declarative indicator definitions.
//!
//! A definition names its inputs, the operation that combines them, and the
//! parameters the operation accepts. It holds no data; the computation graph
//! resolves inputs against the store and the current filter.

use super::error::{IndicatorError, RegistryError};
use super::kernel::{self, Baseline, Season};
use super::params::{ParamValue, Params};
use crate::filter::{Dimension, DimensionSet, FilterState};
use crate::store::{self, DateRange, Dimensions, Series, SeriesId};
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// Picks store series by fixed dimension values plus dimensions bound to the
/// current filter (e.g. `variable = siextentn` in the filter's region).
///
/// A store dimension named in `from_params` is matched against the text
/// parameter of the same name; an empty value leaves it unconstrained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesSelector {
    pub fixed: Dimensions,
    pub bind: DimensionSet,
    pub from_params: SmallVec<[String; 1]>,
}

impl SeriesSelector {
    pub fn new() -> Self {
        Self { fixed: Dimensions::new(), bind: DimensionSet::new(), from_params: SmallVec::new() }
    }

    pub fn variable(name: &str) -> Self { Self::new().with(store::dims::VARIABLE, name) }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.fixed.insert(key.to_string(), value.to_string());
        self
    }

    pub fn bind(mut self, dim: Dimension) -> Self {
        if !self.bind.contains(&dim) {
            self.bind.push(dim);
        }
        self
    }

    pub fn by_param(mut self, dim: &str) -> Self {
        if !self.from_params.iter().any(|d| d == dim) {
            self.from_params.push(dim.to_string());
        }
        self
    }

    /// The store criteria under `filter` for a node resolved with `params`.
    pub fn criteria(&self, filter: &FilterState, params: &Params) -> Dimensions {
        let mut out = self.fixed.clone();
        for dim in &self.from_params {
            if let Some(ParamValue::Text(value)) = params.get(dim) {
                if !value.is_empty() {
                    out.insert(dim.clone(), value.clone());
                }
            }
        }
        for dim in &self.bind {
            let key = match dim {
                Dimension::Region => store::dims::REGION,
                Dimension::Scenario => store::dims::SCENARIO,
                Dimension::DateRange | Dimension::Indicators => continue,
            };
            if let Some(value) = filter.binding(*dim) {
                out.insert(key.to_string(), value.to_string());
            }
        }
        out
    }
}

impl Default for SeriesSelector {
    fn default() -> Self { Self::new() }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputRef {
    /// A fixed series of the store.
    Series(SeriesId),
    /// Another indicator, with parameter overrides for it.
    Indicator { name: String, params: Params },
    /// All store series matching the selector under the current filter.
    Selection(SeriesSelector),
}

impl InputRef {
    pub fn indicator(name: impl Into<String>) -> Self {
        InputRef::Indicator { name: name.into(), params: Params::new() }
    }

    pub fn indicator_name(&self) -> Option<&str> {
        match self {
            InputRef::Indicator { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// What a compute function sees.
pub struct ComputeInput<'a> {
    pub inputs: &'a [Arc<Series>],
    pub params: &'a Params,
    pub filter: &'a FilterState,
}

type ComputeFnInner = dyn Fn(&ComputeInput<'_>) -> Result<Series, IndicatorError> + Send + Sync;

/// A user-supplied pure function.
#[derive(Clone)]
pub struct ComputeFn(Arc<ComputeFnInner>);

impl ComputeFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&ComputeInput<'_>) -> Result<Series, IndicatorError> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }
}

impl fmt::Debug for ComputeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("ComputeFn(..)") }
}

#[derive(Debug, Clone)]
pub enum Operation {
    /// Passes a single input through unchanged (base variables).
    Identity,
    Anomaly,
    RollingTrend,
    RegionalMean,
    SeasonalMean,
    SpreadBand,
    /// Restricts the input to the filter's date range; the view-ready frame.
    DateWindow,
    Custom(ComputeFn),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Identity => "identity",
            Operation::Anomaly => "anomaly",
            Operation::RollingTrend => "rolling_trend",
            Operation::RegionalMean => "regional_mean",
            Operation::SeasonalMean => "seasonal_mean",
            Operation::SpreadBand => "spread_band",
            Operation::DateWindow => "date_window",
            Operation::Custom(_) => "custom",
        }
    }

    /// Declared parameters and their defaults.
    pub fn default_params(&self) -> Params {
        match self {
            Operation::Anomaly => Params::new()
                .with("baseline_window", 30usize)
                .with("baseline_start", ParamValue::Unset)
                .with("baseline_end", ParamValue::Unset),
            Operation::RollingTrend => Params::new().with("window", 10usize),
            Operation::SeasonalMean => Params::new().with("season", "DJF"),
            Operation::SpreadBand => Params::new().with("k", 1.0),
            _ => Params::new(),
        }
    }

    /// Filter dimensions the operation itself reads.
    pub fn reads(&self) -> DimensionSet {
        match self {
            Operation::DateWindow => smallvec::smallvec![Dimension::DateRange],
            _ => DimensionSet::new(),
        }
    }

    pub fn evaluate(&self, input: &ComputeInput<'_>) -> Result<Series, IndicatorError> {
        match self {
            Operation::Identity => Ok(single(self, input.inputs)?.clone()),
            Operation::Anomaly => {
                let s = single(self, input.inputs)?;
                Ok(kernel::anomaly(s, baseline(input.params)?))
            }
            Operation::RollingTrend => {
                let s = single(self, input.inputs)?;
                let window = input.params.int("window")?;
                if window < 1 {
                    return Err(IndicatorError::InvalidParameter {
                        name: "window".into(),
                        reason: format!("must be at least 1, got {}", window),
                    });
                }
                Ok(kernel::rolling_trend(s, window as usize))
            }
            Operation::RegionalMean => kernel::regional_mean(input.inputs),
            Operation::SeasonalMean => {
                let s = single(self, input.inputs)?;
                let season: Season = input.params.text("season")?.parse()?;
                Ok(kernel::seasonal_mean(s, season))
            }
            Operation::SpreadBand => {
                let s = single(self, input.inputs)?;
                Ok(kernel::spread_band(s, input.params.float("k")?))
            }
            Operation::DateWindow => {
                let s = single(self, input.inputs)?;
                Ok(store::slice(s, &input.filter.date_range())?)
            }
            Operation::Custom(f) => (f.0)(input),
        }
    }
}

fn single<'a>(op: &Operation, inputs: &'a [Arc<Series>]) -> Result<&'a Series, IndicatorError> {
    match inputs {
        [one] => Ok(one),
        _ => Err(IndicatorError::Arity { operation: op.name(), expected: "exactly 1", actual: inputs.len() }),
    }
}

fn baseline(params: &Params) -> Result<Baseline, IndicatorError> {
    match (params.optional_date("baseline_start")?, params.optional_date("baseline_end")?) {
        (Some(start), Some(end)) => {
            if start > end {
                return Err(IndicatorError::InvalidParameter {
                    name: "baseline_start".into(),
                    reason: format!("{} is after baseline_end {}", start, end),
                });
            }
            Ok(Baseline::Range(DateRange { start, end }))
        }
        (None, None) => {
            let n = params.int("baseline_window")?;
            if n < 1 {
                return Err(IndicatorError::InvalidParameter {
                    name: "baseline_window".into(),
                    reason: format!("must be at least 1, got {}", n),
                });
            }
            Ok(Baseline::Leading(n as usize))
        }
        _ => Err(IndicatorError::InvalidParameter {
            name: "baseline_start".into(),
            reason: "baseline_start and baseline_end must be set together".into(),
        }),
    }
}

#[derive(Debug, Clone)]
pub struct IndicatorDefinition {
    pub name: String,
    pub inputs: SmallVec<[InputRef; 2]>,
    pub operation: Operation,
    /// Declared parameters with their defaults.
    pub params: Params,
    /// Extra filter dimensions a custom operation reads.
    pub reads: DimensionSet,
    /// Parameters passed on to every indicator input.
    pub forwards: SmallVec<[String; 1]>,
    pub description: Option<String>,
}

impl IndicatorDefinition {
    pub fn new(name: impl Into<String>, operation: Operation) -> Self {
        Self {
            name: name.into(),
            inputs: SmallVec::new(),
            params: operation.default_params(),
            operation,
            reads: DimensionSet::new(),
            forwards: SmallVec::new(),
            description: None,
        }
    }

    pub fn input(mut self, input: InputRef) -> Self {
        self.inputs.push(input);
        self
    }

    /// Declares a parameter or changes the default of a declared one.
    pub fn param(mut self, name: impl Into<String>, default: impl Into<ParamValue>) -> Self {
        self.params.set(name, default);
        self
    }

    pub fn reads(mut self, dim: Dimension) -> Self {
        if !self.reads.contains(&dim) {
            self.reads.push(dim);
        }
        self
    }

    /// Passes the resolved value of `param` to indicator inputs, unless the
    /// input reference overrides it.
    pub fn forward(mut self, param: impl Into<String>) -> Self {
        let param = param.into();
        if !self.forwards.contains(&param) {
            self.forwards.push(param);
        }
        self
    }

    /// The overrides for an indicator input resolved under `resolved`.
    pub fn forwarded(&self, own: &Params, resolved: &Params) -> Params {
        let mut out = own.clone();
        for param in &self.forwards {
            if let (false, Some(value)) = (own.contains(param), resolved.get(param)) {
                out.set(param.clone(), value.clone());
            }
        }
        out
    }

    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Names of the indicators this definition consumes.
    pub fn indicator_inputs(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().filter_map(InputRef::indicator_name)
    }

    /// Filter dimensions read by this definition alone (not its upstream).
    pub fn direct_reads(&self) -> DimensionSet {
        let mut out = self.operation.reads();
        let selections = self.inputs.iter().filter_map(|i| match i {
            InputRef::Selection(sel) => Some(sel.bind.iter()),
            _ => None,
        });
        for dim in self.reads.iter().chain(selections.flatten()) {
            if !out.contains(dim) {
                out.push(*dim);
            }
        }
        out
    }

    /// Structural checks that need no other definition.
    pub(crate) fn check(&self) -> Result<(), RegistryError> {
        let invalid = |reason: String| RegistryError::InvalidDefinition { name: self.name.clone(), reason };

        if self.name.trim().is_empty() {
            return Err(invalid("empty name".into()));
        }
        if self.inputs.is_empty() {
            return Err(invalid("no inputs".into()));
        }
        let fixed_arity = !matches!(self.operation, Operation::RegionalMean | Operation::Custom(_));
        if fixed_arity && self.inputs.len() != 1 {
            return Err(invalid(format!(
                "{} takes exactly one input reference, got {}",
                self.operation.name(),
                self.inputs.len()
            )));
        }
        if let Some(param) = self.forwards.iter().find(|p| !self.params.contains(p)) {
            return Err(invalid(format!("forwards undeclared parameter {}", param)));
        }
        Ok(())
    }
}
