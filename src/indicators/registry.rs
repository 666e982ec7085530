//! registry.rs
//! Named indicator definitions, checked for duplicates and cycles on entry.

use super::definition::IndicatorDefinition;
use super::error::RegistryError;
use super::params::{ParamValue, Params};
use crate::analysis::topology;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// A definition bound to a concrete parameter set.
#[derive(Debug, Clone)]
pub struct ResolvedIndicator {
    pub definition: Arc<IndicatorDefinition>,
    pub params: Params,
    pub fingerprint: String,
}

impl ResolvedIndicator {
    pub fn name(&self) -> &str { &self.definition.name }
}

/// The set of known indicator definitions.
///
/// Built once at startup and then shared read-only between sessions.
#[derive(Debug, Default)]
pub struct IndicatorRegistry {
    definitions: BTreeMap<String, Arc<IndicatorDefinition>>,
}

impl IndicatorRegistry {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.definitions.len() }
    pub fn is_empty(&self) -> bool { self.definitions.is_empty() }
    pub fn contains(&self, name: &str) -> bool { self.definitions.contains_key(name) }
    pub fn names(&self) -> impl Iterator<Item = &str> { self.definitions.keys().map(String::as_str) }

    pub fn get(&self, name: &str) -> Result<&Arc<IndicatorDefinition>, RegistryError> {
        self.definitions.get(name).ok_or_else(|| RegistryError::UnknownIndicator(name.to_string()))
    }

    /// Adds a definition.
    ///
    /// Indicator inputs may name definitions registered later; the candidate
    /// graph is sorted before acceptance so a cycle is rejected whichever
    /// definition closes it.
    pub fn register(&mut self, definition: IndicatorDefinition) -> Result<(), RegistryError> {
        definition.check()?;
        if self.definitions.contains_key(&definition.name) {
            return Err(RegistryError::DuplicateName(definition.name));
        }

        let mut edges: BTreeMap<String, Vec<String>> = self
            .definitions
            .iter()
            .map(|(name, def)| (name.clone(), def.indicator_inputs().map(str::to_string).collect()))
            .collect();
        edges.insert(definition.name.clone(), definition.indicator_inputs().map(str::to_string).collect());

        if let Err(cycle) = topology::sort(&edges) {
            return Err(RegistryError::CyclicDependency { name: definition.name, cycle });
        }

        debug!(indicator = %definition.name, operation = definition.operation.name(), "registered indicator");
        self.definitions.insert(definition.name.clone(), Arc::new(definition));
        Ok(())
    }

    /// Merges `overrides` onto the declared defaults.
    pub fn resolve(&self, name: &str, overrides: &Params) -> Result<ResolvedIndicator, RegistryError> {
        let definition = self.get(name)?;
        let mut params = definition.params.clone();

        for (param, value) in overrides.iter() {
            let declared = definition.params.get(param).ok_or_else(|| RegistryError::UnknownParameter {
                indicator: name.to_string(),
                param: param.clone(),
            })?;
            if !declared.accepts(value) {
                return Err(RegistryError::ParameterType {
                    indicator: name.to_string(),
                    param: param.clone(),
                    expected: declared.type_name(),
                    actual: value.type_name(),
                });
            }
            // Int overrides of a float parameter are stored as floats so that
            // equal values fingerprint equally.
            let value = match (declared, value) {
                (ParamValue::Float(_), ParamValue::Int(v)) => ParamValue::Float(*v as f64),
                _ => value.clone(),
            };
            params.set(param.clone(), value);
        }

        let fingerprint = params.fingerprint();
        Ok(ResolvedIndicator { definition: Arc::clone(definition), params, fingerprint })
    }
}
