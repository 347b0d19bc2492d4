use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named numeric parameters handed to a simulation when it is constructed.
///
/// Holds both the fixed parameters shared by every run and the swept values of one
/// particular run. Iteration order is by name, so two sets with the same contents
/// always print and serialize identically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet {
    values: BTreeMap<String, f64>,
}

impl ParameterSet {
    /// Creates an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    /// Inserts or replaces a parameter, returning the previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: f64) -> Option<f64> {
        self.values.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Looks up a parameter that must be present.
    pub fn require(&self, name: &str) -> Result<f64> {
        self.get(name)
            .ok_or_else(|| anyhow::anyhow!("missing required parameter '{}'", name))
    }

    /// Looks up a parameter that must be a non-negative whole number (e.g. an agent count).
    pub fn require_count(&self, name: &str) -> Result<usize> {
        let value = self.require(name)?;
        if !value.is_finite() || value < 0.0 || value.fract() != 0.0 {
            anyhow::bail!("parameter '{}' must be a non-negative integer, got {}", name, value);
        }
        Ok(value as usize)
    }

    /// Returns a copy with `overrides` applied on top.
    pub fn merged<'a, I>(&self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut merged = self.clone();
        for (name, value) in overrides {
            merged.insert(name, value);
        }
        merged
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(name, value)| (name.as_str(), *value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, f64)> for ParameterSet {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        Self { values: iter.into_iter().collect() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merged_overrides_without_touching_original() {
        let fixed = ParameterSet::new().with("competition", 0.9).with("talent_sd", 0.0);
        let run = fixed.merged([("talent_sd", 2.0)]);
        assert_eq!(run.get("talent_sd"), Some(2.0));
        assert_eq!(run.get("competition"), Some(0.9));
        assert_eq!(fixed.get("talent_sd"), Some(0.0));
    }

    #[test]
    fn require_count_rejects_fractional_values() {
        let params = ParameterSet::new().with("numAgents", 100.0).with("bad", 2.5);
        assert_eq!(params.require_count("numAgents").unwrap(), 100);
        assert!(params.require_count("bad").is_err());
        assert!(params.require_count("absent").is_err());
    }
}
