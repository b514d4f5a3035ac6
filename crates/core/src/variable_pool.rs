//! Variable pool expansion.
//!
//! Turns an ordered list of named value slots into concrete prompt
//! combinations. Expansion is deterministic: the same slots, mode, and target
//! count always produce the same ordered list. Seeds are attached later.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Sampling modes
// ---------------------------------------------------------------------------

/// Full Cartesian product across slots.
pub const MODE_PERMUTATION: &str = "permutation";
/// Positional pairing across slots (zip semantics).
pub const MODE_NO_REPLACEMENT: &str = "no_replacement";

/// All valid sampling modes.
pub const VALID_SAMPLING_MODES: &[&str] = &[MODE_PERMUTATION, MODE_NO_REPLACEMENT];

/// How a pool's slots are combined into prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingMode {
    /// Cartesian product, first slot varies slowest.
    Permutation,
    /// Slots walked in lockstep; yields `min(slot lengths)` combinations.
    NoReplacement,
}

impl SamplingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Permutation => MODE_PERMUTATION,
            Self::NoReplacement => MODE_NO_REPLACEMENT,
        }
    }

    /// Parse a persisted sampling mode string.
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            MODE_PERMUTATION => Ok(Self::Permutation),
            MODE_NO_REPLACEMENT => Ok(Self::NoReplacement),
            other => Err(CoreError::Validation(format!(
                "Invalid sampling mode '{other}'. Must be one of: {}",
                VALID_SAMPLING_MODES.join(", ")
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Slots and combinations
// ---------------------------------------------------------------------------

/// One named slot of a variable pool with its ordered candidate values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableSlot {
    pub name: String,
    pub values: Vec<String>,
}

impl VariableSlot {
    pub fn new(name: impl Into<String>, values: &[&str]) -> Self {
        Self {
            name: name.into(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }
}

/// A concrete binding of every slot to one value, in slot order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Combination {
    bindings: Vec<(String, String)>,
}

impl Combination {
    pub fn new(bindings: Vec<(String, String)>) -> Self {
        Self { bindings }
    }

    /// Value bound to `slot`, if the slot is part of this combination.
    pub fn get(&self, slot: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|(name, _)| name == slot)
            .map(|(_, value)| value.as_str())
    }

    pub fn bindings(&self) -> &[(String, String)] {
        &self.bindings
    }

    /// Bound values in slot order.
    pub fn values(&self) -> Vec<&str> {
        self.bindings.iter().map(|(_, v)| v.as_str()).collect()
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a pool definition.
///
/// Rules:
/// - At least one slot.
/// - Slot names are non-empty and unique.
/// - Every slot has at least one value.
pub fn validate_slots(slots: &[VariableSlot]) -> Result<(), CoreError> {
    if slots.is_empty() {
        return Err(CoreError::Validation(
            "Variable pool must define at least one slot".to_string(),
        ));
    }
    let mut seen = HashSet::with_capacity(slots.len());
    for slot in slots {
        if slot.name.trim().is_empty() {
            return Err(CoreError::Validation(
                "Variable slot names must not be empty".to_string(),
            ));
        }
        if !seen.insert(slot.name.as_str()) {
            return Err(CoreError::Validation(format!(
                "Duplicate variable slot: \"{}\"",
                slot.name
            )));
        }
        if slot.values.is_empty() {
            return Err(CoreError::Validation(format!(
                "Variable slot \"{}\" has no values",
                slot.name
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Expansion
// ---------------------------------------------------------------------------

/// Number of distinct combinations a pool can yield without expanding it.
///
/// Saturates at `usize::MAX` for very large products.
pub fn available_combinations(slots: &[VariableSlot], mode: SamplingMode) -> usize {
    if slots.is_empty() {
        return 0;
    }
    match mode {
        SamplingMode::Permutation => slots
            .iter()
            .map(|s| distinct_values(&s.values).len())
            .fold(1usize, |acc, n| acc.saturating_mul(n)),
        SamplingMode::NoReplacement => zip_combinations(slots).count(),
    }
}

/// Expand a pool into exactly `target_prompts` combinations.
///
/// Fails with [`CoreError::Capacity`] when the pool yields fewer
/// combinations than requested.
pub fn expand(
    slots: &[VariableSlot],
    mode: SamplingMode,
    target_prompts: usize,
) -> Result<Vec<Combination>, CoreError> {
    if target_prompts == 0 {
        return Err(CoreError::Validation(
            "target_prompts must be at least 1".to_string(),
        ));
    }
    validate_slots(slots)?;

    let combinations: Vec<Combination> = match mode {
        SamplingMode::Permutation => ProductIter::new(slots).take(target_prompts).collect(),
        SamplingMode::NoReplacement => zip_combinations(slots).take(target_prompts).collect(),
    };

    if combinations.len() < target_prompts {
        return Err(CoreError::Capacity {
            requested: target_prompts,
            available: combinations.len(),
        });
    }
    Ok(combinations)
}

/// Values with duplicates removed, first occurrence kept.
fn distinct_values(values: &[String]) -> Vec<&str> {
    let mut seen = HashSet::with_capacity(values.len());
    values
        .iter()
        .map(String::as_str)
        .filter(|v| seen.insert(*v))
        .collect()
}

/// Lockstep walk over all slots, one combination per index of the
/// shortest slot. Repeated tuples are kept.
fn zip_combinations(slots: &[VariableSlot]) -> impl Iterator<Item = Combination> + '_ {
    let len = slots.iter().map(|s| s.values.len()).min().unwrap_or(0);
    (0..len).map(move |i| {
        Combination::new(
            slots
                .iter()
                .map(|s| (s.name.clone(), s.values[i].clone()))
                .collect(),
        )
    })
}

/// Lazy Cartesian product in odometer order (last slot varies fastest).
struct ProductIter<'a> {
    names: Vec<&'a str>,
    values: Vec<Vec<&'a str>>,
    indices: Vec<usize>,
    exhausted: bool,
}

impl<'a> ProductIter<'a> {
    fn new(slots: &'a [VariableSlot]) -> Self {
        let values: Vec<Vec<&str>> = slots.iter().map(|s| distinct_values(&s.values)).collect();
        let exhausted = values.is_empty() || values.iter().any(Vec::is_empty);
        Self {
            names: slots.iter().map(|s| s.name.as_str()).collect(),
            indices: vec![0; values.len()],
            values,
            exhausted,
        }
    }
}

impl Iterator for ProductIter<'_> {
    type Item = Combination;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }

        let current = Combination::new(
            self.names
                .iter()
                .zip(&self.indices)
                .zip(&self.values)
                .map(|((name, &idx), values)| (name.to_string(), values[idx].to_string()))
                .collect(),
        );

        // Advance the odometer from the last slot.
        let mut pos = self.indices.len();
        loop {
            if pos == 0 {
                self.exhausted = true;
                break;
            }
            pos -= 1;
            self.indices[pos] += 1;
            if self.indices[pos] < self.values[pos].len() {
                break;
            }
            self.indices[pos] = 0;
        }

        Some(current)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
