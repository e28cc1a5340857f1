//! Tensor verification against per-tag rules.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::core::schema::types::HostTag;
use crate::core::value::{Tensor, Value};

/// Represents an issue found while verifying a value.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationIssue {
    /// The value breaks the rule.
    Error(String),
    /// Suspicious but accepted.
    Warning(String),
}

/// The result of a verification pass.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.issues.push(ValidationIssue::Error(msg.into()));
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.issues.push(ValidationIssue::Warning(msg.into()));
    }

    pub fn is_safe(&self) -> bool {
        !self.issues.iter().any(|i| matches!(i, ValidationIssue::Error(_)))
    }

    pub fn has_warnings(&self) -> bool {
        self.issues.iter().any(|i| matches!(i, ValidationIssue::Warning(_)))
    }

    /// All error messages, one per line.
    pub fn error_summary(&self) -> String {
        self.issues
            .iter()
            .filter_map(|i| match i {
                ValidationIssue::Error(msg) => Some(msg.as_str()),
                ValidationIssue::Warning(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Send warnings to the log.
    pub fn log_warnings(&self) {
        for issue in &self.issues {
            if let ValidationIssue::Warning(msg) = issue {
                log::warn!("{}", msg);
            }
        }
    }
}

/// Shape and range constraints for tensors carrying one host tag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TensorRule {
    /// Allowed ranks.
    pub ranks: Option<Vec<usize>>,
    /// Upper bound per axis, from the first.
    pub max_extents: Option<Vec<usize>>,
    /// Allowed sizes of the last axis.
    pub channels: Option<Vec<usize>>,
    /// All values lie in `[0, 1]`.
    pub unit_range: bool,
}

impl TensorRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ranks(mut self, ranks: impl Into<Vec<usize>>) -> Self {
        self.ranks = Some(ranks.into());
        self
    }

    pub fn max_extents(mut self, extents: impl Into<Vec<usize>>) -> Self {
        self.max_extents = Some(extents.into());
        self
    }

    pub fn channels(mut self, channels: impl Into<Vec<usize>>) -> Self {
        self.channels = Some(channels.into());
        self
    }

    pub fn unit_range(mut self) -> Self {
        self.unit_range = true;
        self
    }

    fn check(&self, tensor: &Tensor, tag: &HostTag, name: &str, result: &mut ValidationResult) {
        if self.unit_range {
            if let Some(bad) = tensor.data().iter().find(|v| !(0.0..=1.0).contains(*v)) {
                result.add_error(format!(
                    "{name}: {tag} tensor must have values between 0 and 1, got {bad}"
                ));
            }
        }

        if let Some(ranks) = &self.ranks {
            if !ranks.contains(&tensor.rank()) {
                result.add_error(format!(
                    "{name}: {tag} tensor must have shape of length in {ranks:?}, got {:?}",
                    tensor.shape()
                ));
                return;
            }
        }

        if let Some(extents) = &self.max_extents {
            for (axis, (&limit, &size)) in extents.iter().zip(tensor.shape()).enumerate() {
                if size > limit {
                    result.add_error(format!(
                        "{name}: {tag} tensor dimension {axis} must be less than or equal to {limit}, got {size}"
                    ));
                }
            }
        }

        if let Some(channels) = &self.channels {
            if let Some(&last) = tensor.shape().last() {
                if !channels.contains(&last) {
                    result.add_error(format!(
                        "{name}: {tag} tensor must have the number of channels in {channels:?}, got {last}"
                    ));
                }
            }
        }
    }
}

/// Rules by host tag.
#[derive(Debug, Default)]
pub struct TensorRules {
    rules: RwLock<HashMap<HostTag, TensorRule>>,
}

impl TensorRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// `MASK` values in `[0, 1]`; `IMAGE` of rank 4 with 1, 3 or 4 channels;
    /// `DEPTH` of rank 4 with a single channel.
    pub fn with_defaults() -> Self {
        let rules = Self::new();
        rules.set(HostTag::MASK, TensorRule::new().unit_range());
        rules.set(HostTag::IMAGE, TensorRule::new().ranks([4]).channels([1, 3, 4]));
        rules.set(HostTag::DEPTH, TensorRule::new().ranks([4]).channels([1]));
        rules
    }

    /// Install `rule` for `tag`, replacing any previous rule.
    pub fn set(&self, tag: HostTag, rule: TensorRule) {
        self.rules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tag, rule);
    }

    pub fn rule(&self, tag: &HostTag) -> Option<TensorRule> {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tag)
            .cloned()
    }

    /// Verify `value` as a `tag` payload. Sequences are verified element by
    /// element. Tags without a rule always pass.
    pub fn verify(&self, tag: &HostTag, value: &Value, name: &str) -> ValidationResult {
        let mut result = ValidationResult::new();
        if let Some(rule) = self.rule(tag) {
            verify_value(&rule, tag, value, name, &mut result);
        }
        result
    }
}

fn verify_value(rule: &TensorRule, tag: &HostTag, value: &Value, name: &str, result: &mut ValidationResult) {
    match value {
        Value::Tensor(tensor) => rule.check(tensor, tag, name, result),
        Value::List(items) | Value::Tuple(items) => {
            for item in items {
                verify_value(rule, tag, item, name, result);
            }
        }
        Value::None => {}
        other => result.add_warning(format!("{name}: expected a {tag} tensor, got {}", other.kind())),
    }
}
