//! Label selectors: equality predicates joined by conjunction.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::KernelError;

/// A conjunction of `key=value` requirements. The empty selector matches
/// everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<(String, String)>,
}

impl LabelSelector {
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn eq(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            requirements: vec![(key.into(), value.into())],
        }
    }

    pub fn and(mut self, other: LabelSelector) -> Self {
        self.requirements.extend(other.requirements);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements
            .iter()
            .all(|(k, v)| labels.get(k).is_some_and(|actual| actual == v))
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms: Vec<String> = self
            .requirements
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        f.write_str(&terms.join(","))
    }
}

impl FromStr for LabelSelector {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut selector = LabelSelector::everything();
        for term in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let (key, value) = term
                .split_once('=')
                .ok_or_else(|| KernelError::validation(format!("invalid selector term {term:?}")))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(KernelError::validation(format!(
                    "selector term {term:?} has an empty key"
                )));
            }
            selector = selector.and(LabelSelector::eq(key, value.trim()));
        }
        Ok(selector)
    }
}
