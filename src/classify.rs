//! Outcome classification.
//!
//! The endpoint has no structured error protocol: apart from the success
//! code, the only signal is free text. Classification is therefore an
//! ordered list of substring rules that can be swapped out via TOML:
//!
//! ```toml
//! success_codes = [0]
//!
//! [[rule]]
//! contains = "名额已满"
//! outcome = "resource_full"
//!
//! [[rule]]
//! contains = "选课成功"
//! outcome = "success"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{Outcome, RawResult};

/// Message used when the endpoint replies without any text.
const NO_MESSAGE: &str = "unknown error";

/// One match rule: if the message contains `contains`, the outcome is `outcome`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRule {
    pub contains: String,
    pub outcome: Outcome,
}

impl MatchRule {
    pub fn new(contains: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            contains: contains.into(),
            outcome,
        }
    }
}

/// Top-level TOML layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierRules {
    #[serde(default = "default_success_codes")]
    pub success_codes: Vec<i64>,
    #[serde(default, rename = "rule")]
    pub rules: Vec<MatchRule>,
}

fn default_success_codes() -> Vec<i64> {
    vec![0]
}

impl Default for ClassifierRules {
    /// The vocabulary of the course-selection endpoint.
    fn default() -> Self {
        Self {
            success_codes: default_success_codes(),
            rules: vec![
                MatchRule::new("名额已满", Outcome::ResourceFull),
                MatchRule::new("选课成功", Outcome::Success),
            ],
        }
    }
}

/// Result of classifying one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub outcome: Outcome,
    /// Message text from the reply, or the transport failure reason.
    pub message: String,
}

/// Maps raw attempt results to outcomes using an ordered rule list.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    rules: ClassifierRules,
}

impl Classifier {
    /// Build a classifier, rejecting rules that claim a transport failure.
    pub fn new(rules: ClassifierRules) -> Result<Self> {
        if let Some(rule) = rules
            .rules
            .iter()
            .find(|r| r.outcome == Outcome::TransportFailure)
        {
            return Err(Error::Config(format!(
                "rule for {:?} cannot map to transport_failure",
                rule.contains
            )));
        }
        if let Some(rule) = rules.rules.iter().find(|r| r.contains.is_empty()) {
            return Err(Error::Config(format!(
                "rule with outcome {} has an empty pattern",
                rule.outcome
            )));
        }
        Ok(Self { rules })
    }

    /// Parse rules from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        let rules: ClassifierRules =
            toml::from_str(text).map_err(|e| Error::Config(format!("bad classifier rules: {e}")))?;
        Self::new(rules)
    }

    /// Load rules from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read rules file {}: {e}", path.display()))
        })?;
        Self::from_toml(&text)
    }

    pub fn rules(&self) -> &ClassifierRules {
        &self.rules
    }

    /// Serialize the effective rules back to TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string(&self.rules).map_err(|e| Error::Other(format!("serialize rules: {e}")))
    }

    /// Label one raw result.
    ///
    /// Success codes are checked before any text rule; the first matching
    /// rule wins; anything else is `OtherRejected`.
    pub fn classify(&self, raw: &RawResult) -> Classification {
        match raw {
            RawResult::TransportFailure { reason } => Classification {
                outcome: Outcome::TransportFailure,
                message: reason.clone(),
            },
            RawResult::Reply { code, message } => {
                let text = message.as_deref().unwrap_or_default();
                let outcome = if code.is_some_and(|c| self.rules.success_codes.contains(&c)) {
                    Outcome::Success
                } else {
                    self.rules
                        .rules
                        .iter()
                        .find(|rule| text.contains(&rule.contains))
                        .map(|rule| rule.outcome)
                        .unwrap_or(Outcome::OtherRejected)
                };
                Classification {
                    outcome,
                    message: if text.is_empty() {
                        NO_MESSAGE.to_string()
                    } else {
                        text.to_string()
                    },
                }
            }
        }
    }
}
