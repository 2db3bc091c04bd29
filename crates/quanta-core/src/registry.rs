//! Static table of scoring engines.

use crate::model::FormatType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatRestriction {
    Any,
    ShortFormOnly,
    LongFormOnly,
}

impl FormatRestriction {
    pub fn allows(&self, format: FormatType) -> bool {
        match self {
            FormatRestriction::Any => true,
            FormatRestriction::ShortFormOnly => format == FormatType::ShortForm,
            FormatRestriction::LongFormOnly => format == FormatType::LongForm,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSpec {
    pub key: String,
    pub name: String,
    /// Path segment appended to the engine base URL.
    pub endpoint: String,
    pub restriction: FormatRestriction,
    pub weight: f64,
}

impl EngineSpec {
    pub fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        endpoint: impl Into<String>,
        restriction: FormatRestriction,
    ) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            endpoint: endpoint.into(),
            restriction,
            weight: 1.0,
        }
    }

    pub fn applies_to(&self, format: FormatType) -> bool {
        self.restriction.allows(format)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineRegistry {
    engines: Vec<EngineSpec>,
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::new(vec![
            EngineSpec::new("title", "Title Strength", "score-title", FormatRestriction::Any),
            EngineSpec::new("hook", "Hook Power", "score-hook", FormatRestriction::Any),
            EngineSpec::new(
                "retention",
                "Retention Curve",
                "score-retention",
                FormatRestriction::Any,
            ),
            EngineSpec::new("seo", "Search Discoverability", "score-seo", FormatRestriction::Any),
            EngineSpec::new(
                "thumbnail",
                "Thumbnail Pull",
                "score-thumbnail",
                FormatRestriction::Any,
            ),
            EngineSpec::new("momentum", "Momentum", "score-momentum", FormatRestriction::Any),
            EngineSpec::new(
                "shorts_loop",
                "Shorts Loopability",
                "score-shorts-loop",
                FormatRestriction::ShortFormOnly,
            ),
        ])
    }
}

impl EngineRegistry {
    /// Later duplicates of a key are dropped.
    pub fn new(engines: Vec<EngineSpec>) -> Self {
        let mut seen = std::collections::HashSet::new();
        let engines = engines
            .into_iter()
            .filter(|e| seen.insert(e.key.clone()))
            .collect();
        Self { engines }
    }

    pub fn all(&self) -> &[EngineSpec] {
        &self.engines
    }

    pub fn get(&self, key: &str) -> Option<&EngineSpec> {
        self.engines.iter().find(|e| e.key == key)
    }

    /// Engines whose restriction admits `format`, in registry order.
    pub fn applicable(&self, format: FormatType) -> Vec<EngineSpec> {
        self.engines
            .iter()
            .filter(|e| e.applies_to(format))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}
