//! Composite readiness score over whatever engines have reported so far.

use crate::config::{BoardSettings, GradeBands};
use crate::model::EngineResult;
use crate::registry::EngineSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    S,
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    /// Bands are checked top-down, so every score maps to exactly one grade.
    pub fn for_score(score: u8, bands: &GradeBands) -> Self {
        if score >= bands.s {
            Grade::S
        } else if score >= bands.a {
            Grade::A
        } else if score >= bands.b {
            Grade::B
        } else if score >= bands.c {
            Grade::C
        } else if score >= bands.d {
            Grade::D
        } else {
            Grade::F
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::S => "S",
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Composite {
    /// `None` until at least one applicable engine has a result.
    pub score: Option<u8>,
    pub grade: Option<Grade>,
    pub completed: usize,
    pub applicable: usize,
    /// Engines scoring below the weak threshold; only populated once every
    /// applicable engine has reported.
    pub weak_engines: Vec<String>,
}

impl Composite {
    pub fn completion_ratio(&self) -> f64 {
        if self.applicable == 0 {
            0.0
        } else {
            self.completed as f64 / self.applicable as f64
        }
    }

    pub fn is_complete(&self) -> bool {
        self.applicable > 0 && self.completed == self.applicable
    }
}

/// Pure function of the applicable set and the current results.
///
/// Results for engines outside `applicable` are ignored.
pub fn composite(
    applicable: &[EngineSpec],
    results: &BTreeMap<String, EngineResult>,
    settings: &BoardSettings,
) -> Composite {
    let completed: Vec<(&EngineSpec, &EngineResult)> = applicable
        .iter()
        .filter_map(|spec| results.get(&spec.key).map(|r| (spec, r)))
        .collect();

    let score = weighted_mean(&completed).map(|m| m.round().clamp(0.0, 100.0) as u8);
    let grade = score.map(|s| Grade::for_score(s, &settings.grade_bands));

    let all_in = !applicable.is_empty() && completed.len() == applicable.len();
    let weak_engines = if all_in {
        completed
            .iter()
            .filter(|(_, r)| r.score < settings.weak_threshold)
            .map(|(spec, _)| spec.key.clone())
            .collect()
    } else {
        Vec::new()
    };

    Composite {
        score,
        grade,
        completed: completed.len(),
        applicable: applicable.len(),
        weak_engines,
    }
}

fn weighted_mean(completed: &[(&EngineSpec, &EngineResult)]) -> Option<f64> {
    if completed.is_empty() {
        return None;
    }
    let total_weight: f64 = completed.iter().map(|(s, _)| s.weight.max(0.0)).sum();
    if total_weight <= 0.0 {
        let sum: f64 = completed.iter().map(|(_, r)| f64::from(r.score)).sum();
        return Some(sum / completed.len() as f64);
    }
    let sum: f64 = completed
        .iter()
        .map(|(s, r)| f64::from(r.score) * s.weight.max(0.0))
        .sum();
    Some(sum / total_weight)
}
