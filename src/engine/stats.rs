// src/engine/stats.rs

//! Stats aggregation policy and the display-ready stats view.
//!
//! The per-step counter increments are a placeholder heuristic kept in a
//! table so it can be replaced from config (`[stats.increments]`) without
//! touching the execution loop.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::model::{CounterIncrement, StatsSection};
use crate::exec::StepMetrics;
use crate::store::{Stats, StatsDelta};

/// Table-driven mapping from step key to counter increments.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsPolicy {
    increments: BTreeMap<String, CounterIncrement>,
    elapsed_seconds_per_attempt: u64,
}

impl Default for StatsPolicy {
    fn default() -> Self {
        let increments = [
            ("topic_scoping", 30, 0),
            ("literature_review", 0, 24),
            ("hypothesis_generation", 18, 0),
            ("experiment_planning", 18, 0),
        ]
        .into_iter()
        .map(|(key, hypothesis, papers)| {
            (key.to_string(), CounterIncrement { hypothesis, papers })
        })
        .collect();

        Self {
            increments,
            elapsed_seconds_per_attempt: 12,
        }
    }
}

impl StatsPolicy {
    pub fn new(increments: BTreeMap<String, CounterIncrement>, elapsed_seconds_per_attempt: u64) -> Self {
        Self {
            increments,
            elapsed_seconds_per_attempt,
        }
    }

    pub fn from_config(section: &StatsSection) -> Self {
        let mut policy = Self::default();
        policy.elapsed_seconds_per_attempt = section.elapsed_seconds_per_attempt;
        if let Some(increments) = &section.increments {
            policy.increments = increments.clone();
        }
        policy
    }

    pub fn increment_for(&self, step_key: &str) -> CounterIncrement {
        self.increments.get(step_key).copied().unwrap_or_default()
    }

    /// Delta to add after one attempt of `step_key` that reported `metrics`.
    pub fn delta_for(&self, step_key: &str, metrics: &StepMetrics) -> StatsDelta {
        let counters = self.increment_for(step_key);
        StatsDelta {
            hypothesis: counters.hypothesis,
            papers: counters.papers,
            tokens: metrics.tokens,
            cost_usd: metrics.cost_usd,
            elapsed_seconds: self.elapsed_seconds_per_attempt,
            token_cost_usd: metrics.token_cost_usd,
            gpu_hours: metrics.gpu_hours,
        }
    }
}

/// Stats as shown to observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsView {
    pub run_id: String,
    pub hypothesis: u64,
    pub papers: u64,
    pub tokens: String,
    pub cost: String,
    pub elapsed_time: String,
    pub token_cost_usd: f64,
    pub gpu_hours: f64,
}

impl StatsView {
    /// View of a run without a stats row.
    pub fn zero(run_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            hypothesis: 0,
            papers: 0,
            tokens: format_tokens(0),
            cost: format_cost(0.0),
            elapsed_time: format_duration(0),
            token_cost_usd: 0.0,
            gpu_hours: 0.0,
        }
    }

    pub fn from_stats(stats: &Stats) -> Self {
        Self {
            run_id: stats.run_id.clone(),
            hypothesis: stats.hypothesis,
            papers: stats.papers,
            tokens: format_tokens(stats.tokens),
            cost: format_cost(stats.cost_usd),
            elapsed_time: format_duration(stats.elapsed_seconds),
            token_cost_usd: round4(stats.token_cost_usd),
            gpu_hours: round4(stats.gpu_hours),
        }
    }

    pub fn for_run(run_id: &str, stats: Option<&Stats>) -> Self {
        stats.map_or_else(|| Self::zero(run_id), Self::from_stats)
    }
}

/// `999`, `1.5K`, `2.0M`, `1.1B`.
pub fn format_tokens(value: u64) -> String {
    const UNITS: [(u64, &str); 3] = [
        (1_000_000_000, "B"),
        (1_000_000, "M"),
        (1_000, "K"),
    ];
    for (scale, suffix) in UNITS {
        if value >= scale {
            return format!("{:.1}{suffix}", value as f64 / scale as f64);
        }
    }
    value.to_string()
}

/// `HH:MM:SS`, or `D:HH:MM:SS` from one day on.
pub fn format_duration(total_seconds: u64) -> String {
    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3_600;
    let minutes = (total_seconds % 3_600) / 60;
    let seconds = total_seconds % 60;
    if days > 0 {
        format!("{days}:{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    }
}

pub fn format_cost(value: f64) -> String {
    format!("{value:.2}")
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
