use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::notifier::RunOutcomeReport;

/// Measurements taken from one finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSample {
    pub run_id: String,
    pub duration_ms: u64,
    pub success_ratio: f64,
    pub group_latency_ms: BTreeMap<String, u64>,
}

impl RunSample {
    /// `None` for runs that never reached a join.
    pub fn from_report(report: &RunOutcomeReport) -> Option<Self> {
        let join = report.join.as_ref()?;
        Some(Self {
            run_id: report.run_id.clone(),
            duration_ms: report.duration_ms.unwrap_or(0),
            success_ratio: join.success_ratio(),
            group_latency_ms: join
                .tasks
                .iter()
                .filter_map(|t| t.duration_ms().map(|ms| (t.group_id.clone(), ms)))
                .collect(),
        })
    }
}

/// The last `capacity` samples of one workspace.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    capacity: usize,
    samples: VecDeque<RunSample>,
    /// Set while the mean ratio is below threshold, so the alert fires once per dip.
    pub(crate) ratio_alerting: bool,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            samples: VecDeque::with_capacity(capacity.max(1)),
            ratio_alerting: false,
        }
    }

    pub fn push(&mut self, sample: RunSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn mean_success_ratio(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: f64 = self.samples.iter().map(|s| s.success_ratio).sum();
        Some(sum / self.samples.len() as f64)
    }

    pub fn p95_duration_ms(&self) -> Option<u64> {
        p95(self.samples.iter().map(|s| s.duration_ms).collect())
    }

    /// p95 latency per group over the window.
    pub fn group_p95_ms(&self) -> BTreeMap<String, u64> {
        let mut per_group: BTreeMap<String, Vec<u64>> = BTreeMap::new();
        for sample in &self.samples {
            for (group, ms) in &sample.group_latency_ms {
                per_group.entry(group.clone()).or_default().push(*ms);
            }
        }
        per_group
            .into_iter()
            .filter_map(|(group, values)| p95(values).map(|p| (group, p)))
            .collect()
    }
}

/// Nearest-rank 95th percentile.
fn p95(mut values: Vec<u64>) -> Option<u64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    let rank = ((values.len() as f64) * 0.95).ceil() as usize;
    Some(values[rank.saturating_sub(1).min(values.len() - 1)])
}

/// Rolling statistics exposed in the monitor status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSummary {
    pub workspace_id: String,
    pub samples: usize,
    pub mean_success_ratio: Option<f64>,
    pub p95_duration_ms: Option<u64>,
    pub group_p95_ms: BTreeMap<String, u64>,
}
