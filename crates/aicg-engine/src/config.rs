//! Engine configuration.

use std::collections::HashMap;
use std::time::Duration;

use aicg_models::TaskKind;

/// Worker and sweeper configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Per-kind concurrency caps; `None` means unbounded.
    pub concurrency: HashMap<TaskKind, Option<usize>>,
    /// Task kinds this worker process consumes; empty means all.
    pub kinds: Vec<TaskKind>,
    /// How often to promote delayed (retry-backoff) tasks.
    pub promote_interval: Duration,
    /// How often to scan for orphaned pending deliveries.
    pub claim_interval: Duration,
    /// Minimum idle time before a delivery can be reclaimed.
    pub claim_min_idle: Duration,
    /// Sweeper pass interval.
    pub sweep_interval: Duration,
    /// Max transitions polled per sweeper pass.
    pub sweep_batch: i64,
    /// Graceful shutdown timeout.
    pub shutdown_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let kinds = [
            TaskKind::Text,
            TaskKind::Image,
            TaskKind::Tts,
            TaskKind::VideoSubmit,
            TaskKind::VideoPoll,
            TaskKind::Assembly,
        ];
        let concurrency = kinds
            .iter()
            .map(|k| (*k, k.default_concurrency()))
            .collect();
        Self {
            concurrency,
            kinds: kinds.to_vec(),
            promote_interval: Duration::from_secs(2),
            claim_interval: Duration::from_secs(60),
            claim_min_idle: Duration::from_secs(1800),
            sweep_interval: Duration::from_secs(5),
            sweep_batch: 50,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    ///
    /// `WORKER_CONCURRENCY_<KIND>` overrides the per-kind caps.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        for (kind, cap) in config.concurrency.iter_mut() {
            if let Some(value) = std::env::var(kind.concurrency_env())
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
            {
                *cap = Some(value);
            }
        }
        config
    }

    /// Restrict the kinds this worker consumes (`worker --kinds=...`).
    pub fn with_kinds(mut self, kinds: Vec<TaskKind>) -> Self {
        if !kinds.is_empty() {
            self.kinds = kinds;
        }
        self
    }

    /// Override every cap with a flat value (`worker --concurrency=N`).
    pub fn with_flat_concurrency(mut self, n: usize) -> Self {
        for (kind, cap) in self.concurrency.iter_mut() {
            if *kind != TaskKind::VideoPoll {
                *cap = Some(n);
            }
        }
        self
    }

    pub fn cap_for(&self, kind: TaskKind) -> Option<usize> {
        self.concurrency.get(&kind).copied().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_caps() {
        let config = EngineConfig::default();
        assert_eq!(config.cap_for(TaskKind::Text), Some(3));
        assert_eq!(config.cap_for(TaskKind::Image), Some(5));
        assert_eq!(config.cap_for(TaskKind::Tts), Some(5));
        assert_eq!(config.cap_for(TaskKind::VideoSubmit), Some(5));
        assert_eq!(config.cap_for(TaskKind::VideoPoll), None);
        assert_eq!(config.cap_for(TaskKind::Assembly), Some(1));
    }

    #[test]
    fn flat_concurrency_leaves_poll_unbounded() {
        let config = EngineConfig::default().with_flat_concurrency(2);
        assert_eq!(config.cap_for(TaskKind::Image), Some(2));
        assert_eq!(config.cap_for(TaskKind::VideoPoll), None);
    }
}
