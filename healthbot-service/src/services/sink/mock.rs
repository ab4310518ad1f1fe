//! Recording sink for tests.

use super::{MetricsSink, Sample, SinkError};
use crate::services::monitors::{CreatedMonitor, MonitorDefinition};
use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behaviour {
    Accept,
    Fail,
    Stall(Duration),
}

/// Records every delivered sample and created monitor.
pub struct MockSink {
    behaviour: Behaviour,
    submitted: Mutex<Vec<Sample>>,
    submit_calls: AtomicU64,
    rejected_monitors: Vec<String>,
    next_monitor_id: AtomicI64,
}

impl MockSink {
    pub fn new() -> Self {
        Self {
            behaviour: Behaviour::Accept,
            submitted: Mutex::new(Vec::new()),
            submit_calls: AtomicU64::new(0),
            rejected_monitors: Vec::new(),
            next_monitor_id: AtomicI64::new(1000),
        }
    }

    /// Every delivery is rejected with a 500.
    pub fn failing() -> Self {
        Self {
            behaviour: Behaviour::Fail,
            ..Self::new()
        }
    }

    /// Every delivery and monitor creation sleeps for `delay` before succeeding.
    pub fn stalling(delay: Duration) -> Self {
        Self {
            behaviour: Behaviour::Stall(delay),
            ..Self::new()
        }
    }

    /// Monitor creation fails for the named rule only.
    pub fn rejecting_monitor(mut self, name: impl Into<String>) -> Self {
        self.rejected_monitors.push(name.into());
        self
    }

    pub fn submitted(&self) -> Vec<Sample> {
        self.submitted
            .lock()
            .map(|samples| samples.clone())
            .unwrap_or_default()
    }

    pub fn submit_calls(&self) -> u64 {
        self.submit_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricsSink for MockSink {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn submit(&self, samples: &[Sample]) -> Result<(), SinkError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);

        match self.behaviour {
            Behaviour::Fail => {
                return Err(SinkError::Rejected {
                    status: 500,
                    body: "mock sink failure".to_string(),
                })
            }
            Behaviour::Stall(delay) => tokio::time::sleep(delay).await,
            Behaviour::Accept => {}
        }

        if let Ok(mut submitted) = self.submitted.lock() {
            submitted.extend_from_slice(samples);
        }
        Ok(())
    }

    async fn create_monitor(
        &self,
        monitor: &MonitorDefinition,
    ) -> Result<CreatedMonitor, SinkError> {
        if let Behaviour::Stall(delay) = self.behaviour {
            tokio::time::sleep(delay).await;
        }

        if self.behaviour == Behaviour::Fail || self.rejected_monitors.contains(&monitor.name) {
            return Err(SinkError::Rejected {
                status: 400,
                body: format!("mock rejected {}", monitor.name),
            });
        }

        let id = self.next_monitor_id.fetch_add(1, Ordering::SeqCst);
        Ok(CreatedMonitor::created(id, &monitor.name))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
