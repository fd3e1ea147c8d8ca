//! Progress channel and polling monitor
//!
//! Workers push [`ProgressUpdate`]s into a bounded broadcast channel without
//! ever blocking; when the consumer falls behind, the oldest samples are
//! overwritten. The [`ProgressMonitor`] drains the channel at a fixed interval
//! and forwards only the latest sample per operation and phase.

use std::time::Duration;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::trace;
use vericp_types::{OperationId, ProgressReporter, ProgressUpdate};

/// Worker side of the progress channel
#[derive(Debug, Clone)]
pub struct ProgressSender {
    sender: broadcast::Sender<ProgressUpdate>,
}

impl ProgressSender {
    /// Create a channel holding at most `capacity` unread samples
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Attach a monitor that drains this channel every `poll_interval`
    pub fn monitor(&self, poll_interval: Duration) -> ProgressMonitor {
        ProgressMonitor {
            receiver: self.sender.subscribe(),
            poll_interval,
        }
    }
}

impl ProgressReporter for ProgressSender {
    fn report_progress(&self, update: ProgressUpdate) {
        // No receiver attached is not an error
        let _ = self.sender.send(update);
    }
}

/// Consumer side of the progress channel
#[derive(Debug)]
pub struct ProgressMonitor {
    receiver: broadcast::Receiver<ProgressUpdate>,
    poll_interval: Duration,
}

impl ProgressMonitor {
    /// Take everything queued, keeping the latest sample per operation and
    /// phase in order of first appearance. Returns `None` once every sender
    /// is gone and the queue is empty.
    pub fn drain(&mut self) -> Option<Vec<ProgressUpdate>> {
        let mut latest: Vec<ProgressUpdate> = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(update) => Self::coalesce(&mut latest, update),
                Err(TryRecvError::Lagged(skipped)) => {
                    trace!("Progress consumer lagged, {} samples dropped", skipped);
                }
                Err(TryRecvError::Empty) => return Some(latest),
                Err(TryRecvError::Closed) => {
                    return if latest.is_empty() { None } else { Some(latest) };
                }
            }
        }
    }

    fn coalesce(latest: &mut Vec<ProgressUpdate>, update: ProgressUpdate) {
        let key = |u: &ProgressUpdate| -> (OperationId, vericp_types::CopyPhase) {
            (u.operation_id, u.phase)
        };
        match latest.iter_mut().find(|u| key(u) == key(&update)) {
            Some(slot) => *slot = update,
            None => latest.push(update),
        }
    }

    /// Forward coalesced samples to `consumer` every poll interval until the
    /// channel closes
    pub async fn run<F>(mut self, mut consumer: F)
    where
        F: FnMut(&ProgressUpdate) + Send,
    {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            match self.drain() {
                Some(updates) => updates.iter().for_each(&mut consumer),
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vericp_types::CopyPhase;

    fn update(operation_id: OperationId, phase: CopyPhase, bytes_done: u64) -> ProgressUpdate {
        ProgressUpdate {
            operation_id,
            phase,
            bytes_done,
            bytes_total: 100,
        }
    }

    #[test]
    fn test_drain_coalesces_per_operation_and_phase() {
        let sender = ProgressSender::new(16);
        let mut monitor = sender.monitor(Duration::from_millis(50));
        let a = OperationId::new_v4();
        let b = OperationId::new_v4();

        sender.report_progress(update(a, CopyPhase::Copying, 10));
        sender.report_progress(update(b, CopyPhase::Copying, 5));
        sender.report_progress(update(a, CopyPhase::Copying, 20));
        sender.report_progress(update(a, CopyPhase::Verifying, 1));

        let drained = monitor.drain().unwrap();
        assert_eq!(
            drained,
            vec![
                update(a, CopyPhase::Copying, 20),
                update(b, CopyPhase::Copying, 5),
                update(a, CopyPhase::Verifying, 1),
            ]
        );
        assert_eq!(monitor.drain().unwrap(), vec![]);
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let sender = ProgressSender::new(4);
        let mut monitor = sender.monitor(Duration::from_millis(50));
        let id = OperationId::new_v4();

        for done in 0..=100 {
            sender.report_progress(update(id, CopyPhase::Copying, done));
        }

        let drained = monitor.drain().unwrap();
        assert_eq!(drained, vec![update(id, CopyPhase::Copying, 100)]);
    }

    #[test]
    fn test_drain_reports_closed() {
        let sender = ProgressSender::new(4);
        let mut monitor = sender.monitor(Duration::from_millis(50));
        let id = OperationId::new_v4();
        sender.report_progress(update(id, CopyPhase::Copying, 7));
        drop(sender);

        assert_eq!(
            monitor.drain(),
            Some(vec![update(id, CopyPhase::Copying, 7)])
        );
        assert_eq!(monitor.drain(), None);
    }

    #[tokio::test]
    async fn test_monitor_runs_until_senders_drop() {
        let sender = ProgressSender::new(8);
        let monitor = sender.monitor(Duration::from_millis(5));
        let id = OperationId::new_v4();

        let handle = tokio::spawn(async move {
            let mut seen = Vec::new();
            monitor.run(|u| seen.push(u.bytes_done)).await;
            seen
        });

        sender.report_progress(update(id, CopyPhase::Copying, 42));
        tokio::time::sleep(Duration::from_millis(30)).await;
        sender.report_progress(update(id, CopyPhase::Copying, 100));
        drop(sender);

        let seen = handle.await.unwrap();
        assert_eq!(seen.last(), Some(&100));
        assert!(seen.contains(&42));
    }

    #[test]
    fn test_monitor_delivers_backlog_after_close() {
        let sender = ProgressSender::new(8);
        let monitor = sender.monitor(Duration::from_millis(1));
        let id = OperationId::new_v4();
        sender.report_progress(update(id, CopyPhase::Copying, 10));
        sender.report_progress(update(id, CopyPhase::Verifying, 10));
        drop(sender);

        let mut seen = Vec::new();
        tokio_test::block_on(monitor.run(|u| seen.push(u.phase)));
        assert_eq!(seen, vec![CopyPhase::Copying, CopyPhase::Verifying]);
    }
}
