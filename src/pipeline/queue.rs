use std::sync::RwLock;

use tokio::sync::mpsc;

use crate::models::job::AnalysisJob;

/// In-process job queue: any number of producers, exactly one consumer.
///
/// Backed by an unbounded channel, so `push` never blocks and ordering is
/// strict FIFO across producers. `close` stops new submissions; once the
/// buffered jobs are drained the consumer's `recv` returns `None`.
pub struct JobQueue {
    sender: RwLock<Option<mpsc::UnboundedSender<AnalysisJob>>>,
    receiver: RwLock<Option<mpsc::UnboundedReceiver<AnalysisJob>>>,
}

impl JobQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender: RwLock::new(Some(sender)),
            receiver: RwLock::new(Some(receiver)),
        }
    }

    /// Submit a job for processing. Fails only when the queue is closed.
    pub fn push(&self, job: AnalysisJob) -> Result<(), QueueError> {
        let guard = self
            .sender
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match guard.as_ref() {
            Some(sender) => sender.send(job).map_err(|_| QueueError::Closed),
            None => Err(QueueError::Closed),
        }
    }

    /// Hand the receiving end to the single consumer. Returns `None` after
    /// the first call so a second worker can never be attached.
    pub fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<AnalysisJob>> {
        self.receiver
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
    }

    /// Stop accepting new jobs. Idempotent; already-buffered jobs remain
    /// readable by the consumer.
    pub fn close(&self) {
        self.sender
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .is_none()
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("analysis queue is closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn job() -> AnalysisJob {
        AnalysisJob::new(Uuid::new_v4(), "shots/test.png")
    }

    #[tokio::test]
    async fn test_push_then_recv_fifo() {
        let queue = JobQueue::new();
        let first = job();
        let second = job();
        queue.push(first.clone()).unwrap();
        queue.push(second.clone()).unwrap();

        let mut rx = queue.take_receiver().unwrap();
        assert_eq!(rx.recv().await.unwrap().id, first.id);
        assert_eq!(rx.recv().await.unwrap().id, second.id);
    }

    #[tokio::test]
    async fn test_close_rejects_new_jobs() {
        let queue = JobQueue::new();
        queue.push(job()).unwrap();
        queue.close();
        assert!(queue.is_closed());
        assert!(matches!(queue.push(job()), Err(QueueError::Closed)));

        // Buffered job still drains, then the channel ends.
        let mut rx = queue.take_receiver().unwrap();
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_close_is_idempotent() {
        let queue = JobQueue::new();
        queue.close();
        queue.close();
        assert!(queue.is_closed());
    }

    #[test]
    fn test_receiver_taken_once() {
        let queue = JobQueue::new();
        assert!(queue.take_receiver().is_some());
        assert!(queue.take_receiver().is_none());
    }
}
