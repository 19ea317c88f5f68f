//! Bounded FIFO job queue between the producer and the consumer.
//!
//! A thin wrapper over [`std::sync::mpsc::sync_channel`] that spells out
//! the pipeline's close semantics: the producer closes the queue for
//! writing exactly once, after which the consumer drains whatever is
//! buffered and then observes end-of-stream instead of blocking forever.

use std::sync::mpsc;

/// Writing half of the queue, held by the producer.
pub(crate) struct JobSender<T>(mpsc::SyncSender<T>);

/// Reading half of the queue, held by the consumer.
pub(crate) struct JobReceiver<T>(mpsc::Receiver<T>);

/// Creates a queue that buffers at most `capacity` jobs.
///
/// `send` blocks while the buffer is full, which is the backpressure that
/// caps the number of staged files waiting for upload.
pub(crate) fn bounded<T>(capacity: usize) -> (JobSender<T>, JobReceiver<T>) {
    let (tx, rx) = mpsc::sync_channel(capacity);
    (JobSender(tx), JobReceiver(rx))
}

impl<T> JobSender<T> {
    /// Enqueues a job, blocking while the queue is full.
    ///
    /// Returns the job back to the caller when the reading half is gone,
    /// so an unsent job can still be cleaned up.
    pub(crate) fn send(&self, job: T) -> Result<(), T> {
        self.0.send(job).map_err(|mpsc::SendError(job)| job)
    }

    /// Closes the queue for writing.
    ///
    /// Buffered jobs stay takeable; once they drain, `take` reports
    /// end-of-stream.
    pub(crate) fn close(self) {}
}

impl<T> JobReceiver<T> {
    /// Dequeues the next job, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue was closed for writing and every
    /// buffered job has been taken.
    pub(crate) fn take(&self) -> Option<T> {
        self.0.recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::bounded;

    #[test]
    fn delivers_in_fifo_order() {
        let (tx, rx) = bounded(4);
        for n in 0..4 {
            tx.send(n).unwrap();
        }
        tx.close();
        assert_eq!(rx.take(), Some(0));
        assert_eq!(rx.take(), Some(1));
        assert_eq!(rx.take(), Some(2));
        assert_eq!(rx.take(), Some(3));
        assert_eq!(rx.take(), None);
    }

    #[test]
    fn close_drains_before_end_of_stream() {
        let (tx, rx) = bounded(2);
        tx.send("a").unwrap();
        tx.send("b").unwrap();
        tx.close();
        assert_eq!(rx.take(), Some("a"));
        assert_eq!(rx.take(), Some("b"));
        assert_eq!(rx.take(), None);
    }

    #[test]
    fn send_blocks_at_capacity_until_take() {
        let (tx, rx) = bounded(1);
        tx.send(1u32).unwrap();

        let second_sent = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&second_sent);
        let sender = thread::spawn(move || {
            tx.send(2).unwrap();
            flag.store(true, Ordering::SeqCst);
            tx.close();
        });

        thread::sleep(Duration::from_millis(50));
        assert!(
            !second_sent.load(Ordering::SeqCst),
            "second send completed while the queue was full"
        );

        assert_eq!(rx.take(), Some(1));
        sender.join().unwrap();
        assert!(second_sent.load(Ordering::SeqCst));
        assert_eq!(rx.take(), Some(2));
        assert_eq!(rx.take(), None);
    }

    #[test]
    fn send_returns_job_when_receiver_is_gone() {
        let (tx, rx) = bounded(1);
        drop(rx);
        assert_eq!(tx.send(7u32), Err(7));
    }
}
