// src/session/queue.rs - Outgoing response lines
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// FIFO of newline-terminated response lines.
///
/// Producers never block. The single consumer waits up to a timeout and gets
/// `None` when nothing arrived, which is not an error.
pub struct ResponseQueue {
    tx: mpsc::UnboundedSender<String>,
    rx: Mutex<mpsc::UnboundedReceiver<String>>,
    queued_bytes: AtomicUsize,
}

impl ResponseQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            queued_bytes: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, line: impl Into<String>) {
        let mut payload = line.into();
        payload.push('\n');
        self.queued_bytes.fetch_add(payload.len(), Ordering::SeqCst);
        // The receiver lives as long as the queue, so the send cannot fail.
        let _ = self.tx.send(payload);
    }

    pub fn push_all<I, S>(&self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for line in lines {
            self.push(line);
        }
    }

    /// Next line including its `\n`, or `None` after `wait`.
    pub async fn pop(&self, wait: Duration) -> Option<String> {
        let mut rx = self.rx.lock().await;
        match tokio::time::timeout(wait, rx.recv()).await {
            Ok(Some(line)) => {
                self.release(line.len());
                Some(line)
            }
            Ok(None) | Err(_) => None,
        }
    }

    pub fn queued_bytes(&self) -> usize {
        self.queued_bytes.load(Ordering::SeqCst)
    }

    /// Drop everything queued. Returns the number of lines discarded.
    pub async fn clear(&self) -> usize {
        let mut rx = self.rx.lock().await;
        let mut cleared = 0;
        while let Ok(line) = rx.try_recv() {
            self.release(line.len());
            cleared += 1;
        }
        self.queued_bytes.store(0, Ordering::SeqCst);
        cleared
    }

    fn release(&self, len: usize) {
        let _ = self
            .queued_bytes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(len)));
    }
}

impl Default for ResponseQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fifo_and_byte_count() {
        let queue = ResponseQueue::new();
        queue.push("ok");
        queue.push_all(["start", "T:1.0 /0.0"]);
        assert_eq!(queue.queued_bytes(), 3 + 6 + 11);
        assert_eq!(queue.pop(Duration::from_millis(10)).await.as_deref(), Some("ok\n"));
        assert_eq!(queue.pop(Duration::from_millis(10)).await.as_deref(), Some("start\n"));
        assert_eq!(queue.queued_bytes(), 11);
    }

    #[tokio::test]
    async fn test_pop_times_out_empty() {
        let queue = ResponseQueue::new();
        assert_eq!(queue.pop(Duration::from_millis(5)).await, None);
    }

    #[tokio::test]
    async fn test_clear() {
        let queue = ResponseQueue::new();
        queue.push("a");
        queue.push("b");
        assert_eq!(queue.clear().await, 2);
        assert_eq!(queue.queued_bytes(), 0);
        assert_eq!(queue.pop(Duration::from_millis(5)).await, None);
    }
}
