use tokio::sync::mpsc;

use crate::shared::error::{AppError, AppResult};

/// Default buffering between a producer task and the consumer
pub const DEFAULT_STREAM_CAPACITY: usize = 64;

/// Message sent from a producer. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Fragment(String),
    Done,
    Failed(String),
}

/// Consumer half of a fragment stream.
///
/// Yields fragments in order, then either ends (`None`) or yields exactly one
/// error. A producer that disappears without sending `Done` counts as a failure.
#[derive(Debug)]
pub struct FragmentStream {
    rx: mpsc::Receiver<StreamItem>,
    finished: bool,
}

/// Producer half. Send methods return false once the consumer has gone away.
#[derive(Debug, Clone)]
pub struct FragmentSender {
    tx: mpsc::Sender<StreamItem>,
}

pub fn fragment_channel(capacity: usize) -> (FragmentSender, FragmentStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        FragmentSender { tx },
        FragmentStream { rx, finished: false },
    )
}

impl FragmentStream {
    /// A stream that ends immediately with no fragments
    pub fn empty() -> Self {
        let (_, mut stream) = fragment_channel(1);
        stream.finished = true;
        stream
    }

    /// Build a stream from a fixed script of items. Useful for fakes.
    pub fn from_items(items: Vec<StreamItem>) -> Self {
        let (tx, rx) = mpsc::channel(items.len().max(1));
        for item in items {
            if tx.try_send(item).is_err() {
                break;
            }
        }
        Self { rx, finished: false }
    }

    pub async fn next(&mut self) -> Option<AppResult<String>> {
        if self.finished {
            return None;
        }
        match self.rx.recv().await {
            Some(StreamItem::Fragment(text)) => Some(Ok(text)),
            Some(StreamItem::Done) => {
                self.finish();
                None
            }
            Some(StreamItem::Failed(message)) => {
                self.finish();
                Some(Err(AppError::Translation(message)))
            }
            None => {
                self.finish();
                Some(Err(AppError::Translation("stream ended unexpectedly".to_string())))
            }
        }
    }

    /// Stop receiving. Pending and future producer sends fail.
    pub fn close(&mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        self.finished = true;
        self.rx.close();
    }
}

impl FragmentSender {
    pub async fn fragment(&self, text: impl Into<String>) -> bool {
        self.tx.send(StreamItem::Fragment(text.into())).await.is_ok()
    }

    pub async fn done(self) {
        let _ = self.tx.send(StreamItem::Done).await;
    }

    pub async fn fail(self, message: impl Into<String>) {
        let _ = self.tx.send(StreamItem::Failed(message.into())).await;
    }

    /// True once the consumer dropped or closed its half
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the consumer is gone
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn yields_fragments_then_ends() {
        let mut stream = FragmentStream::from_items(vec![
            StreamItem::Fragment("a".into()),
            StreamItem::Fragment("b".into()),
            StreamItem::Done,
        ]);
        assert_eq!(stream.next().await, Some(Ok("a".into())));
        assert_eq!(stream.next().await, Some(Ok("b".into())));
        assert_eq!(stream.next().await, None);
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn failure_is_reported_once() {
        let mut stream = FragmentStream::from_items(vec![
            StreamItem::Fragment("a".into()),
            StreamItem::Failed("boom".into()),
            StreamItem::Fragment("ignored".into()),
        ]);
        assert_eq!(stream.next().await, Some(Ok("a".into())));
        assert_eq!(stream.next().await, Some(Err(AppError::Translation("boom".into()))));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn dropped_producer_is_a_failure() {
        let (tx, mut stream) = fragment_channel(4);
        assert!(tx.fragment("partial").await);
        drop(tx);
        assert_eq!(stream.next().await, Some(Ok("partial".into())));
        assert!(matches!(stream.next().await, Some(Err(AppError::Translation(_)))));
    }

    #[tokio::test]
    async fn empty_stream_ends_immediately() {
        assert_eq!(FragmentStream::empty().next().await, None);
    }

    #[tokio::test]
    async fn closing_consumer_stops_producer() {
        let (tx, mut stream) = fragment_channel(1);
        stream.close();
        assert!(tx.is_closed());
        assert!(!tx.fragment("late").await);
    }
}
