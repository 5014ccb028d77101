//! Progress events emitted by the pipeline and the batch coordinator.
//!
//! Inject an [`Arc<dyn ProgressSink>`] via
//! [`crate::config::TranslationConfigBuilder::progress_callback`] to receive
//! one event per state change: a document starting, each translated page,
//! a document finishing, failing, being skipped or cancelled.
//!
//! # Why a sink instead of UI callbacks?
//!
//! The engine must not know whether it is driven by a terminal progress bar,
//! a desktop shell or a test. A one-way sink keeps the boundary narrow: the
//! engine pushes small value events and never waits for the receiver.
//! [`ChannelProgressSink`] forwards into an unbounded tokio channel, so a slow
//! consumer can never stall translation.
//!
//! # Example
//!
//! ```rust
//! use pdftranslate2md::{ProgressEvent, ProgressSink, TranslationConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct PageCounter(AtomicUsize);
//!
//! impl ProgressSink for PageCounter {
//!     fn on_event(&self, event: &ProgressEvent) {
//!         if event.page_index.is_some() {
//!             self.0.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//!
//! let config = TranslationConfig::builder()
//!     .progress_callback(Arc::new(PageCounter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// What happened to a document (or one of its pages).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProgressStatus {
    /// Pages extracted; translation is about to start.
    Started,
    /// One page reached a terminal state.
    PageTranslated,
    /// One page failed and a placeholder was inserted instead.
    PagePlaceholder { reason: String },
    /// Output written.
    Completed,
    /// Output already existed and `force` was off.
    Skipped,
    /// The document failed; see the batch item for details.
    Failed { message: String },
    Cancelled,
}

/// A single progress notification.
///
/// `page_index` and `total_pages` are set for page events and for
/// [`ProgressStatus::Started`] (which carries only the total).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub document_id: String,
    pub page_index: Option<usize>,
    pub total_pages: Option<usize>,
    #[serde(flatten)]
    pub status: ProgressStatus,
}

impl ProgressEvent {
    pub fn document(document_id: impl Into<String>, status: ProgressStatus) -> Self {
        Self {
            document_id: document_id.into(),
            page_index: None,
            total_pages: None,
            status,
        }
    }

    pub fn page(
        document_id: impl Into<String>,
        page_index: usize,
        total_pages: usize,
        status: ProgressStatus,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            page_index: Some(page_index),
            total_pages: Some(total_pages),
            status,
        }
    }
}

/// Receives progress events.
///
/// Implementations must be `Send + Sync`: documents in a batch run
/// concurrently and report from different tasks. `on_event` must return
/// quickly; it is called inline on the translation task.
pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);
}

/// Discards every event. Used when no sink is configured.
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn on_event(&self, _event: &ProgressEvent) {}
}

/// Forwards events into an unbounded tokio channel.
///
/// Sending never blocks. Once the receiver is dropped, events are discarded.
pub struct ChannelProgressSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgressSink {
    /// Create a sink and the receiver that drains it.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelProgressSink {
    fn on_event(&self, event: &ProgressEvent) {
        let _ = self.tx.send(event.clone());
    }
}

/// Convenience alias matching the type stored in [`crate::config::TranslationConfig`].
pub type ProgressCallback = Arc<dyn ProgressSink>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ProgressEvent>>);

    impl ProgressSink for Recorder {
        fn on_event(&self, event: &ProgressEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn noop_sink_does_not_panic() {
        let sink = NoopProgressSink;
        sink.on_event(&ProgressEvent::document("doc", ProgressStatus::Started));
        sink.on_event(&ProgressEvent::page("doc", 1, 3, ProgressStatus::PageTranslated));
    }

    #[test]
    fn recorder_receives_events_in_order() {
        let rec = Recorder::default();
        rec.on_event(&ProgressEvent::page("doc", 1, 2, ProgressStatus::PageTranslated));
        rec.on_event(&ProgressEvent::page("doc", 2, 2, ProgressStatus::PageTranslated));
        rec.on_event(&ProgressEvent::document("doc", ProgressStatus::Completed));

        let events = rec.0.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].page_index, Some(1));
        assert_eq!(events[1].total_pages, Some(2));
        assert_eq!(events[2].status, ProgressStatus::Completed);
    }

    #[tokio::test]
    async fn channel_sink_forwards_without_blocking() {
        let (sink, mut rx) = ChannelProgressSink::new();
        let sink: ProgressCallback = Arc::new(sink);
        sink.on_event(&ProgressEvent::document("a", ProgressStatus::Started));
        sink.on_event(&ProgressEvent::document("a", ProgressStatus::Cancelled));

        assert_eq!(rx.recv().await.unwrap().status, ProgressStatus::Started);
        assert_eq!(rx.recv().await.unwrap().status, ProgressStatus::Cancelled);
    }

    #[test]
    fn channel_sink_survives_dropped_receiver() {
        let (sink, rx) = ChannelProgressSink::new();
        drop(rx);
        sink.on_event(&ProgressEvent::document("a", ProgressStatus::Skipped));
    }

    #[test]
    fn event_json_is_flat() {
        let ev = ProgressEvent::page("paper", 2, 5, ProgressStatus::PageTranslated);
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["status"], "page_translated");
        assert_eq!(json["page_index"], 2);
        assert_eq!(json["document_id"], "paper");
    }
}
