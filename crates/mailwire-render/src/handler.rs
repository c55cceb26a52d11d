//! Render notifications.
//!
//! The renderer tells its consumer when new bytes can be read and when the
//! message is complete. Notifications carry no data; the consumer pulls
//! bytes through the renderer's buffer view.
//!
//! # Example
//!
//! ```ignore
//! use mailwire_render::handler::RenderHandler;
//!
//! struct Wakeup {
//!     pending: bool,
//! }
//!
//! impl RenderHandler for Wakeup {
//!     fn on_chunk_ready(&mut self) {
//!         self.pending = true;
//!     }
//! }
//! ```

use crate::error::Error;

/// Receiver for renderer notifications.
pub trait RenderHandler {
    /// Called each time new bytes become readable.
    fn on_chunk_ready(&mut self) {}

    /// Called exactly once when the whole message has been produced.
    ///
    /// The tail of the message, up to the closing delimiter, may still be
    /// buffered and unread at this point. Keep draining until
    /// [`Renderer::at_end`] before ending the transfer.
    ///
    /// Never called after an abort or a source failure.
    ///
    /// [`Renderer::at_end`]: crate::Renderer::at_end
    fn on_finished(&mut self) {}

    /// Called once when a byte source failure terminates rendering.
    fn on_error(&mut self, error: &Error) {
        let _ = error;
    }
}

/// A handler that ignores all notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl RenderHandler for NoopHandler {}

/// A handler that logs notifications using tracing.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl RenderHandler for LoggingHandler {
    fn on_chunk_ready(&mut self) {
        tracing::trace!("chunk ready");
    }

    fn on_finished(&mut self) {
        tracing::debug!("render finished");
    }

    fn on_error(&mut self, error: &Error) {
        tracing::warn!(%error, "render failed");
    }
}

/// A handler that collects events for later processing.
///
/// Useful for testing.
#[derive(Debug, Default, Clone)]
pub struct CollectingHandler {
    /// Collected events.
    pub events: Vec<RenderEvent>,
}

impl CollectingHandler {
    /// Creates a new collecting handler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of chunk-ready notifications received.
    #[must_use]
    pub fn chunk_ready_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, RenderEvent::ChunkReady))
            .count()
    }

    /// Number of finished notifications received.
    #[must_use]
    pub fn finished_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, RenderEvent::Finished))
            .count()
    }

    /// Clears all collected events.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Takes all collected events, leaving the handler empty.
    pub fn take(&mut self) -> Vec<RenderEvent> {
        std::mem::take(&mut self.events)
    }
}

impl RenderHandler for CollectingHandler {
    fn on_chunk_ready(&mut self) {
        self.events.push(RenderEvent::ChunkReady);
    }

    fn on_finished(&mut self) {
        self.events.push(RenderEvent::Finished);
    }

    fn on_error(&mut self, error: &Error) {
        self.events.push(RenderEvent::Failed(error.to_string()));
    }
}

/// A recorded renderer notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderEvent {
    /// New bytes became readable.
    ChunkReady,
    /// The message was fully produced.
    Finished,
    /// Rendering failed; carries the error text.
    Failed(String),
}
