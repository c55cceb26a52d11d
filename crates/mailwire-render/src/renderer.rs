//! The rendering state machine.
//!
//! A [`Renderer`] walks a borrowed part tree and turns it into SMTP
//! wire-ready bytes. Production is demand driven: the renderer only produces
//! more once the consumer has drained what is buffered, and it suspends
//! whenever a leaf's content has to come from a [`ByteSource`].
//!
//! ```ignore
//! use mailwire_render::Renderer;
//!
//! let mut renderer = Renderer::new(&message);
//! renderer.render_message()?;
//! while let Some(data) = renderer.data_pointer() {
//!     let n = socket.write(data)?;
//!     renderer.advance_data_pointer(n)?;
//! }
//! ```
//!
//! [`ByteSource`]: mailwire_mime::ByteSource

use std::io;

use bytes::{BufMut, Bytes, BytesMut};
use mailwire_mime::{Body, Part, SharedSource};
use tracing::{debug, trace, warn};

use crate::buffer::BufferQueue;
use crate::config::RenderConfig;
use crate::error::{Error, Result};
use crate::handler::{NoopHandler, RenderHandler};
use crate::message_id::MessageId;
use crate::state::RenderState;
use crate::traversal::TraversalStack;

/// A byte source attached as the current leaf's content.
struct Attachment {
    source: SharedSource,
    /// The renderer opened the source and must close it.
    owned: bool,
    /// A data-ready notification was held back by the high-water mark.
    read_deferred: bool,
    /// End-of-stream was announced; keep reading until the source is dry.
    end_announced: bool,
}

impl Attachment {
    const fn has_pending_read(&self) -> bool {
        self.read_deferred || self.end_announced
    }

    fn release(self) {
        if self.owned {
            self.source.borrow_mut().close();
        }
    }
}

/// Renders one message tree into wire-ready bytes.
pub struct Renderer<'a, H: RenderHandler = NoopHandler> {
    root: &'a Part,
    config: RenderConfig,
    message_id: MessageId,
    state: RenderState,
    queue: BufferQueue,
    stack: TraversalStack<'a>,
    attachment: Option<Attachment>,
    error: Option<Error>,
    completed: bool,
    unsignalled: bool,
    handler: H,
}

impl<'a> Renderer<'a> {
    /// Creates a renderer with the default configuration and no handler.
    #[must_use]
    pub fn new(message: &'a Part) -> Self {
        Self::with_config(message, RenderConfig::default(), NoopHandler)
    }
}

impl<'a, H: RenderHandler> Renderer<'a, H> {
    /// Creates a renderer that reports to `handler`.
    #[must_use]
    pub fn with_handler(message: &'a Part, handler: H) -> Self {
        Self::with_config(message, RenderConfig::default(), handler)
    }

    /// Creates a renderer with explicit configuration.
    ///
    /// The message-id is fixed here, before any byte is produced.
    #[must_use]
    pub fn with_config(message: &'a Part, config: RenderConfig, handler: H) -> Self {
        let message_id = MessageId::for_part(message, &config);
        Self {
            root: message,
            config,
            message_id,
            state: RenderState::Idle,
            queue: BufferQueue::new(),
            stack: TraversalStack::new(),
            attachment: None,
            error: None,
            completed: false,
            unsignalled: false,
            handler,
        }
    }

    /// The message identifier token.
    #[must_use]
    pub const fn message_id(&self) -> &MessageId {
        &self.message_id
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> RenderState {
        self.state
    }

    /// Readable bytes, or `None` if nothing is available right now.
    #[must_use]
    pub fn data_pointer(&self) -> Option<&[u8]> {
        self.queue.front()
    }

    /// Number of bytes readable through [`Renderer::data_pointer`].
    #[must_use]
    pub fn bytes_available(&self) -> usize {
        self.queue.front_len()
    }

    /// Total bytes buffered and not yet consumed.
    #[must_use]
    pub const fn bytes_buffered(&self) -> usize {
        self.queue.buffered()
    }

    /// Consumes `n` readable bytes.
    ///
    /// Draining the buffer resumes production, or a read that was held
    /// back by the high-water mark.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUsage`] if `n` exceeds
    /// [`Renderer::bytes_available`].
    pub fn advance_data_pointer(&mut self, n: usize) -> Result<()> {
        self.queue.advance(n)?;

        let resume = match self.state {
            RenderState::EmittingBoundary => self.queue.is_empty(),
            RenderState::EmittingPartBody => {
                !self.over_high_water()
                    && self
                        .attachment
                        .as_ref()
                        .is_some_and(Attachment::has_pending_read)
            }
            RenderState::Idle | RenderState::Finished => false,
        };
        if resume {
            self.run();
        }
        Ok(())
    }

    /// Returns true once the message is complete and fully consumed, or
    /// rendering was aborted.
    #[must_use]
    pub fn at_end(&self) -> bool {
        self.state.is_finished() && self.queue.is_empty()
    }

    /// Returns true if the whole message was produced, as opposed to an
    /// abort or a source failure.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.completed
    }

    /// Returns true while rendering is in progress.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Returns true while suspended on a byte source with nothing left to
    /// read until its next notification.
    #[must_use]
    pub fn awaiting_source(&self) -> bool {
        self.state == RenderState::EmittingPartBody
            && self
                .attachment
                .as_ref()
                .is_some_and(|a| !a.has_pending_read())
    }

    /// The attached byte source, if any.
    #[must_use]
    pub fn active_source(&self) -> Option<SharedSource> {
        self.attachment.as_ref().map(|a| a.source.clone())
    }

    /// The error that terminated rendering, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Takes the error that terminated rendering.
    pub fn take_error(&mut self) -> Option<Error> {
        self.error.take()
    }

    /// The notification handler.
    #[must_use]
    pub const fn handler(&self) -> &H {
        &self.handler
    }

    /// The notification handler, mutably.
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// The configuration in use.
    #[must_use]
    pub const fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Starts producing the message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUsage`] unless the renderer is idle.
    pub fn render_message(&mut self) -> Result<()> {
        if self.state != RenderState::Idle {
            return Err(Error::invalid_usage(format!(
                "render_message called in state {:?}",
                self.state
            )));
        }

        debug!(message_id = %self.message_id, "Rendering message");
        self.state = RenderState::EmittingBoundary;

        let root = self.root;
        let mut out = BytesMut::new();
        self.enter(root, true, &mut out);
        self.flush(&mut out);
        self.run();
        Ok(())
    }

    /// Stops rendering immediately.
    ///
    /// Buffered bytes are discarded, an attached source is released and
    /// `on_finished` is never called. Safe to call in any state; later
    /// source notifications are ignored.
    pub fn abort(&mut self) {
        if self.state == RenderState::Finished && self.queue.is_empty() {
            return;
        }
        debug!(message_id = %self.message_id, state = ?self.state, "Render aborted");
        self.shutdown();
    }

    /// Delivers a data-ready notification from the attached source.
    ///
    /// Ignored when no source is attached.
    pub fn notify_data_ready(&mut self) {
        if self.state != RenderState::EmittingPartBody || self.attachment.is_none() {
            trace!("Ignoring stale data-ready notification");
            return;
        }
        self.run();
    }

    /// Delivers an end-of-stream notification from the attached source.
    ///
    /// Whatever the source still holds is read first. Ignored when no
    /// source is attached.
    pub fn notify_end_of_stream(&mut self) {
        if self.state != RenderState::EmittingPartBody {
            trace!("Ignoring stale end-of-stream notification");
            return;
        }
        let Some(attachment) = self.attachment.as_mut() else {
            return;
        };
        attachment.end_announced = true;
        self.run();
    }

    /// Reports a failure of the attached source observed by the host.
    ///
    /// Ignored when no source is attached.
    pub fn notify_source_error(&mut self, error: io::Error) {
        if self.state != RenderState::EmittingPartBody || self.attachment.is_none() {
            return;
        }
        self.fail(Error::Source(error));
    }

    /// Drives production until more data has to be awaited.
    fn run(&mut self) {
        loop {
            let progressed = match self.state {
                RenderState::EmittingBoundary => self.produce(),
                RenderState::EmittingPartBody => self.drain_source(),
                RenderState::Idle | RenderState::Finished => false,
            };
            if !progressed {
                break;
            }
        }
        self.signal();
    }

    /// Synchronous production loop.
    ///
    /// Stops once content is buffered for the consumer, a source has been
    /// attached, or the tree is exhausted. Returns true when a source was
    /// attached and should be drained right away.
    fn produce(&mut self) -> bool {
        let mut out = BytesMut::new();

        while self.state == RenderState::EmittingBoundary && self.queue.is_empty() {
            let Some(frame) = self.stack.top_mut() else {
                self.flush(&mut out);
                self.complete();
                return false;
            };

            out.put_slice(&frame.boundary_line());
            let child = frame.current();
            frame.advance();

            match child {
                Some(child) => self.enter(child, false, &mut out),
                None => {
                    self.stack.pop();
                }
            }
        }

        self.flush(&mut out);
        self.state == RenderState::EmittingPartBody
    }

    /// Emits a part's headers and either opens its frame or its content.
    fn enter(&mut self, part: &'a Part, is_root: bool, out: &mut BytesMut) {
        if is_root && self.config.insert_message_id && part.message_id().is_none() {
            out.put_slice(b"Message-ID: ");
            out.put_slice(self.message_id.as_str().as_bytes());
            out.put_slice(b"\r\n");
        }
        part.headers().write_to(out);
        out.put_slice(b"\r\n");

        match part {
            Part::Multipart(multipart) => {
                trace!(
                    depth = self.stack.depth() + 1,
                    children = multipart.children.len(),
                    "Entering multipart"
                );
                self.stack.push(multipart);
            }
            Part::Leaf(leaf) => {
                self.flush(out);
                match &leaf.body {
                    Body::Bytes(content) => self.enqueue(content.clone()),
                    Body::Source(source) => self.attach(source.clone()),
                }
            }
        }
    }

    fn attach(&mut self, source: SharedSource) {
        let opened = {
            let mut device = source.borrow_mut();
            if device.is_open() {
                Ok(false)
            } else {
                device.open().map(|()| true)
            }
        };

        match opened {
            Ok(owned) => {
                debug!(owned, "Attached byte source");
                self.attachment = Some(Attachment {
                    source,
                    owned,
                    read_deferred: false,
                    end_announced: false,
                });
                self.state = RenderState::EmittingPartBody;
            }
            Err(e) => self.fail(Error::Source(e)),
        }
    }

    /// Reads what the attached source has available.
    ///
    /// Returns true when the source is exhausted and traversal resumed.
    fn drain_source(&mut self) -> bool {
        loop {
            let over = self.over_high_water();
            let Some(attachment) = self.attachment.as_mut() else {
                return false;
            };
            if over {
                trace!(
                    buffered = self.queue.buffered(),
                    "High-water mark reached, deferring read"
                );
                attachment.read_deferred = true;
                return false;
            }
            attachment.read_deferred = false;
            let ending = attachment.end_announced;

            let read = {
                let mut device = attachment.source.borrow_mut();
                device.read_available().map(|chunk| (chunk, device.at_end()))
            };
            let (chunk, at_end) = match read {
                Ok(read) => read,
                Err(e) => {
                    self.fail(Error::Source(e));
                    return false;
                }
            };

            let got_data = !chunk.is_empty();
            if got_data {
                trace!(len = chunk.len(), "Read from byte source");
                self.enqueue(chunk);
            }

            if at_end || (ending && !got_data) {
                self.detach();
                return true;
            }
            if !ending {
                return false;
            }
        }
    }

    /// Releases the exhausted source and resumes traversal.
    fn detach(&mut self) {
        if let Some(attachment) = self.attachment.take() {
            debug!(owned = attachment.owned, "Byte source exhausted");
            attachment.release();
        }
        self.state = RenderState::EmittingBoundary;
    }

    fn complete(&mut self) {
        debug!(message_id = %self.message_id, "Message rendered");
        self.stack.clear();
        self.state = RenderState::Finished;
        self.completed = true;
        self.signal();
        self.handler.on_finished();
    }

    fn fail(&mut self, error: Error) {
        warn!(%error, message_id = %self.message_id, "Rendering failed");
        self.shutdown();
        self.handler.on_error(&error);
        self.error = Some(error);
    }

    fn shutdown(&mut self) {
        if let Some(attachment) = self.attachment.take() {
            attachment.release();
        }
        self.queue.clear();
        self.stack.clear();
        self.unsignalled = false;
        self.state = RenderState::Finished;
    }

    fn enqueue(&mut self, chunk: Bytes) {
        if !chunk.is_empty() {
            self.queue.push(chunk);
            self.unsignalled = true;
        }
    }

    fn flush(&mut self, out: &mut BytesMut) {
        if !out.is_empty() {
            let chunk = out.split().freeze();
            self.enqueue(chunk);
        }
    }

    fn signal(&mut self) {
        if self.unsignalled {
            self.unsignalled = false;
            self.handler.on_chunk_ready();
        }
    }

    /// An empty queue is never over the mark, so a mark of zero still
    /// lets one read through each time the consumer catches up.
    fn over_high_water(&self) -> bool {
        !self.queue.is_empty()
            && self
                .config
                .high_water_mark
                .is_some_and(|limit| self.queue.buffered() >= limit)
    }
}

impl<H: RenderHandler> Drop for Renderer<'_, H> {
    fn drop(&mut self) {
        if let Some(attachment) = self.attachment.take() {
            attachment.release();
        }
    }
}

impl<H: RenderHandler> std::fmt::Debug for Renderer<'_, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("message_id", &self.message_id)
            .field("state", &self.state)
            .field("buffered", &self.queue.buffered())
            .field("depth", &self.stack.depth())
            .field("source_attached", &self.attachment.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::needless_collect,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use crate::handler::{CollectingHandler, RenderEvent};
    use mailwire_mime::{ByteSource, Headers, Leaf, Multipart};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// Fake device: tests decide when bytes become available.
    #[derive(Default)]
    struct FakeSource {
        available: VecDeque<Bytes>,
        ended: bool,
        open: bool,
        opens: usize,
        closes: usize,
        fail_reads: bool,
    }

    impl ByteSource for FakeSource {
        fn open(&mut self) -> io::Result<()> {
            self.open = true;
            self.opens += 1;
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn at_end(&self) -> bool {
            self.ended && self.available.is_empty()
        }

        fn read_available(&mut self) -> io::Result<Bytes> {
            if self.fail_reads {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "device vanished"));
            }
            let mut out = BytesMut::new();
            while let Some(chunk) = self.available.pop_front() {
                out.extend_from_slice(&chunk);
            }
            Ok(out.freeze())
        }

        fn close(&mut self) {
            self.open = false;
            self.closes += 1;
        }
    }

    fn config() -> RenderConfig {
        RenderConfig::builder()
            .host_name("test.local")
            .insert_message_id(false)
            .build()
    }

    fn headers(pairs: &[(&str, &str)]) -> Headers {
        pairs.iter().copied().collect()
    }

    fn drain<H: RenderHandler>(renderer: &mut Renderer<'_, H>) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(data) = renderer.data_pointer() {
            out.extend_from_slice(data);
            let n = data.len();
            renderer.advance_data_pointer(n).unwrap();
        }
        out
    }

    fn fake_leaf(source: &Rc<RefCell<FakeSource>>) -> Leaf {
        let shared: SharedSource = source.clone();
        Leaf::from_source(headers(&[("Content-Type", "application/octet-stream")]), shared)
    }

    #[test]
    fn test_single_leaf() {
        let part = Part::from(Leaf::new(headers(&[("Subject", "Hi")]), "Hello"));
        let mut renderer = Renderer::with_config(&part, config(), CollectingHandler::new());
        assert_eq!(renderer.state(), RenderState::Idle);
        assert!(!renderer.is_running());
        assert_eq!(renderer.data_pointer(), None);

        renderer.render_message().unwrap();
        let out = drain(&mut renderer);

        assert_eq!(out, b"Subject: Hi\r\n\r\nHello");
        assert!(renderer.at_end());
        assert!(renderer.is_complete());
        assert_eq!(renderer.handler().finished_count(), 1);
    }

    #[test]
    fn test_multipart_two_leaves() {
        let mp = Multipart::with_headers(headers(&[("Subject", "Two")]), "mixed", "B1")
            .unwrap()
            .with_child(Leaf::new(Headers::new(), "A"))
            .with_child(Leaf::new(Headers::new(), "B"));
        let part = Part::from(mp);
        let mut renderer = Renderer::with_config(&part, config(), NoopHandler);
        renderer.render_message().unwrap();

        let out = drain(&mut renderer);
        assert_eq!(
            out,
            b"Subject: Two\r\nContent-Type: multipart/mixed; boundary=B1\r\n\r\n\
              --B1\r\n\r\nA\r\n--B1\r\n\r\nB\r\n--B1--\r\n"
                .to_vec()
        );
        assert!(renderer.at_end());
    }

    #[test]
    fn test_nested_multipart_framing() {
        let inner = Multipart::with_headers(Headers::new(), "alternative", "in")
            .unwrap()
            .with_child(Leaf::new(Headers::new(), "plain"))
            .with_child(Leaf::new(Headers::new(), "html"));
        let outer = Multipart::with_headers(Headers::new(), "mixed", "out")
            .unwrap()
            .with_child(inner)
            .with_child(Leaf::new(Headers::new(), "att"));
        let part = Part::from(outer);

        let mut renderer = Renderer::with_config(&part, config(), NoopHandler);
        renderer.render_message().unwrap();
        let out = String::from_utf8(drain(&mut renderer)).unwrap();

        let expected = concat!(
            "Content-Type: multipart/mixed; boundary=out\r\n\r\n",
            "--out\r\n",
            "Content-Type: multipart/alternative; boundary=in\r\n\r\n",
            "--in\r\n\r\nplain",
            "\r\n--in\r\n\r\nhtml",
            "\r\n--in--\r\n",
            "--out\r\n\r\natt",
            "\r\n--out--\r\n",
        );
        assert_eq!(out, expected);
    }

    #[test]
    fn test_production_is_demand_driven() {
        let mp = Multipart::new("mixed", "B")
            .unwrap()
            .with_child(Leaf::new(Headers::new(), "first"))
            .with_child(Leaf::new(Headers::new(), "second"));
        let part = Part::from(mp);
        let mut renderer = Renderer::with_config(&part, config(), CollectingHandler::new());
        renderer.render_message().unwrap();

        let buffered = renderer.bytes_buffered();
        assert!(buffered > 0);
        assert_eq!(renderer.handler().chunk_ready_count(), 1);
        assert_eq!(renderer.state(), RenderState::EmittingBoundary);
        assert!(renderer.is_running());

        // Partial reads do not trigger production
        renderer.advance_data_pointer(1).unwrap();
        assert_eq!(renderer.bytes_buffered(), buffered - 1);
        assert_eq!(renderer.handler().chunk_ready_count(), 1);

        drain(&mut renderer);
        assert!(renderer.at_end());
        assert_eq!(renderer.handler().finished_count(), 1);
        assert_eq!(
            renderer.handler().events.last(),
            Some(&RenderEvent::Finished)
        );
    }

    #[test]
    fn test_message_id_header_inserted_on_root_only() {
        let mp = Multipart::new("mixed", "B")
            .unwrap()
            .with_child(Leaf::new(Headers::new(), "x"));
        let part = Part::from(mp);
        let config = RenderConfig::builder().host_name("h.example").build();
        let mut renderer = Renderer::with_config(&part, config, NoopHandler);
        renderer.render_message().unwrap();
        let out = String::from_utf8(drain(&mut renderer)).unwrap();

        let expected_line = format!("Message-ID: {}\r\n", renderer.message_id());
        assert!(out.starts_with(&expected_line));
        assert_eq!(out.matches("Message-ID").count(), 1);
        assert!(renderer.message_id().as_str().ends_with("@h.example>"));
    }

    #[test]
    fn test_explicit_message_id_not_duplicated() {
        let part = Part::from(Leaf::new(
            headers(&[("Message-ID", "<mine@example.com>")]),
            "x",
        ));
        let mut renderer = Renderer::new(&part);
        assert_eq!(renderer.message_id().as_str(), "<mine@example.com>");
        renderer.render_message().unwrap();
        let out = drain(&mut renderer);
        assert_eq!(out, b"Message-ID: <mine@example.com>\r\n\r\nx");
    }

    #[test]
    fn test_render_twice_is_invalid() {
        let part = Part::from(Leaf::text("x"));
        let mut renderer = Renderer::with_config(&part, config(), NoopHandler);
        renderer.render_message().unwrap();
        assert!(matches!(
            renderer.render_message(),
            Err(Error::InvalidUsage(_))
        ));
    }

    #[test]
    fn test_advance_past_available_is_invalid() {
        let part = Part::from(Leaf::new(Headers::new(), "abc"));
        let mut renderer = Renderer::with_config(&part, config(), NoopHandler);
        assert!(renderer.advance_data_pointer(1).is_err());

        renderer.render_message().unwrap();
        let available = renderer.bytes_available();
        assert!(matches!(
            renderer.advance_data_pointer(available + 1),
            Err(Error::InvalidUsage(_))
        ));
        // Nothing was consumed by the failed call
        assert_eq!(renderer.bytes_available(), available);
    }

    #[test]
    fn test_source_two_chunks() {
        let source = Rc::new(RefCell::new(FakeSource::default()));
        let part = Part::from(fake_leaf(&source));
        let mut renderer = Renderer::with_config(&part, config(), CollectingHandler::new());

        renderer.render_message().unwrap();
        assert_eq!(renderer.state(), RenderState::EmittingPartBody);
        assert!(renderer.awaiting_source());
        assert_eq!(source.borrow().opens, 1);
        let header = drain(&mut renderer);
        assert_eq!(header, b"Content-Type: application/octet-stream\r\n\r\n");
        renderer.handler_mut().clear();

        source.borrow_mut().available.push_back(Bytes::from_static(b"chunk-one;"));
        renderer.notify_data_ready();
        let mut body = drain(&mut renderer);

        source.borrow_mut().available.push_back(Bytes::from_static(b"chunk-two"));
        renderer.notify_data_ready();
        body.extend(drain(&mut renderer));
        assert_eq!(renderer.handler().chunk_ready_count(), 2);

        source.borrow_mut().ended = true;
        renderer.notify_end_of_stream();
        assert!(renderer.at_end());
        assert_eq!(body, b"chunk-one;chunk-two");
        assert_eq!(renderer.handler().chunk_ready_count(), 2);
        assert_eq!(renderer.handler().finished_count(), 1);
        assert_eq!(source.borrow().closes, 1);
    }

    #[test]
    fn test_already_open_source_not_closed() {
        let source = Rc::new(RefCell::new(FakeSource {
            open: true,
            ended: true,
            available: VecDeque::from([Bytes::from_static(b"data")]),
            ..FakeSource::default()
        }));
        let mp = Multipart::new("mixed", "S")
            .unwrap()
            .with_child(fake_leaf(&source))
            .with_child(Leaf::new(Headers::new(), "tail"));
        let part = Part::from(mp);
        let mut renderer = Renderer::with_config(&part, config(), NoopHandler);
        renderer.render_message().unwrap();

        let out = String::from_utf8(drain(&mut renderer)).unwrap();
        assert!(out.contains("\r\n\r\ndata\r\n--S\r\n\r\ntail\r\n--S--\r\n"));
        assert!(renderer.at_end());
        assert_eq!(source.borrow().opens, 0);
        assert_eq!(source.borrow().closes, 0);
    }

    #[test]
    fn test_abort_while_source_attached() {
        let source = Rc::new(RefCell::new(FakeSource::default()));
        let part = Part::from(fake_leaf(&source));
        let mut renderer = Renderer::with_config(&part, config(), CollectingHandler::new());
        renderer.render_message().unwrap();
        assert!(renderer.bytes_available() > 0);

        renderer.abort();
        assert_eq!(renderer.data_pointer(), None);
        assert_eq!(renderer.bytes_available(), 0);
        assert!(renderer.at_end());
        assert!(!renderer.is_running());
        assert!(!renderer.is_complete());
        assert_eq!(source.borrow().closes, 1);
        assert!(renderer.active_source().is_none());

        // Late notifications are no-ops
        source.borrow_mut().available.push_back(Bytes::from_static(b"late"));
        source.borrow_mut().ended = true;
        renderer.notify_data_ready();
        renderer.notify_end_of_stream();
        assert_eq!(renderer.data_pointer(), None);
        assert_eq!(renderer.handler().finished_count(), 0);
    }

    #[test]
    fn test_abort_from_idle_and_after_finish() {
        let part = Part::from(Leaf::new(Headers::new(), "abc"));
        let mut idle = Renderer::with_config(&part, config(), CollectingHandler::new());
        idle.abort();
        assert!(idle.at_end());
        assert!(idle.render_message().is_err());
        assert_eq!(idle.handler().finished_count(), 0);

        let mp = Part::from(
            Multipart::new("mixed", "F")
                .unwrap()
                .with_child(Leaf::new(Headers::new(), "abc")),
        );
        let mut done = Renderer::with_config(&mp, config(), CollectingHandler::new());
        done.render_message().unwrap();
        while done.state() != RenderState::Finished {
            let n = done.bytes_available();
            done.advance_data_pointer(n).unwrap();
        }
        // The close delimiter is still buffered
        assert_eq!(done.data_pointer(), Some(&b"\r\n--F--\r\n"[..]));
        assert!(!done.at_end());
        assert_eq!(done.handler().finished_count(), 1);
        done.abort();
        assert!(done.at_end());
        assert_eq!(done.bytes_available(), 0);
    }

    #[test]
    fn test_source_read_failure() {
        let source = Rc::new(RefCell::new(FakeSource::default()));
        let part = Part::from(fake_leaf(&source));
        let mut renderer = Renderer::with_config(&part, config(), CollectingHandler::new());
        renderer.render_message().unwrap();

        source.borrow_mut().fail_reads = true;
        renderer.notify_data_ready();

        assert!(renderer.at_end());
        assert!(renderer.error().is_some_and(Error::is_source));
        assert_eq!(renderer.handler().finished_count(), 0);
        assert!(matches!(
            renderer.handler().events.last(),
            Some(RenderEvent::Failed(_))
        ));
        assert_eq!(source.borrow().closes, 1);
        assert!(renderer.take_error().is_some());
        assert!(renderer.error().is_none());
    }

    #[test]
    fn test_host_reported_source_error() {
        let source = Rc::new(RefCell::new(FakeSource::default()));
        let part = Part::from(fake_leaf(&source));
        let mut renderer = Renderer::with_config(&part, config(), NoopHandler);

        // Before rendering there is nothing to fail
        renderer.notify_source_error(io::Error::other("early"));
        assert_eq!(renderer.state(), RenderState::Idle);

        renderer.render_message().unwrap();
        renderer.notify_source_error(io::Error::other("connection reset"));
        assert!(renderer.at_end());
        assert!(renderer.error().is_some_and(Error::is_source));
    }

    #[test]
    fn test_high_water_mark_defers_reads() {
        let source = Rc::new(RefCell::new(FakeSource::default()));
        let part = Part::from(Leaf::from_source(Headers::new(), {
            let shared: SharedSource = source.clone();
            shared
        }));
        let config = RenderConfig::builder()
            .insert_message_id(false)
            .high_water_mark(4)
            .build();
        let mut renderer = Renderer::with_config(&part, config, NoopHandler);
        renderer.render_message().unwrap();
        drain(&mut renderer); // blank line

        source.borrow_mut().available.push_back(Bytes::from_static(b"12345"));
        renderer.notify_data_ready();
        assert_eq!(renderer.bytes_buffered(), 5);

        // Over the mark: the next notification leaves data in the source
        source.borrow_mut().available.push_back(Bytes::from_static(b"678"));
        source.borrow_mut().ended = true;
        renderer.notify_data_ready();
        renderer.notify_end_of_stream();
        assert_eq!(renderer.bytes_buffered(), 5);
        assert!(!renderer.awaiting_source());
        assert_eq!(source.borrow().available.len(), 1);

        let out = drain(&mut renderer);
        assert_eq!(out, b"12345678");
        assert!(renderer.at_end());
    }

    #[test]
    fn test_zero_high_water_mark_still_drains_source() {
        let source = Rc::new(RefCell::new(FakeSource::default()));
        let part = Part::from(Leaf::from_source(Headers::new(), {
            let shared: SharedSource = source.clone();
            shared
        }));
        let config = RenderConfig::builder()
            .insert_message_id(false)
            .high_water_mark(0)
            .build();
        let mut renderer = Renderer::with_config(&part, config, NoopHandler);

        source.borrow_mut().available.push_back(Bytes::from_static(b"pay"));
        renderer.render_message().unwrap();
        // Blank line buffered: the first read waits for it to drain
        assert_eq!(source.borrow().available.len(), 1);
        assert_eq!(drain(&mut renderer), b"\r\npay");

        source.borrow_mut().available.push_back(Bytes::from_static(b"load"));
        source.borrow_mut().ended = true;
        renderer.notify_end_of_stream();
        assert_eq!(drain(&mut renderer), b"load");
        assert!(renderer.at_end());
        assert!(renderer.is_complete());
    }

    #[test]
    fn test_empty_multipart_and_empty_leaf() {
        let mp = Multipart::new("mixed", "E").unwrap();
        let part = Part::from(mp);
        let mut renderer = Renderer::with_config(&part, config(), NoopHandler);
        renderer.render_message().unwrap();
        let out = drain(&mut renderer);
        assert!(out.ends_with(b"\r\n\r\n--E--\r\n"));

        let part = Part::from(Leaf::new(Headers::new(), ""));
        let mut renderer = Renderer::with_config(&part, config(), NoopHandler);
        renderer.render_message().unwrap();
        assert_eq!(drain(&mut renderer), b"\r\n");
        assert!(renderer.at_end());
    }

    #[test]
    fn test_drop_closes_owned_source() {
        let source = Rc::new(RefCell::new(FakeSource::default()));
        let part = Part::from(fake_leaf(&source));
        {
            let mut renderer = Renderer::with_config(&part, config(), NoopHandler);
            renderer.render_message().unwrap();
            assert_eq!(source.borrow().opens, 1);
            assert_eq!(source.borrow().closes, 0);
        }
        assert_eq!(source.borrow().closes, 1);
    }
}
