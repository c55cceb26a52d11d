//! Streaming content collaborators.
//!
//! A leaf part's content is either an in-memory buffer or a [`ByteSource`]:
//! a device-backed stream (file, pipe, channel) that delivers bytes
//! incrementally. The renderer opens the source if needed, drains whatever
//! is available each time the host reports readiness, and closes it again
//! when it was the one that opened it.

use bytes::Bytes;
use std::cell::RefCell;
use std::io;
use std::rc::Rc;
use std::task::{Context, Poll};

/// Shared handle to a byte source.
///
/// Rendering is single-threaded and single-owner, so the handle is an
/// `Rc<RefCell<_>>`: the tree holds one reference, the renderer borrows it
/// while the source is attached.
pub type SharedSource = Rc<RefCell<dyn ByteSource>>;

/// An external stream supplying a leaf part's content.
///
/// Readiness is signalled out of band: a sans-I/O host calls the renderer's
/// `notify_data_ready` / `notify_end_of_stream` when its event loop observes
/// the source, while async hosts await [`ByteSource::poll_ready`].
pub trait ByteSource {
    /// Opens the underlying device.
    ///
    /// # Errors
    ///
    /// Returns the device error if opening fails.
    fn open(&mut self) -> io::Result<()>;

    /// Returns true if the source is open for reading.
    fn is_open(&self) -> bool;

    /// Returns true once every byte has been read and no more will arrive.
    fn at_end(&self) -> bool;

    /// Reads everything currently available without blocking.
    ///
    /// Returns an empty buffer when nothing is available right now.
    ///
    /// # Errors
    ///
    /// Returns the device error if reading fails.
    fn read_available(&mut self) -> io::Result<Bytes>;

    /// Closes the underlying device.
    fn close(&mut self);

    /// Polls until the next data-ready or end-of-stream event.
    ///
    /// Sources whose data is always available (files, in-memory readers)
    /// are always ready.
    ///
    /// # Errors
    ///
    /// Returns the device error if waiting fails.
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let _ = cx;
        Poll::Ready(Ok(()))
    }
}

/// Wraps a concrete source into a [`SharedSource`].
pub fn shared<S: ByteSource + 'static>(source: S) -> SharedSource {
    Rc::new(RefCell::new(source))
}
