//! Concrete byte sources.
//!
//! - [`ReaderSource`]: any already-open [`std::io::Read`]; the renderer
//!   never closes it
//! - [`FileSource`]: a file opened lazily, so the renderer owns and closes it
//! - [`channel_source`]: a tokio channel fed by another task

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use mailwire_mime::ByteSource;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

/// Default number of bytes read per readiness event.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

fn read_chunk<R: Read>(reader: &mut R, chunk_size: usize) -> io::Result<(Bytes, bool)> {
    let mut buf = vec![0u8; chunk_size];
    let mut filled = 0;
    while filled < chunk_size {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                buf.truncate(filled);
                return Ok((Bytes::from(buf), true));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok((Bytes::from(buf), false))
}

/// A source over a reader that is already open.
#[derive(Debug)]
pub struct ReaderSource<R> {
    reader: R,
    chunk_size: usize,
    eof: bool,
}

impl<R: Read> ReaderSource<R> {
    /// Wraps `reader`.
    #[must_use]
    pub const fn new(reader: R) -> Self {
        Self::with_chunk_size(reader, DEFAULT_CHUNK_SIZE)
    }

    /// Wraps `reader`, reading at most `chunk_size` bytes per event.
    #[must_use]
    pub const fn with_chunk_size(reader: R, chunk_size: usize) -> Self {
        Self {
            reader,
            chunk_size: if chunk_size == 0 { 1 } else { chunk_size },
            eof: false,
        }
    }

    /// Unwraps the reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read> ByteSource for ReaderSource<R> {
    fn open(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn is_open(&self) -> bool {
        true
    }

    fn at_end(&self) -> bool {
        self.eof
    }

    fn read_available(&mut self) -> io::Result<Bytes> {
        if self.eof {
            return Ok(Bytes::new());
        }
        let (chunk, eof) = read_chunk(&mut self.reader, self.chunk_size)?;
        self.eof = eof;
        Ok(chunk)
    }

    fn close(&mut self) {}
}

/// A file opened on first use.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    file: Option<File>,
    chunk_size: usize,
    eof: bool,
}

impl FileSource {
    /// Creates a source for `path`; the file is not opened yet.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            file: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            eof: false,
        }
    }

    /// Sets the number of bytes read per readiness event.
    #[must_use]
    pub const fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = if chunk_size == 0 { 1 } else { chunk_size };
        self
    }

    /// The file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSource for FileSource {
    fn open(&mut self) -> io::Result<()> {
        if self.file.is_none() {
            self.file = Some(File::open(&self.path)?);
            self.eof = false;
            tracing::debug!(path = %self.path.display(), "Opened file source");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn at_end(&self) -> bool {
        self.eof
    }

    fn read_available(&mut self) -> io::Result<Bytes> {
        let Some(file) = self.file.as_mut() else {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                format!("{} is not open", self.path.display()),
            ));
        };
        if self.eof {
            return Ok(Bytes::new());
        }
        let (chunk, eof) = read_chunk(file, self.chunk_size)?;
        self.eof = eof;
        Ok(chunk)
    }

    fn close(&mut self) {
        if self.file.take().is_some() {
            tracing::debug!(path = %self.path.display(), "Closed file source");
        }
    }
}

/// Creates a channel-backed source and the sender that feeds it.
///
/// Dropping the sender (or calling [`SourceSender::finish`]) ends the
/// stream.
#[must_use]
pub fn channel_source(capacity: usize) -> (SourceSender, ChannelSource) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        SourceSender { tx },
        ChannelSource {
            rx,
            pending: BytesMut::new(),
            closed: false,
            open: false,
        },
    )
}

/// Producer side of a [`ChannelSource`].
#[derive(Debug, Clone)]
pub struct SourceSender {
    tx: mpsc::Sender<Bytes>,
}

impl SourceSender {
    /// Sends a chunk, waiting for channel capacity.
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::BrokenPipe`] if the source was dropped.
    pub async fn send(&self, chunk: impl Into<Bytes>) -> io::Result<()> {
        self.tx
            .send(chunk.into())
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "byte source dropped"))
    }

    /// Sends a chunk without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::WouldBlock`] when the channel is full and
    /// [`io::ErrorKind::BrokenPipe`] if the source was dropped.
    pub fn try_send(&self, chunk: impl Into<Bytes>) -> io::Result<()> {
        self.tx.try_send(chunk.into()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                io::Error::new(io::ErrorKind::WouldBlock, "byte source channel full")
            }
            mpsc::error::TrySendError::Closed(_) => {
                io::Error::new(io::ErrorKind::BrokenPipe, "byte source dropped")
            }
        })
    }

    /// Ends the stream.
    pub fn finish(self) {}
}

/// A source fed through a tokio channel.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<Bytes>,
    pending: BytesMut,
    closed: bool,
    open: bool,
}

impl ByteSource for ChannelSource {
    fn open(&mut self) -> io::Result<()> {
        self.open = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn at_end(&self) -> bool {
        self.closed && self.pending.is_empty()
    }

    fn read_available(&mut self) -> io::Result<Bytes> {
        loop {
            match self.rx.try_recv() {
                Ok(chunk) => self.pending.extend_from_slice(&chunk),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.closed = true;
                    break;
                }
            }
        }
        Ok(self.pending.split().freeze())
    }

    fn close(&mut self) {
        self.open = false;
        self.rx.close();
    }

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if !self.pending.is_empty() || self.closed {
            return Poll::Ready(Ok(()));
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(chunk)) => {
                self.pending.extend_from_slice(&chunk);
                Poll::Ready(Ok(()))
            }
            Poll::Ready(None) => {
                self.closed = true;
                Poll::Ready(Ok(()))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn test_reader_source_chunks() {
        let mut source = ReaderSource::with_chunk_size(Cursor::new(b"abcdefg".to_vec()), 3);
        assert!(source.is_open());
        assert_eq!(&source.read_available().unwrap()[..], b"abc");
        assert_eq!(&source.read_available().unwrap()[..], b"def");
        assert!(!source.at_end());
        assert_eq!(&source.read_available().unwrap()[..], b"g");
        assert!(source.at_end());
        assert!(source.read_available().unwrap().is_empty());
    }

    #[test]
    fn test_reader_source_exact_multiple() {
        let mut source = ReaderSource::with_chunk_size(Cursor::new(b"abcd".to_vec()), 2);
        assert_eq!(&source.read_available().unwrap()[..], b"ab");
        assert_eq!(&source.read_available().unwrap()[..], b"cd");
        assert!(!source.at_end());
        assert!(source.read_available().unwrap().is_empty());
        assert!(source.at_end());
    }

    #[test]
    fn test_file_source_lifecycle() {
        let path = std::env::temp_dir().join(format!(
            "mailwire-file-source-{}.bin",
            uuid::Uuid::new_v4().simple()
        ));
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"attachment bytes")
            .unwrap();

        let mut source = FileSource::new(&path).chunk_size(1024);
        assert!(!source.is_open());
        assert!(source.read_available().is_err());

        source.open().unwrap();
        assert!(source.is_open());
        assert_eq!(&source.read_available().unwrap()[..], b"attachment bytes");
        assert!(source.at_end());

        source.close();
        assert!(!source.is_open());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_file_source_missing() {
        let mut source = FileSource::new("/nonexistent/mailwire/attachment");
        assert!(source.open().is_err());
        assert!(!source.is_open());
    }

    #[test]
    fn test_channel_source_try_send() {
        let (tx, mut source) = channel_source(4);
        tx.try_send(&b"one "[..]).unwrap();
        tx.try_send(Bytes::from_static(b"two")).unwrap();

        assert_eq!(&source.read_available().unwrap()[..], b"one two");
        assert!(source.read_available().unwrap().is_empty());
        assert!(!source.at_end());

        tx.finish();
        assert!(source.read_available().unwrap().is_empty());
        assert!(source.at_end());
    }

    #[test]
    fn test_channel_source_full() {
        let (tx, _source) = channel_source(1);
        tx.try_send(&b"a"[..]).unwrap();
        let err = tx.try_send(&b"b"[..]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_channel_source_poll_ready() {
        let (tx, mut source) = channel_source(4);

        {
            let mut ready = task::spawn(std::future::poll_fn(|cx| source.poll_ready(cx)));
            assert_pending!(ready.poll());
            tx.try_send(&b"x"[..]).unwrap();
            assert!(ready.is_woken());
            assert_ready!(ready.poll()).unwrap();
        }
        assert_eq!(&source.read_available().unwrap()[..], b"x");

        drop(tx);
        let mut ready = task::spawn(std::future::poll_fn(|cx| source.poll_ready(cx)));
        assert_ready!(ready.poll()).unwrap();
        drop(ready);
        assert!(source.at_end());
    }

    #[tokio::test]
    async fn test_channel_send_after_drop() {
        let (tx, source) = channel_source(1);
        drop(source);
        let err = tx.send(&b"lost"[..]).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
