//! Integration tests for the async transmit driver.
//!
//! These use mock writers and channel-fed sources to simulate a transport
//! without a real SMTP connection.

#![allow(clippy::unwrap_used)]

use std::io::{self, Write};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use mailwire_mime::source::shared;
use mailwire_mime::{ByteSource, Headers, Leaf, Multipart, Part};
use mailwire_render::{
    CollectingHandler, Error, FileSource, LoggingHandler, NoopHandler, ReaderSource, RenderConfig,
    Renderer, channel_source, transmit,
};
use tokio::io::AsyncWrite;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config() -> RenderConfig {
    RenderConfig::builder()
        .host_name("test.local")
        .insert_message_id(false)
        .build()
}

/// Mock transport that accepts a few bytes per write and is pending on
/// every other call.
struct SlowWriter {
    written: Vec<u8>,
    max_write: usize,
    pending_next: bool,
    flushed: bool,
}

impl SlowWriter {
    fn new(max_write: usize) -> Self {
        Self {
            written: Vec::new(),
            max_write,
            pending_next: false,
            flushed: false,
        }
    }
}

impl AsyncWrite for SlowWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.pending_next {
            self.pending_next = false;
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }
        self.pending_next = true;
        let n = buf.len().min(self.max_write);
        self.written.extend_from_slice(&buf[..n]);
        Poll::Ready(Ok(n))
    }

    fn poll_flush(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.flushed = true;
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Mock transport whose peer stopped reading.
struct ClosedWriter;

impl AsyncWrite for ClosedWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Ok(0))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Source whose device reports an error once the host waits on it.
struct HungUpSource {
    open: bool,
}

impl ByteSource for HungUpSource {
    fn open(&mut self) -> io::Result<()> {
        self.open = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn at_end(&self) -> bool {
        false
    }

    fn read_available(&mut self) -> io::Result<Bytes> {
        Ok(Bytes::new())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed")))
    }
}

#[tokio::test]
async fn test_transmit_channel_fed_attachment() {
    init_tracing();
    let (tx, source) = channel_source(1);
    let message = Multipart::new("mixed", "B1")
        .unwrap()
        .with_child(Leaf::text("see attached"))
        .with_child(Leaf::from_source(Headers::new(), shared(source)));
    let part = Part::from(message);

    let producer = tokio::spawn(async move {
        tx.send(&b"first "[..]).await.unwrap();
        tokio::task::yield_now().await;
        tx.send(&b"second"[..]).await.unwrap();
        tx.finish();
    });

    let mut renderer = Renderer::with_config(&part, config(), LoggingHandler);
    let mut out = Vec::new();
    let written = transmit(&mut renderer, &mut out).await.unwrap();
    producer.await.unwrap();

    let text = String::from_utf8(out).unwrap();
    assert_eq!(written, text.len() as u64);
    assert!(text.ends_with("--B1\r\n\r\nfirst second\r\n--B1--\r\n"));
    assert!(renderer.is_complete());
}

#[tokio::test]
async fn test_transmit_partial_writes() {
    let message = Multipart::new("alternative", "alt")
        .unwrap()
        .with_child(Leaf::text("plain body"))
        .with_child(Leaf::new(
            [("Content-Type", "text/html")].into_iter().collect(),
            "<p>html body</p>",
        ));
    let part = Part::from(message);

    let mut renderer = Renderer::with_config(&part, config(), CollectingHandler::new());
    let mut writer = SlowWriter::new(3);
    let written = transmit(&mut renderer, &mut writer).await.unwrap();

    assert_eq!(written, writer.written.len() as u64);
    assert!(writer.flushed);
    let text = String::from_utf8(writer.written).unwrap();
    assert!(text.starts_with("Content-Type: multipart/alternative; boundary=alt\r\n\r\n--alt\r\n"));
    assert!(text.ends_with("<p>html body</p>\r\n--alt--\r\n"));
    assert_eq!(renderer.handler().finished_count(), 1);
}

#[tokio::test]
async fn test_transmit_file_attachment() {
    let path = std::env::temp_dir().join(format!(
        "mailwire-transmit-{}.txt",
        uuid::Uuid::new_v4().simple()
    ));
    std::fs::File::create(&path)
        .unwrap()
        .write_all(&[b'z'; 10_000])
        .unwrap();

    let source = shared(FileSource::new(&path).chunk_size(1024));
    let part = Part::from(Leaf::from_source(
        [("Content-Type", "application/octet-stream")]
            .into_iter()
            .collect(),
        source.clone(),
    ));

    let config = RenderConfig::builder()
        .insert_message_id(false)
        .high_water_mark(2048)
        .build();
    let mut renderer = Renderer::with_config(&part, config, NoopHandler);
    let mut writer = SlowWriter::new(700);
    transmit(&mut renderer, &mut writer).await.unwrap();

    let header = b"Content-Type: application/octet-stream\r\n\r\n";
    assert_eq!(writer.written.len(), header.len() + 10_000);
    assert!(writer.written[header.len()..].iter().all(|b| *b == b'z'));
    assert!(!source.borrow().is_open());
    std::fs::remove_file(&path).unwrap();
}

#[tokio::test]
async fn test_transmit_zero_high_water_mark() {
    let source = shared(ReaderSource::new(io::Cursor::new(b"payload".to_vec())));
    let part = Part::from(Leaf::from_source(Headers::new(), source));
    let config = RenderConfig::builder()
        .insert_message_id(false)
        .high_water_mark(0)
        .build();

    let mut renderer = Renderer::with_config(&part, config, NoopHandler);
    let mut out = Vec::new();
    let written = transmit(&mut renderer, &mut out).await.unwrap();

    assert_eq!(out, b"\r\npayload");
    assert_eq!(written, 9);
}

#[tokio::test]
async fn test_transmit_source_error() {
    let source = shared(HungUpSource { open: false });
    let message = Multipart::new("mixed", "b")
        .unwrap()
        .with_child(Leaf::from_source(Headers::new(), source.clone()));
    let part = Part::from(message);

    let mut renderer = Renderer::with_config(&part, config(), CollectingHandler::new());
    let mut out = Vec::new();
    let err = transmit(&mut renderer, &mut out).await.unwrap_err();

    assert!(matches!(err, Error::Source(ref e) if e.kind() == io::ErrorKind::BrokenPipe));
    assert!(!source.borrow().is_open());
    assert_eq!(renderer.handler().finished_count(), 0);
}

#[tokio::test]
async fn test_transmit_peer_closed() {
    let (_tx, source) = channel_source(1);
    let source = shared(source);
    let part = Part::from(Leaf::from_source(Headers::new(), source.clone()));

    let mut renderer = Renderer::with_config(&part, config(), NoopHandler);
    let err = transmit(&mut renderer, &mut ClosedWriter).await.unwrap_err();

    assert!(matches!(err, Error::Io(ref e) if e.kind() == io::ErrorKind::WriteZero));
    assert!(renderer.at_end());
    assert!(!source.borrow().is_open());
}

#[tokio::test]
async fn test_transmit_after_completion_writes_nothing() {
    let part = Part::from(Leaf::text("once"));
    let mut renderer = Renderer::new(&part);
    let mut out = Vec::new();
    transmit(&mut renderer, &mut out).await.unwrap();
    let len = out.len();

    assert_eq!(transmit(&mut renderer, &mut out).await.unwrap(), 0);
    assert_eq!(out.len(), len);
    assert!(out.ends_with(b"once"));
}
