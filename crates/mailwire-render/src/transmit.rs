//! Async transmit driver.
//!
//! Pumps a [`Renderer`] into any [`AsyncWrite`], acting as the host event
//! loop for its byte sources: when the renderer is suspended on a source,
//! the driver awaits [`ByteSource::poll_ready`] and delivers the matching
//! notification.
//!
//! [`ByteSource::poll_ready`]: mailwire_mime::ByteSource::poll_ready

use std::future::poll_fn;
use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::handler::RenderHandler;
use crate::renderer::Renderer;
use crate::state::RenderState;

/// Renders the whole message into `writer`.
///
/// Starts the renderer if it is idle. Returns the number of bytes written.
///
/// # Errors
///
/// Returns the source error that terminated rendering, [`Error::Aborted`]
/// if rendering stopped without completing, or [`Error::Io`] if writing
/// fails.
pub async fn transmit<H, W>(renderer: &mut Renderer<'_, H>, writer: &mut W) -> Result<u64>
where
    H: RenderHandler,
    W: AsyncWrite + Unpin + ?Sized,
{
    if renderer.state() == RenderState::Idle {
        renderer.render_message()?;
    }

    let mut written: u64 = 0;
    loop {
        while let Some(data) = renderer.data_pointer() {
            let n = writer.write(data).await?;
            if n == 0 {
                renderer.abort();
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "writer accepted no bytes",
                )));
            }
            trace!(n, "Wrote rendered bytes");
            renderer.advance_data_pointer(n)?;
            written += n as u64;
        }

        if renderer.at_end() {
            break;
        }

        let Some(source) = renderer.active_source() else {
            // Not finished, nothing buffered, nothing to wait on
            return Err(renderer.take_error().unwrap_or(Error::Aborted));
        };

        let ready = poll_fn(|cx| source.borrow_mut().poll_ready(cx)).await;
        match ready {
            Ok(()) => {
                let at_end = source.borrow().at_end();
                if at_end {
                    renderer.notify_end_of_stream();
                } else {
                    renderer.notify_data_ready();
                }
            }
            Err(e) => renderer.notify_source_error(e),
        }
    }

    if !renderer.is_complete() {
        return Err(renderer.take_error().unwrap_or(Error::Aborted));
    }

    writer.flush().await?;
    debug!(written, message_id = %renderer.message_id(), "Message transmitted");
    Ok(written)
}
