//! # mailwire-render
//!
//! Turns a MIME part tree into the exact bytes an SMTP transport sends
//! after `DATA`, incrementally and without materialising the message.
//!
//! ## Features
//!
//! - **Demand-driven production**: bytes are produced only as the consumer
//!   drains them
//! - **Zero-copy pull interface**: the consumer borrows the front chunk and
//!   advances past what it wrote
//! - **Streaming bodies**: leaf content can come from files, readers or
//!   channels, with backpressure through a high-water mark
//! - **RFC 2046 framing**: delimiter and close-delimiter lines are placed
//!   byte-exactly, CRLF throughout
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailwire_mime::{Headers, Leaf, Multipart, Part};
//! use mailwire_render::{Renderer, transmit};
//!
//! let mut headers = Headers::new();
//! headers.add("From", "sender@example.com");
//! headers.add("Subject", "Report");
//! let message = Part::from(
//!     Multipart::with_headers(headers, "mixed", "B1")?
//!         .with_child(Leaf::text("See attached."))
//!         .with_child(Leaf::from_source(attachment_headers, file_source)),
//! );
//!
//! let mut renderer = Renderer::new(&message);
//! let written = transmit(&mut renderer, &mut socket).await?;
//! ```
//!
//! ## Renderer States
//!
//! ```text
//! ┌──────┐ render_message() ┌──────────────────┐  source attached  ┌──────────────────┐
//! │ Idle │ ───────────────→ │ EmittingBoundary │ ────────────────→ │ EmittingPartBody │
//! └──────┘                  └──────────────────┘ ←──────────────── └──────────────────┘
//!                                    │               end of stream           │
//!                                    └──────────────→ Finished ←─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`buffer`]: output chunk queue
//! - [`traversal`]: explicit part-tree traversal stack
//! - [`renderer`]: the state machine
//! - [`sources`]: file, reader and channel byte sources
//! - [`transmit`]: async driver writing into a tokio writer

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod buffer;
mod config;
mod error;
pub mod handler;
mod message_id;
pub mod renderer;
pub mod sources;
mod state;
pub mod transmit;
pub mod traversal;

pub use config::{DEFAULT_HIGH_WATER_MARK, RenderConfig, RenderConfigBuilder};
pub use error::{Error, Result};
pub use handler::{CollectingHandler, LoggingHandler, NoopHandler, RenderEvent, RenderHandler};
pub use message_id::{FALLBACK_HOST, MessageId, local_host_name};
pub use renderer::Renderer;
pub use sources::{ChannelSource, FileSource, ReaderSource, SourceSender, channel_source};
pub use state::RenderState;
pub use transmit::transmit;
