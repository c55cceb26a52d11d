//! # mailwire-mime
//!
//! The message tree consumed by the mailwire renderer.
//!
//! ## Features
//!
//! - **Part tree**: leaf bodies and multipart containers, built once and
//!   walked read-only while rendering
//! - **Ordered headers**: duplicates allowed, insertion order preserved on
//!   the wire
//! - **Content types**: parsing and formatting with boundary helpers
//! - **Byte sources**: the contract for leaf content streamed from a device
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailwire_mime::{Headers, Leaf, Multipart, Part};
//!
//! let mut headers = Headers::new();
//! headers.add("From", "sender@example.com");
//! headers.add("To", "recipient@example.com");
//! headers.add("Subject", "Report");
//!
//! let message = Multipart::with_headers(headers, "mixed", "B1")?
//!     .with_child(Leaf::text("See attached."))
//!     .with_child(Leaf::text("Second part"));
//!
//! let root = Part::from(message);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod content_type;
mod error;
mod header;
mod part;

pub mod source;

pub use content_type::ContentType;
pub use error::{Error, Result};
pub use header::Headers;
pub use part::{
    Body, Leaf, MAX_BOUNDARY_LEN, Multipart, Part, generate_boundary, validate_boundary,
};
pub use source::{ByteSource, SharedSource};
