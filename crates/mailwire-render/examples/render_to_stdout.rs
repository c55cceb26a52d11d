#![allow(clippy::expect_used, clippy::uninlined_format_args)]
//! Example: Render a message with a file attachment to stdout
//!
//! Prints the exact bytes an SMTP client would send after `DATA`.
//!
//! ## Running
//!
//! ```bash
//! RUST_LOG=mailwire_render=debug cargo run --package mailwire-render --example render_to_stdout -- Cargo.toml
//! ```

use mailwire_mime::source::shared;
use mailwire_mime::{Headers, Leaf, Multipart, Part, generate_boundary};
use mailwire_render::{FileSource, LoggingHandler, RenderConfig, Renderer, transmit};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "Cargo.toml".to_string());

    let mut headers = Headers::new();
    headers.add("From", "sender@example.com");
    headers.add("To", "recipient@example.com");
    headers.add("Subject", "Rendered by mailwire");
    headers.add("MIME-Version", "1.0");

    let mut attachment = Headers::new();
    attachment.add("Content-Type", "text/plain; charset=utf-8");
    attachment.add(
        "Content-Disposition",
        format!("attachment; filename=\"{}\"", path),
    );

    let message = Multipart::with_headers(headers, "mixed", generate_boundary())?
        .with_child(Leaf::text("The attachment follows."))
        .with_child(Leaf::from_source(attachment, shared(FileSource::new(&path))));
    let message = Part::from(message);

    let config = RenderConfig::builder().host_name("example.com").build();
    let mut renderer = Renderer::with_config(&message, config, LoggingHandler);

    let mut stdout = tokio::io::stdout();
    let written = transmit(&mut renderer, &mut stdout).await?;
    eprintln!("\n{} bytes, Message-ID {}", written, renderer.message_id());
    Ok(())
}
