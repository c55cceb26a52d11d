//! Message-id generation.

use std::fmt;

use mailwire_mime::Part;
use uuid::Uuid;

use crate::config::RenderConfig;

/// Host segment used when the host name cannot be determined.
pub const FALLBACK_HOST: &str = "localhost";

/// A message identifier token, `<UUID@HOST>` unless the message supplied
/// its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(String);

impl MessageId {
    /// Generates a fresh identifier for `host`.
    ///
    /// The UUID is a random v4 rendered as uppercase hyphenated hex.
    #[must_use]
    pub fn generate(host: &str) -> Self {
        let mut buf = Uuid::encode_buffer();
        let uuid = Uuid::new_v4().hyphenated().encode_upper(&mut buf);
        Self(format!("<{uuid}@{host}>"))
    }

    /// The identifier for rendering `part`.
    ///
    /// An explicit `Message-ID` header on the part is used verbatim.
    #[must_use]
    pub fn for_part(part: &Part, config: &RenderConfig) -> Self {
        if let Some(explicit) = part.message_id() {
            return Self(explicit.to_string());
        }
        let host = config
            .host_name
            .clone()
            .unwrap_or_else(local_host_name);
        Self::generate(&host)
    }

    /// The identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MessageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The local machine's host name, or [`FALLBACK_HOST`].
#[must_use]
pub fn local_host_name() -> String {
    system_host_name()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| FALLBACK_HOST.to_string())
}

#[cfg(unix)]
fn system_host_name() -> Option<String> {
    match nix::unistd::gethostname() {
        Ok(name) => name.into_string().ok(),
        Err(e) => {
            tracing::debug!(?e, "Host name lookup failed");
            None
        }
    }
}

#[cfg(not(unix))]
fn system_host_name() -> Option<String> {
    std::env::var("COMPUTERNAME").ok()
}
