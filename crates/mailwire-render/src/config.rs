//! Render configuration types.

/// Default limit on bytes buffered ahead of the consumer (256 KiB).
pub const DEFAULT_HIGH_WATER_MARK: usize = 256 * 1024;

/// Renderer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RenderConfig {
    /// Host name used in generated message-ids. `None` asks the operating
    /// system.
    pub host_name: Option<String>,
    /// Emit a `Message-ID` header on the root part when it has none.
    pub insert_message_id: bool,
    /// Stop reading from a byte source while this many bytes are buffered
    /// and unread. `None` buffers without limit.
    pub high_water_mark: Option<usize>,
}

impl RenderConfig {
    /// Creates the default configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            host_name: None,
            insert_message_id: true,
            high_water_mark: Some(DEFAULT_HIGH_WATER_MARK),
        }
    }

    /// Creates a configuration builder.
    #[must_use]
    pub const fn builder() -> RenderConfigBuilder {
        RenderConfigBuilder::new()
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for render configuration.
#[derive(Debug, Clone)]
pub struct RenderConfigBuilder {
    config: RenderConfig,
}

impl RenderConfigBuilder {
    /// Creates a new builder with default settings.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            config: RenderConfig::new(),
        }
    }

    /// Sets the host name used in generated message-ids.
    #[must_use]
    pub fn host_name(mut self, host_name: impl Into<String>) -> Self {
        self.config.host_name = Some(host_name.into());
        self
    }

    /// Sets whether a missing root `Message-ID` header is added.
    #[must_use]
    pub const fn insert_message_id(mut self, insert: bool) -> Self {
        self.config.insert_message_id = insert;
        self
    }

    /// Sets the source backpressure limit in bytes.
    #[must_use]
    pub const fn high_water_mark(mut self, bytes: usize) -> Self {
        self.config.high_water_mark = Some(bytes);
        self
    }

    /// Buffers source data without limit.
    #[must_use]
    pub const fn unbounded(mut self) -> Self {
        self.config.high_water_mark = None;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> RenderConfig {
        self.config
    }
}

impl Default for RenderConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
