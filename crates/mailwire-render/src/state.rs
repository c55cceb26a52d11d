//! Renderer state types.

/// Renderer state.
///
/// ```text
/// Idle ──render_message()──→ EmittingBoundary ⇄ EmittingPartBody
///                                   │                  │
///                                   └──────→ Finished ←┘
/// ```
///
/// - `Idle`: constructed, nothing produced yet
/// - `EmittingBoundary`: producing headers, delimiters and in-memory content
/// - `EmittingPartBody`: a byte source is attached; waiting for its
///   data-ready and end-of-stream notifications
/// - `Finished`: completed, aborted or failed; terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderState {
    /// Nothing produced yet.
    #[default]
    Idle,
    /// Producing synchronously available bytes.
    EmittingBoundary,
    /// Draining an attached byte source.
    EmittingPartBody,
    /// Terminal state.
    Finished,
}

impl RenderState {
    /// Returns true while production is in progress.
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::EmittingBoundary | Self::EmittingPartBody)
    }

    /// Returns true in the terminal state.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_state_default() {
        assert_eq!(RenderState::default(), RenderState::Idle);
    }

    #[test]
    fn test_is_running() {
        assert!(!RenderState::Idle.is_running());
        assert!(RenderState::EmittingBoundary.is_running());
        assert!(RenderState::EmittingPartBody.is_running());
        assert!(!RenderState::Finished.is_running());
    }

    #[test]
    fn test_is_finished() {
        assert!(RenderState::Finished.is_finished());
        assert!(!RenderState::EmittingPartBody.is_finished());
    }
}
