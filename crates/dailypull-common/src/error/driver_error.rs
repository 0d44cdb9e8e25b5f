/// Errors surfaced by a browser driver implementation.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    // ============================================================
    // Session Errors
    // ============================================================
    #[error("Browser session not ready")]
    NotReady,

    #[error("Session error: {0}")]
    Session(String),

    // ============================================================
    // Element Errors
    // ============================================================
    #[error("Element {target} not found")]
    NotFound { target: String },

    #[error("Element handle {handle} is stale")]
    Stale { handle: String },

    #[error("Element {target} is not interactable: {reason}")]
    NotInteractable { target: String, reason: String },

    // ============================================================
    // Execution Errors
    // ============================================================
    #[error("Script execution error: {0}")]
    Script(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("{0}")]
    Other(String),
}

impl DriverError {
    /// Errors the interaction engine treats as "keep polling".
    pub fn is_transient(&self) -> bool {
        matches!(self, DriverError::NotFound { .. } | DriverError::Stale { .. })
    }
}
