use async_trait::async_trait;
use dailypull_common::ElementDescriptor;
pub use dailypull_common::error::DriverError;
use serde_json::Value;
use std::fmt;
use std::path::Path;

/// Opaque reference to an element resolved in the current page.
///
/// Handles go stale on navigation or re-render; callers re-resolve the
/// descriptor instead of holding on to them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(String);

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The browser automation driver the engine talks to.
///
/// One implementation drives a real browser over WebDriver; tests use an
/// in-memory page model.
#[async_trait]
pub trait Browser: Send + Sync {
    /// Start a session that saves downloads into `download_dir`.
    async fn launch(&mut self, download_dir: &Path) -> Result<(), DriverError>;

    /// End the session and release driver resources. Safe to call twice.
    async fn close(&mut self) -> Result<(), DriverError>;

    async fn is_ready(&self) -> bool;

    async fn navigate(&mut self, url: &str) -> Result<(), DriverError>;

    async fn current_url(&mut self) -> Result<String, DriverError>;

    /// Look the descriptor up in the current page. `Ok(None)` means absent.
    async fn resolve(
        &mut self,
        descriptor: &ElementDescriptor,
    ) -> Result<Option<ElementHandle>, DriverError>;

    /// Visible and enabled.
    async fn is_interactable(&mut self, handle: &ElementHandle) -> Result<bool, DriverError>;

    async fn click(&mut self, handle: &ElementHandle) -> Result<(), DriverError>;

    async fn clear(&mut self, handle: &ElementHandle) -> Result<(), DriverError>;

    async fn send_keys(&mut self, handle: &ElementHandle, text: &str) -> Result<(), DriverError>;

    /// Run a script in page context and return its JSON-converted result.
    async fn execute_script(&mut self, script: &str, args: Vec<Value>)
    -> Result<Value, DriverError>;

    /// Run a script with the element bound to `arguments[0]`; `args` follow it.
    async fn execute_on(
        &mut self,
        handle: &ElementHandle,
        script: &str,
        args: Vec<Value>,
    ) -> Result<Value, DriverError>;

    /// PNG bytes of the current viewport.
    async fn screenshot(&mut self) -> Result<Vec<u8>, DriverError>;

    async fn ready_state(&mut self) -> Result<String, DriverError> {
        let value = self
            .execute_script("return document.readyState;", Vec::new())
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }
}
