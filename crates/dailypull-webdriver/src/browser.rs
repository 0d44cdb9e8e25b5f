use crate::chromedriver::{self, ChromedriverProcess};
use crate::webdriver::{self, WebDriverClient};
use async_trait::async_trait;
use dailypull_engine::browser::{Browser, DriverError, ElementHandle};
use dailypull_engine::config::BrowserConfig;
use dailypull_engine::{ElementDescriptor, LocatorKind};
use fantoccini::Locator;
use fantoccini::elements::Element;
use fantoccini::error::{CmdError, ErrorStatus};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// [`Browser`] backed by a Chrome session over WebDriver.
///
/// Resolved elements are cached per descriptor until the next navigation;
/// a handle that outlives its element surfaces as [`DriverError::Stale`].
pub struct WebDriverBrowser {
    client: Option<WebDriverClient>,
    config: BrowserConfig,
    chromedriver: Option<ChromedriverProcess>,
    elements: HashMap<String, Element>,
}

impl WebDriverBrowser {
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            client: None,
            config,
            chromedriver: None,
            elements: HashMap::new(),
        }
    }

    /// Connect to an already running WebDriver server instead of launching one.
    pub fn with_url(mut config: BrowserConfig, webdriver_url: String) -> Self {
        config.webdriver_url = Some(webdriver_url);
        Self::new(config)
    }

    fn client(&self) -> Result<&WebDriverClient, DriverError> {
        self.client.as_ref().ok_or(DriverError::NotReady)
    }

    fn element(&self, handle: &ElementHandle) -> Result<&Element, DriverError> {
        self.elements.get(handle.id()).ok_or_else(|| DriverError::Stale {
            handle: handle.to_string(),
        })
    }
}

/// XPath and CSS are passed through; the rest become CSS selectors so that
/// every kind goes through `find_all`.
fn locator_query(descriptor: &ElementDescriptor) -> (bool, String) {
    match descriptor.kind {
        LocatorKind::Xpath => (true, descriptor.value.clone()),
        LocatorKind::Css => (false, descriptor.value.clone()),
        LocatorKind::Id => (false, format!("[id=\"{}\"]", css_escape(&descriptor.value))),
        LocatorKind::Name => (false, format!("[name=\"{}\"]", css_escape(&descriptor.value))),
        LocatorKind::Class => (false, format!("[class~=\"{}\"]", css_escape(&descriptor.value))),
    }
}

fn css_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn map_cmd_error(target: &str, err: CmdError) -> DriverError {
    if err.is_no_such_element() {
        return DriverError::NotFound {
            target: target.to_string(),
        };
    }
    match &err {
        CmdError::Standard(wd) => match wd.error {
            ErrorStatus::StaleElementReference => DriverError::Stale {
                handle: target.to_string(),
            },
            ErrorStatus::ElementNotInteractable | ErrorStatus::ElementClickIntercepted => {
                DriverError::NotInteractable {
                    target: target.to_string(),
                    reason: wd.message.to_string(),
                }
            }
            ErrorStatus::JavascriptError => DriverError::Script(wd.message.to_string()),
            ErrorStatus::InvalidSessionId | ErrorStatus::SessionNotCreated => {
                DriverError::Session(wd.message.to_string())
            }
            _ => DriverError::Other(err.to_string()),
        },
        _ => DriverError::Other(err.to_string()),
    }
}

#[async_trait]
impl Browser for WebDriverBrowser {
    async fn launch(&mut self, download_dir: &Path) -> Result<(), DriverError> {
        let webdriver_url = if let Some(url) = &self.config.webdriver_url {
            info!("Connecting to external WebDriver at {}...", url);
            url.clone()
        } else {
            info!(
                "Launching chromedriver on port {}...",
                self.config.chromedriver_port
            );
            let process = chromedriver::launch_chromedriver(
                self.config.chromedriver_port,
                self.config.chromedriver_path.as_deref(),
            )
            .await
            .map_err(DriverError::Session)?;
            let url = process.webdriver_url();
            self.chromedriver = Some(process);
            url
        };

        let capabilities = webdriver::chrome_capabilities(&self.config, download_dir);
        let client = WebDriverClient::connect(&webdriver_url, capabilities)
            .await
            .map_err(|e| DriverError::Session(e.to_string()))?;
        self.client = Some(client);
        info!("Browser session ready (downloads -> {})", download_dir.display());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.elements.clear();
        let result = match self.client.take() {
            Some(client) => client
                .close()
                .await
                .map_err(|e| DriverError::Session(e.to_string())),
            None => Ok(()),
        };
        // Dropping the process handle kills chromedriver.
        self.chromedriver = None;
        result
    }

    async fn is_ready(&self) -> bool {
        self.client.is_some()
    }

    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        let client = self.client()?;
        info!("Navigating to: {}", url);
        client
            .client
            .goto(url)
            .await
            .map_err(|e| DriverError::Navigation(e.to_string()))?;
        self.elements.clear();
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String, DriverError> {
        let client = self.client()?;
        let url = client
            .client
            .current_url()
            .await
            .map_err(|e| DriverError::Navigation(e.to_string()))?;
        Ok(url.to_string())
    }

    async fn resolve(
        &mut self,
        descriptor: &ElementDescriptor,
    ) -> Result<Option<ElementHandle>, DriverError> {
        let client = self.client()?;
        let key = descriptor.to_string();
        let (xpath, query) = locator_query(descriptor);
        let locator = if xpath {
            Locator::XPath(&query)
        } else {
            Locator::Css(&query)
        };

        let found = match client.client.find_all(locator).await {
            Ok(found) => found,
            Err(e) if e.is_no_such_element() => Vec::new(),
            Err(e) => return Err(map_cmd_error(&key, e)),
        };

        match found.into_iter().next() {
            Some(element) => {
                self.elements.insert(key.clone(), element);
                Ok(Some(ElementHandle::new(key)))
            }
            None => {
                debug!("{} not present", key);
                self.elements.remove(&key);
                Ok(None)
            }
        }
    }

    async fn is_interactable(&mut self, handle: &ElementHandle) -> Result<bool, DriverError> {
        let element = self.element(handle)?;
        let displayed = element
            .is_displayed()
            .await
            .map_err(|e| map_cmd_error(handle.id(), e))?;
        if !displayed {
            return Ok(false);
        }
        element
            .is_enabled()
            .await
            .map_err(|e| map_cmd_error(handle.id(), e))
    }

    async fn click(&mut self, handle: &ElementHandle) -> Result<(), DriverError> {
        self.element(handle)?
            .click()
            .await
            .map_err(|e| map_cmd_error(handle.id(), e))
    }

    async fn clear(&mut self, handle: &ElementHandle) -> Result<(), DriverError> {
        self.element(handle)?
            .clear()
            .await
            .map_err(|e| map_cmd_error(handle.id(), e))
    }

    async fn send_keys(&mut self, handle: &ElementHandle, text: &str) -> Result<(), DriverError> {
        self.element(handle)?
            .send_keys(text)
            .await
            .map_err(|e| map_cmd_error(handle.id(), e))
    }

    async fn execute_script(
        &mut self,
        script: &str,
        args: Vec<Value>,
    ) -> Result<Value, DriverError> {
        let client = self.client()?;
        client
            .client
            .execute(script, args)
            .await
            .map_err(|e| match map_cmd_error("script", e) {
                DriverError::Other(message) => DriverError::Script(message),
                other => other,
            })
    }

    async fn execute_on(
        &mut self,
        handle: &ElementHandle,
        script: &str,
        args: Vec<Value>,
    ) -> Result<Value, DriverError> {
        let element = self.element(handle)?;
        let element_arg =
            serde_json::to_value(element).map_err(|e| DriverError::Script(e.to_string()))?;
        let mut all_args = Vec::with_capacity(args.len() + 1);
        all_args.push(element_arg);
        all_args.extend(args);

        let client = self.client()?;
        client
            .client
            .execute(script, all_args)
            .await
            .map_err(|e| match map_cmd_error(handle.id(), e) {
                DriverError::Other(message) => DriverError::Script(message),
                other => other,
            })
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, DriverError> {
        let client = self.client()?;
        client
            .client
            .screenshot()
            .await
            .map_err(|e| DriverError::Other(format!("Screenshot failed: {}", e)))
    }
}

impl Drop for WebDriverBrowser {
    fn drop(&mut self) {
        if self.client.is_some() {
            warn!("Browser dropped without close(); the WebDriver session may linger");
        }
    }
}
