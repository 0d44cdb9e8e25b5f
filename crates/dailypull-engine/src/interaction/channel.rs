use crate::browser::{Browser, DriverError, ElementHandle};
use async_trait::async_trait;
use dailypull_common::InteractionChannel;
use serde_json::{Value, json};

/// Scripts injected by the script channel and the scroll fallback.
/// The target element is always `arguments[0]`.
pub mod scripts {
    pub const SCROLL_INTO_VIEW: &str =
        "arguments[0].scrollIntoView({block: 'center', inline: 'nearest'}); return true;";

    pub const CLICK: &str = "arguments[0].click(); return true;";

    /// Sets the value through the prototype setter so frameworks that shadow
    /// `value` on the instance still observe the change, then fires the
    /// events reactive forms listen for.
    pub const SET_VALUE: &str = r#"
const el = arguments[0];
const value = arguments[1];
el.focus();
const proto = el instanceof HTMLTextAreaElement
    ? HTMLTextAreaElement.prototype
    : HTMLInputElement.prototype;
const descriptor = Object.getOwnPropertyDescriptor(proto, 'value');
if (descriptor && descriptor.set) {
    descriptor.set.call(el, '');
    descriptor.set.call(el, value);
} else {
    el.value = '';
    el.value = value;
}
el.dispatchEvent(new Event('input', { bubbles: true }));
el.dispatchEvent(new Event('change', { bubbles: true }));
return el.value;
"#;
}

/// One way of acting on a resolved element.
#[async_trait]
pub trait ChannelStrategy: Send + Sync {
    fn channel(&self) -> InteractionChannel;

    /// Whether the element can be acted on through this channel right now.
    async fn is_ready(
        &self,
        browser: &mut dyn Browser,
        handle: &ElementHandle,
    ) -> Result<bool, DriverError>;

    async fn click(&self, browser: &mut dyn Browser, handle: &ElementHandle)
    -> Result<(), DriverError>;

    /// Replace the element's value with `text`.
    async fn type_text(
        &self,
        browser: &mut dyn Browser,
        handle: &ElementHandle,
        text: &str,
    ) -> Result<(), DriverError>;
}

/// Driver-level click and keystroke simulation.
pub struct NativeChannel;

#[async_trait]
impl ChannelStrategy for NativeChannel {
    fn channel(&self) -> InteractionChannel {
        InteractionChannel::Native
    }

    async fn is_ready(
        &self,
        browser: &mut dyn Browser,
        handle: &ElementHandle,
    ) -> Result<bool, DriverError> {
        browser.is_interactable(handle).await
    }

    async fn click(
        &self,
        browser: &mut dyn Browser,
        handle: &ElementHandle,
    ) -> Result<(), DriverError> {
        browser.click(handle).await
    }

    async fn type_text(
        &self,
        browser: &mut dyn Browser,
        handle: &ElementHandle,
        text: &str,
    ) -> Result<(), DriverError> {
        browser.clear(handle).await?;
        browser.send_keys(handle, text).await
    }
}

/// Direct DOM mutation through injected scripts. Ignores visibility.
pub struct ScriptChannel;

#[async_trait]
impl ChannelStrategy for ScriptChannel {
    fn channel(&self) -> InteractionChannel {
        InteractionChannel::ScriptInjection
    }

    async fn is_ready(
        &self,
        _browser: &mut dyn Browser,
        _handle: &ElementHandle,
    ) -> Result<bool, DriverError> {
        Ok(true)
    }

    async fn click(
        &self,
        browser: &mut dyn Browser,
        handle: &ElementHandle,
    ) -> Result<(), DriverError> {
        browser
            .execute_on(handle, scripts::CLICK, Vec::new())
            .await
            .map(|_| ())
    }

    async fn type_text(
        &self,
        browser: &mut dyn Browser,
        handle: &ElementHandle,
        text: &str,
    ) -> Result<(), DriverError> {
        let observed = browser
            .execute_on(handle, scripts::SET_VALUE, vec![json!(text)])
            .await?;
        match observed {
            Value::String(value) if value == text => Ok(()),
            Value::String(value) => Err(DriverError::Script(format!(
                "value read back with {} chars, expected {}",
                value.chars().count(),
                text.chars().count()
            ))),
            other => Err(DriverError::Script(format!(
                "value read back as non-string {other}"
            ))),
        }
    }
}

static NATIVE: NativeChannel = NativeChannel;
static SCRIPT: ScriptChannel = ScriptChannel;

pub fn strategy_for(channel: InteractionChannel) -> &'static dyn ChannelStrategy {
    match channel {
        InteractionChannel::Native => &NATIVE,
        InteractionChannel::ScriptInjection => &SCRIPT,
    }
}
