//! Wait/retry/fallback wrapper around single-element actions.
//!
//! Every call polls until the target resolves and is ready for the chosen
//! channel, pauses briefly, then acts. A failed action is retried once after
//! scrolling a freshly resolved handle into view.

pub mod channel;

use crate::browser::{Browser, DriverError, ElementHandle};
use channel::{ChannelStrategy, scripts, strategy_for};
use dailypull_common::error::InteractionError;
use dailypull_common::{ElementDescriptor, InteractionChannel, RetryPolicy};
use std::fmt;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

/// What to do with an element once it is ready.
#[derive(Clone, PartialEq, Eq)]
pub enum Action {
    Click,
    TypeText(String),
}

impl Action {
    pub fn type_text(text: impl Into<String>) -> Self {
        Action::TypeText(text.into())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::Click => "click",
            Action::TypeText(_) => "type",
        }
    }
}

// Typed text may be a secret; only its length is ever printed.
impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Click => f.write_str("click"),
            Action::TypeText(text) => write!(f, "type ({} chars)", text.chars().count()),
        }
    }
}

/// Last observation of the polling loop.
enum Readiness {
    Ready(ElementHandle),
    /// Resolved on the last poll but never ready for the channel.
    Present,
    Absent(Option<DriverError>),
}

pub async fn click(
    browser: &mut dyn Browser,
    target: &ElementDescriptor,
    channel: InteractionChannel,
    policy: &RetryPolicy,
) -> Result<(), InteractionError> {
    perform(browser, target, &Action::Click, channel, policy).await
}

pub async fn type_text(
    browser: &mut dyn Browser,
    target: &ElementDescriptor,
    text: &str,
    channel: InteractionChannel,
    policy: &RetryPolicy,
) -> Result<(), InteractionError> {
    perform(browser, target, &Action::type_text(text), channel, policy).await
}

pub async fn perform(
    browser: &mut dyn Browser,
    target: &ElementDescriptor,
    action: &Action,
    channel: InteractionChannel,
    policy: &RetryPolicy,
) -> Result<(), InteractionError> {
    let strategy = strategy_for(channel);
    let started = Instant::now();

    let handle = match wait_until_ready(browser, strategy, target, policy, started).await {
        Readiness::Ready(handle) => handle,
        Readiness::Present => {
            // Typically an off-screen element; one scroll attempt before giving up.
            warn!(
                "{} present but not ready via {} channel after {:?}, trying scroll fallback",
                target,
                channel,
                started.elapsed()
            );
            return match scroll_and_act(browser, strategy, target, action, policy).await {
                Ok(()) => {
                    info!("{} on {} succeeded after scroll fallback", action, target);
                    Ok(())
                }
                Err(e) => Err(InteractionError::Timeout {
                    target: target.clone(),
                    channel,
                    waited: started.elapsed(),
                    detail: format!("present but never ready; scroll fallback failed: {e}"),
                }),
            };
        }
        Readiness::Absent(last_error) => {
            let detail = match last_error {
                Some(e) => format!("never resolved; last driver error: {e}"),
                None => "never resolved".to_string(),
            };
            return Err(InteractionError::Timeout {
                target: target.clone(),
                channel,
                waited: started.elapsed(),
                detail,
            });
        }
    };

    sleep(policy.post_find_delay).await;
    debug!("{} on {} via {} channel", action, target, channel);

    let primary = match act(browser, strategy, &handle, action).await {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };

    warn!(
        "{} on {} via {} channel failed: {}. Retrying after scroll",
        action, target, channel, primary
    );
    match scroll_and_act(browser, strategy, target, action, policy).await {
        Ok(()) => {
            info!("{} on {} succeeded after scroll fallback", action, target);
            Ok(())
        }
        Err(fallback) => Err(InteractionError::Failed {
            target: target.clone(),
            channel,
            action: action.name().to_string(),
            primary,
            fallback,
        }),
    }
}

/// Polls until ready. Only gives up once `policy.timeout` has fully elapsed.
async fn wait_until_ready(
    browser: &mut dyn Browser,
    strategy: &dyn ChannelStrategy,
    target: &ElementDescriptor,
    policy: &RetryPolicy,
    started: Instant,
) -> Readiness {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let observed = match browser.resolve(target).await {
            Ok(Some(handle)) => match strategy.is_ready(browser, &handle).await {
                Ok(true) => return Readiness::Ready(handle),
                Ok(false) => Readiness::Present,
                Err(e) => Readiness::Absent(Some(e)),
            },
            Ok(None) => Readiness::Absent(None),
            Err(e) => Readiness::Absent(Some(e)),
        };

        if started.elapsed() >= policy.timeout {
            return observed;
        }
        match &observed {
            Readiness::Absent(Some(e)) if !e.is_transient() => {
                debug!("Polling {} (attempt {}): {}", target, attempt, e)
            }
            _ => debug!("Waiting for {} (attempt {})", target, attempt),
        }
        sleep(policy.poll_interval).await;
    }
}

async fn act(
    browser: &mut dyn Browser,
    strategy: &dyn ChannelStrategy,
    handle: &ElementHandle,
    action: &Action,
) -> Result<(), DriverError> {
    match action {
        Action::Click => strategy.click(browser, handle).await,
        Action::TypeText(text) => strategy.type_text(browser, handle, text).await,
    }
}

/// Re-resolves the target, scrolls it into view and repeats the action once.
async fn scroll_and_act(
    browser: &mut dyn Browser,
    strategy: &dyn ChannelStrategy,
    target: &ElementDescriptor,
    action: &Action,
    policy: &RetryPolicy,
) -> Result<(), DriverError> {
    let handle = browser
        .resolve(target)
        .await?
        .ok_or_else(|| DriverError::NotFound {
            target: target.to_string(),
        })?;
    browser
        .execute_on(&handle, scripts::SCROLL_INTO_VIEW, Vec::new())
        .await?;
    sleep(policy.scroll_settle).await;
    act(browser, strategy, &handle, action).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_display_hides_typed_text() {
        let action = Action::type_text("hunter2");
        assert_eq!(action.to_string(), "type (7 chars)");
        assert!(!format!("{action:?}").contains("hunter2"));
    }
}
