use crate::browser::Browser;
use dailypull_common::ElementDescriptor;
use std::fmt;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::debug;

/// A condition treated as evidence that a page has finished loading.
#[derive(Debug, Clone, Copy)]
pub enum ReadyProbe<'a> {
    /// The current URL does not contain the fragment, ignoring case.
    UrlLacks(&'a str),
    /// The element resolves.
    Present(&'a ElementDescriptor),
    /// `document.readyState == "complete"`.
    DocumentComplete,
}

impl fmt::Display for ReadyProbe<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadyProbe::UrlLacks(fragment) => write!(f, "url without '{fragment}'"),
            ReadyProbe::Present(descriptor) => write!(f, "presence of {descriptor}"),
            ReadyProbe::DocumentComplete => f.write_str("document complete"),
        }
    }
}

impl ReadyProbe<'_> {
    /// Driver errors count as "not yet".
    async fn holds(&self, browser: &mut dyn Browser) -> bool {
        match self {
            ReadyProbe::UrlLacks(fragment) => browser
                .current_url()
                .await
                .map(|url| !url.to_lowercase().contains(&fragment.to_lowercase()))
                .unwrap_or(false),
            ReadyProbe::Present(descriptor) => {
                matches!(browser.resolve(descriptor).await, Ok(Some(_)))
            }
            ReadyProbe::DocumentComplete => browser
                .ready_state()
                .await
                .map(|state| state == "complete")
                .unwrap_or(false),
        }
    }
}

/// Polls until any probe holds. Returns false once `timeout` has elapsed.
pub async fn wait_for_any(
    browser: &mut dyn Browser,
    probes: &[ReadyProbe<'_>],
    timeout: Duration,
    poll_interval: Duration,
) -> bool {
    let started = Instant::now();
    loop {
        for probe in probes {
            if probe.holds(browser).await {
                debug!("Ready: {} after {:?}", probe, started.elapsed());
                return true;
            }
        }
        if started.elapsed() >= timeout {
            return false;
        }
        sleep(poll_interval).await;
    }
}
