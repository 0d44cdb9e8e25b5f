use crate::descriptor::{ElementDescriptor, InteractionChannel};
use crate::error::DriverError;
use std::fmt;
use std::time::Duration;

/// Failure of an interaction after waiting, retrying and falling back.
#[derive(thiserror::Error, Debug, Clone)]
pub enum InteractionError {
    /// The element never became ready within the policy timeout.
    #[error("Timed out after {waited:?} waiting for {target} via {channel} channel ({detail})")]
    Timeout {
        target: ElementDescriptor,
        channel: InteractionChannel,
        waited: Duration,
        detail: String,
    },

    /// The element was located but both the primary action and the
    /// scroll-into-view fallback errored.
    #[error(
        "{action} on {target} via {channel} channel failed: {primary}; scroll fallback failed: {fallback}"
    )]
    Failed {
        target: ElementDescriptor,
        channel: InteractionChannel,
        action: String,
        primary: DriverError,
        fallback: DriverError,
    },

    /// Every candidate of a list failed. One entry per candidate, in order.
    #[error("All {} candidates failed for {action}: {}", .failures.len(), summarize(.failures))]
    AllFailed {
        action: String,
        failures: Vec<CandidateFailure>,
    },
}

impl InteractionError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, InteractionError::Timeout { .. })
    }
}

/// Everything that went wrong with one candidate of a [`crate::CandidateList`].
#[derive(Debug, Clone)]
pub struct CandidateFailure {
    pub index: usize,
    pub descriptor: ElementDescriptor,
    /// One cause per attempted channel, in attempt order.
    pub causes: Vec<InteractionError>,
}

impl fmt::Display for CandidateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}: ", self.index + 1, self.descriptor)?;
        let causes: Vec<String> = self.causes.iter().map(|c| c.to_string()).collect();
        f.write_str(&causes.join(" | "))
    }
}

fn summarize(failures: &[CandidateFailure]) -> String {
    failures
        .iter()
        .map(|failure| failure.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeout(target: ElementDescriptor) -> InteractionError {
        InteractionError::Timeout {
            target,
            channel: InteractionChannel::ScriptInjection,
            waited: Duration::from_secs(2),
            detail: "never resolved".into(),
        }
    }

    #[test]
    fn failed_message_carries_both_causes() {
        let err = InteractionError::Failed {
            target: ElementDescriptor::id("submit"),
            channel: InteractionChannel::Native,
            action: "click".into(),
            primary: DriverError::Other("element click intercepted".into()),
            fallback: DriverError::Script("scrollIntoView is not a function".into()),
        };
        let message = err.to_string();
        assert!(message.contains("element click intercepted"));
        assert!(message.contains("scrollIntoView is not a function"));
    }

    #[test]
    fn all_failed_lists_candidates_in_order() {
        let failures = vec![
            CandidateFailure {
                index: 0,
                descriptor: ElementDescriptor::id("a"),
                causes: vec![timeout(ElementDescriptor::id("a"))],
            },
            CandidateFailure {
                index: 1,
                descriptor: ElementDescriptor::css(".b"),
                causes: vec![timeout(ElementDescriptor::css(".b"))],
            },
        ];
        let err = InteractionError::AllFailed {
            action: "click".into(),
            failures,
        };
        let message = err.to_string();
        assert!(message.starts_with("All 2 candidates failed for click"));
        let first = message.find("#1 id=a").unwrap();
        let second = message.find("#2 css=.b").unwrap();
        assert!(first < second);
    }
}
