use crate::browser::Browser;
use crate::interaction::{self, Action};
use dailypull_common::error::{CandidateFailure, InteractionError};
use dailypull_common::{CandidateList, ElementDescriptor, InteractionChannel, RetryPolicy};
use tracing::{info, warn};

/// One channel/policy pair tried against a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    pub channel: InteractionChannel,
    pub policy: RetryPolicy,
}

impl Attempt {
    pub fn new(channel: InteractionChannel, policy: RetryPolicy) -> Self {
        Self { channel, policy }
    }
}

/// Which candidate, and through which channel, got the action done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateHit {
    pub index: usize,
    pub descriptor: ElementDescriptor,
    pub channel: InteractionChannel,
}

/// Tries each candidate once, in order, with the full policy timeout.
pub async fn try_in_order(
    browser: &mut dyn Browser,
    candidates: &CandidateList,
    action: &Action,
    channel: InteractionChannel,
    policy: &RetryPolicy,
) -> Result<CandidateHit, InteractionError> {
    try_in_order_with(browser, candidates, action, &[Attempt::new(channel, *policy)]).await
}

/// Like [`try_in_order`] but runs the whole attempt plan on each candidate
/// before moving to the next. All causes for one candidate are grouped into a
/// single failure entry.
pub async fn try_in_order_with(
    browser: &mut dyn Browser,
    candidates: &CandidateList,
    action: &Action,
    plan: &[Attempt],
) -> Result<CandidateHit, InteractionError> {
    let mut failures = Vec::with_capacity(candidates.len());

    for (index, descriptor) in candidates.iter().enumerate() {
        info!(
            "Trying candidate {}/{} for {}: {}",
            index + 1,
            candidates.len(),
            action,
            descriptor
        );
        let mut causes = Vec::with_capacity(plan.len());
        for attempt in plan {
            match interaction::perform(browser, descriptor, action, attempt.channel, &attempt.policy)
                .await
            {
                Ok(()) => {
                    info!(
                        "Candidate {} ({}) succeeded via {} channel",
                        index + 1,
                        descriptor,
                        attempt.channel
                    );
                    return Ok(CandidateHit {
                        index,
                        descriptor: descriptor.clone(),
                        channel: attempt.channel,
                    });
                }
                Err(e) => {
                    warn!("Candidate {} ({}) failed: {}", index + 1, descriptor, e);
                    causes.push(e);
                }
            }
        }
        failures.push(CandidateFailure {
            index,
            descriptor: descriptor.clone(),
            causes,
        });
    }

    Err(InteractionError::AllFailed {
        action: action.name().to_string(),
        failures,
    })
}
