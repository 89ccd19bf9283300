//! Outcome assertions: notification visibility, side-channel flag, call count

use std::time::Duration;

use tracing::debug;

use crate::error::{E2eError, E2eResult};
use crate::intercept::{InterceptedRequest, RuleId, SideChannel};
use crate::playwright::PlaywrightHandle;
use crate::protocol::WaitState;
use crate::scenario::OutcomeKind;
use crate::workflow::text_target;

pub const DEFAULT_OUTCOME_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone)]
pub struct OutcomeAssertor {
    timeout: Duration,
    strict_exclusivity: bool,
}

impl Default for OutcomeAssertor {
    fn default() -> Self {
        Self::new(DEFAULT_OUTCOME_TIMEOUT)
    }
}

impl OutcomeAssertor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            strict_exclusivity: false,
        }
    }

    /// Also require that the other notification is absent.
    pub fn strict_exclusivity(mut self, strict: bool) -> Self {
        self.strict_exclusivity = strict;
        self
    }

    /// Wait for the notification of `kind` and return its text.
    ///
    /// A timeout with nothing intercepted by `rule` is reported as an
    /// interception miss: the UI never had a response to render. With a call
    /// seen and the opposite notification up, it is an assertion mismatch.
    pub async fn expect_outcome(
        &self,
        page: &mut PlaywrightHandle,
        kind: OutcomeKind,
        rule: RuleId,
    ) -> E2eResult<String> {
        let labels = kind.labels();
        let text = match page
            .wait_for(text_target(labels), WaitState::Visible, self.timeout)
            .await
        {
            Ok(text) => text,
            Err(E2eError::LocatorTimeout { .. }) if page.interceptions(rule).is_empty() => {
                return Err(E2eError::InterceptionMiss {
                    pattern: page
                        .route_pattern(rule)
                        .map(ToString::to_string)
                        .unwrap_or_default(),
                    waited_ms: self.timeout.as_millis() as u64,
                });
            }
            Err(timeout @ E2eError::LocatorTimeout { .. }) => {
                // The call went through; the other notification means the app
                // rendered the wrong outcome rather than none at all.
                let other = kind.opposite().labels();
                if page.count(text_target(other)).await? > 0 {
                    return Err(E2eError::mismatch(
                        format!("{} notification", labels.name()),
                        labels.patterns().join(" | "),
                        format!("{} notification visible", other.name()),
                    ));
                }
                return Err(timeout);
            }
            Err(e) => return Err(e),
        };

        if !labels.matches(&text) {
            return Err(E2eError::mismatch(
                format!("{} notification text", labels.name()),
                labels.patterns().join(" | "),
                text,
            ));
        }

        if self.strict_exclusivity {
            let other = kind.opposite().labels();
            let count = page.count(text_target(other)).await?;
            if count != 0 {
                return Err(E2eError::mismatch(
                    format!("{} notifications", other.name()),
                    "0",
                    count.to_string(),
                ));
            }
        }

        debug!("Outcome {:?} visible: {}", kind, text);
        Ok(text)
    }

    /// Check the flag raised by the interception responder.
    ///
    /// Only meaningful after [`Self::expect_outcome`] succeeded: the
    /// notification proves the round trip, and the flag was written before it.
    pub fn expect_flag(&self, flag: &SideChannel) -> E2eResult<()> {
        if flag.is_set() {
            Ok(())
        } else {
            Err(E2eError::mismatch("request contract flag", "true", "false"))
        }
    }

    /// Exactly one call must have reached `rule`.
    pub async fn expect_single_call(
        &self,
        page: &mut PlaywrightHandle,
        rule: RuleId,
    ) -> E2eResult<InterceptedRequest> {
        // Drain route events the sidecar emitted after the last reply.
        page.ping().await?;

        let calls = page.interceptions(rule);
        match calls {
            [only] => Ok(only.clone()),
            [] => Err(E2eError::InterceptionMiss {
                pattern: page
                    .route_pattern(rule)
                    .map(ToString::to_string)
                    .unwrap_or_default(),
                waited_ms: self.timeout.as_millis() as u64,
            }),
            many => Err(E2eError::mismatch(
                "intercepted calls",
                "1",
                many.len().to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_assertion() {
        let assertor = OutcomeAssertor::default();
        let flag = SideChannel::default();
        assert!(matches!(
            assertor.expect_flag(&flag),
            Err(E2eError::AssertionMismatch { .. })
        ));
        flag.set();
        assert!(assertor.expect_flag(&flag).is_ok());
    }
}
