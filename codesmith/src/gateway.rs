//! Model gateway: the single path from agents to the text generator.
//!
//! Flattens a conversation into a prompt, retries capacity errors with
//! exponential backoff plus jitter, and records usage for every successful
//! call.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use tracing::{Instrument, Span};

use crate::error::{ErrorKind, GenerationError};
use crate::llm::{Conversation, TextGenerator};
use crate::usage::{self, UsageLedger, UsageSnapshot};

/// Bounded backoff for transient generation failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Scale of the uniform `[0, 1)` jitter added to each delay.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            jitter: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// Whether a failure of `kind` on 0-based attempt `attempt` gets another try.
    pub fn should_retry(&self, kind: ErrorKind, attempt: u32) -> bool {
        kind == ErrorKind::Transient && attempt.saturating_add(1) < self.max_attempts
    }

    /// `base * 2^attempt + jitter_fraction * jitter`.
    pub fn delay(&self, attempt: u32, jitter_fraction: f64) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor) + self.jitter.mul_f64(jitter_fraction.clamp(0.0, 1.0))
    }
}

pub struct ModelGateway {
    generator: Arc<dyn TextGenerator>,
    policy: RetryPolicy,
    ledger: Mutex<UsageLedger>,
    span: Span,
}

impl ModelGateway {
    pub fn new(generator: Arc<dyn TextGenerator>, policy: RetryPolicy) -> Self {
        Self {
            generator,
            policy,
            ledger: Mutex::new(UsageLedger::new()),
            span: tracing::info_span!("gateway"),
        }
    }

    /// Send `conversation` to `model_id` on behalf of `caller_id`.
    pub async fn invoke(
        &self,
        caller_id: &str,
        model_id: &str,
        conversation: &Conversation,
    ) -> Result<String, GenerationError> {
        self.invoke_inner(caller_id, model_id, conversation)
            .instrument(self.span.clone())
            .await
    }

    async fn invoke_inner(
        &self,
        caller_id: &str,
        model_id: &str,
        conversation: &Conversation,
    ) -> Result<String, GenerationError> {
        tracing::info!(caller = caller_id, model = model_id, turns = conversation.len(), "calling model");
        for (i, turn) in conversation.turns().iter().enumerate() {
            tracing::debug!(index = i + 1, role = %turn.role, len = turn.content.len(), "turn");
        }

        let prompt = conversation.render_prompt();
        let mut attempt = 0u32;
        let reply = loop {
            match self.generator.generate(model_id, &prompt).await {
                Ok(reply) => break reply,
                Err(e) if self.policy.should_retry(e.kind(), attempt) => {
                    let jitter: f64 = rand::thread_rng().r#gen();
                    let delay = self.policy.delay(attempt, jitter);
                    tracing::warn!(
                        error = %e,
                        attempt = attempt + 1,
                        max = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "capacity exhausted, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(error = %e, caller = caller_id, model = model_id, attempts = attempt + 1, "model call failed");
                    return Err(e);
                }
            }
        };

        let tokens = usage::estimate_tokens(&prompt, &reply);
        self.ledger_mut(|ledger| ledger.record(caller_id, tokens));
        tracing::info!(caller = caller_id, reply_len = reply.len(), tokens, "model call completed");
        Ok(reply)
    }

    pub fn usage_snapshot(&self) -> UsageSnapshot {
        self.ledger_mut(|ledger| ledger.snapshot())
    }

    pub fn reset_usage(&self) {
        self.ledger_mut(|ledger| ledger.reset())
    }

    fn ledger_mut<T>(&self, f: impl FnOnce(&mut UsageLedger) -> T) -> T {
        let mut guard = self.ledger.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}
