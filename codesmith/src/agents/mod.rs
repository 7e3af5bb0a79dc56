//! Generation agents: planner, coder, tester.
//!
//! Each agent fixes a system prompt and a model id and talks to the model
//! only through the shared [`ModelGateway`]. Agents that emit source run
//! their replies through the syntax checker and re-prompt on failure.

mod coder;
mod planner;
mod tester;

pub use coder::CoderAgent;
pub use planner::{Plan, PlannerAgent};
pub use tester::TesterAgent;

use serde::Serialize;

use crate::error::GenerationError;
use crate::fences::strip_code_fences;
use crate::gateway::ModelGateway;
use crate::llm::{Conversation, Role};
use crate::syntax::{self, SyntaxVerdict};

/// Caller identities used for usage accounting.
pub const PLANNER_ID: &str = "planner_agent";
pub const CODER_ID: &str = "coder_agent";
pub const TESTER_ID: &str = "tester_agent";

/// A source-code reply from the coder or tester.
#[derive(Debug, Clone, Serialize)]
pub struct CodeDraft {
    /// The model's reply exactly as returned, fences included.
    pub reply: String,
    /// Verdict for the fence-stripped reply.
    pub verdict: SyntaxVerdict,
    /// Model calls spent producing this draft.
    pub attempts: u32,
}

impl CodeDraft {
    /// The reply with boundary fences removed.
    pub fn code(&self) -> String {
        strip_code_fences(&self.reply)
    }

    pub fn is_valid(&self) -> bool {
        self.verdict.valid
    }
}

/// Call the model until the reply parses, at most `max_attempts` times.
///
/// On an invalid reply the bad output goes back into the conversation as an
/// assistant turn, followed by a user turn naming the defect. If every
/// attempt fails the last reply is returned anyway; the caller decides what
/// to do with an invalid draft. Gateway errors propagate.
pub(crate) async fn generate_checked(
    gateway: &ModelGateway,
    caller_id: &str,
    model_id: &str,
    mut conversation: Conversation,
    max_attempts: u32,
) -> Result<CodeDraft, GenerationError> {
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let reply = gateway.invoke(caller_id, model_id, &conversation).await?;
        let verdict = syntax::check(&strip_code_fences(&reply));

        if verdict.valid {
            tracing::info!(attempt, "generated code passed syntax check");
            return Ok(CodeDraft {
                reply,
                verdict,
                attempts: attempt,
            });
        }

        if attempt >= max_attempts {
            tracing::warn!(
                attempts = attempt,
                detail = %verdict.detail,
                "syntax still invalid after max attempts, returning best effort"
            );
            return Ok(CodeDraft {
                reply,
                verdict,
                attempts: attempt,
            });
        }

        tracing::warn!(attempt, detail = %verdict.detail, "generated code failed syntax check, retrying");
        conversation.push(Role::Assistant, reply);
        conversation.push(Role::User, syntax_feedback(&verdict));
        attempt += 1;
    }
}

fn syntax_feedback(verdict: &SyntaxVerdict) -> String {
    format!(
        "That code does not parse: {}. Reply with the complete corrected Python source only, no explanations.",
        verdict.detail
    )
}
