//! Coder: writes the application module and repairs it after failed tests.

use std::sync::Arc;

use tracing::{Instrument, Span};

use super::{CODER_ID, CodeDraft, Plan, generate_checked};
use crate::error::GenerationError;
use crate::gateway::ModelGateway;
use crate::llm::Conversation;

const SYSTEM_PROMPT: &str = "You are an expert Python developer. Write a single self-contained \
Python module that implements the described application. Include docstrings and comments, and \
prefer readability over cleverness. Output only Python source.";

const FIX_SYSTEM_PROMPT: &str = "You are an expert Python developer repairing a module whose \
test suite failed. Return the complete corrected module, not a diff. Output only Python source.";

pub struct CoderAgent {
    gateway: Arc<ModelGateway>,
    model: String,
    max_attempts: u32,
    span: Span,
}

impl CoderAgent {
    pub fn new(gateway: Arc<ModelGateway>, model: impl Into<String>, max_attempts: u32) -> Self {
        let model = model.into();
        tracing::info!(model = %model, "coder configured");
        Self {
            gateway,
            model,
            max_attempts,
            span: tracing::info_span!("agent", role = "coder"),
        }
    }

    pub async fn generate_code(
        &self,
        requirements: &str,
        plan: &Plan,
    ) -> Result<CodeDraft, GenerationError> {
        let user = format!(
            "=== REQUIREMENTS ===\n{requirements}\n\n\
             === IMPLEMENTATION PLAN ===\n{}\n\n\
             Output ONLY valid Python code, no explanations.",
            plan.raw_plan
        );
        self.run(Conversation::with_system(SYSTEM_PROMPT, user), "generate")
            .await
    }

    /// Ask for a full replacement of `current_code` given a failing test run.
    pub async fn fix_code(
        &self,
        current_code: &str,
        diagnostic: &str,
        requirements: &str,
    ) -> Result<CodeDraft, GenerationError> {
        let user = format!(
            "=== REQUIREMENTS ===\n{requirements}\n\n\
             === CURRENT CODE ===\n{current_code}\n\n\
             === TEST OUTPUT ===\n{diagnostic}\n\n\
             The tests above failed against the current code. Output the COMPLETE corrected \
             Python module so the tests pass. Output ONLY valid Python code."
        );
        self.run(Conversation::with_system(FIX_SYSTEM_PROMPT, user), "fix")
            .await
    }

    async fn run(&self, conversation: Conversation, task: &str) -> Result<CodeDraft, GenerationError> {
        async {
            tracing::info!(task, "generating code");
            generate_checked(
                &self.gateway,
                CODER_ID,
                &self.model,
                conversation,
                self.max_attempts,
            )
            .await
        }
        .instrument(self.span.clone())
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::ScriptedModel;
    use crate::gateway::RetryPolicy;

    fn coder(model: &Arc<ScriptedModel>) -> CoderAgent {
        let gw = Arc::new(ModelGateway::new(model.clone(), RetryPolicy::immediate(1)));
        CoderAgent::new(gw, "coder-model", 3)
    }

    #[tokio::test]
    async fn generate_includes_requirements_and_plan() {
        let model = Arc::new(ScriptedModel::default());
        model.script("coder-model", &["def add(a, b):\n    return a + b\n"]);

        let plan = Plan {
            raw_plan: "one function: add".into(),
        };
        let draft = coder(&model)
            .generate_code("add two numbers", &plan)
            .await
            .unwrap();
        assert!(draft.is_valid());

        let prompt = &model.calls_to("coder-model")[0];
        assert!(prompt.contains("add two numbers"));
        assert!(prompt.contains("one function: add"));
    }

    #[tokio::test]
    async fn fix_embeds_code_and_diagnostic() {
        let model = Arc::new(ScriptedModel::default());
        model.script("coder-model", &["def fixed():\n    pass\n"]);

        let draft = coder(&model)
            .fix_code("def original(): return 1", "AssertionError: 1 != 2", "reqs")
            .await
            .unwrap();
        assert_eq!(draft.reply, "def fixed():\n    pass\n");

        let prompt = &model.calls_to("coder-model")[0];
        assert!(prompt.contains("def original(): return 1"));
        assert!(prompt.contains("AssertionError: 1 != 2"));
        assert!(prompt.contains("reqs"));
    }

    #[tokio::test]
    async fn fix_uses_syntax_retry() {
        let model = Arc::new(ScriptedModel::default());
        model.script("coder-model", &["def fixed() pass", "def fixed():\n    pass\n"]);

        let draft = coder(&model).fix_code("x", "err", "reqs").await.unwrap();
        assert!(draft.is_valid());
        assert_eq!(draft.attempts, 2);
    }
}
