//! Tester: writes a pytest suite for the generated module.

use std::sync::Arc;

use tracing::{Instrument, Span};

use super::{CodeDraft, TESTER_ID, generate_checked};
use crate::error::GenerationError;
use crate::gateway::ModelGateway;
use crate::llm::Conversation;

pub struct TesterAgent {
    gateway: Arc<ModelGateway>,
    model: String,
    max_attempts: u32,
    span: Span,
}

impl TesterAgent {
    pub fn new(gateway: Arc<ModelGateway>, model: impl Into<String>, max_attempts: u32) -> Self {
        let model = model.into();
        tracing::info!(model = %model, "tester configured");
        Self {
            gateway,
            model,
            max_attempts,
            span: tracing::info_span!("agent", role = "tester"),
        }
    }

    /// Generate tests that import the code from `module_name`.
    pub async fn generate_tests(
        &self,
        requirements: &str,
        code: &str,
        module_name: &str,
    ) -> Result<CodeDraft, GenerationError> {
        let system = format!(
            "You are a senior QA engineer writing unit tests in Python. Generate at least 10 \
             pytest-style tests (functions named test_*) with a short comment on each. The module \
             under test is named '{module_name}'; import from it with \
             `from {module_name} import ...`."
        );
        let user = format!(
            "=== REQUIREMENTS ===\n{requirements}\n\n\
             === GENERATED IMPLEMENTATION ({module_name}.py) ===\n{code}\n\n\
             Output ONLY valid Python test code for pytest, with at least 10 tests."
        );

        async {
            tracing::info!(module = module_name, "generating tests");
            generate_checked(
                &self.gateway,
                TESTER_ID,
                &self.model,
                Conversation::with_system(system, user),
                self.max_attempts,
            )
            .await
        }
        .instrument(self.span.clone())
        .await
    }
}
