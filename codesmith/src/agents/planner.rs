//! Planner: turns requirements into a structured plan.

use std::sync::Arc;

use serde::Serialize;
use tracing::{Instrument, Span};

use super::PLANNER_ID;
use crate::error::GenerationError;
use crate::gateway::ModelGateway;
use crate::llm::Conversation;

const SYSTEM_PROMPT: &str = "You are a senior software architect. Given a set of requirements, \
produce a concise, structured plan for a single Python module. Cover:\n\
1) the main classes and functions,\n\
2) the responsibility of each,\n\
3) edge cases and the behaviours a test suite must check.\n\
Use clearly labelled sections. Do not write the implementation.";

/// Output of the planning step. Read-only input to the coder.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Plan {
    pub raw_plan: String,
}

pub struct PlannerAgent {
    gateway: Arc<ModelGateway>,
    model: String,
    span: Span,
}

impl PlannerAgent {
    pub fn new(gateway: Arc<ModelGateway>, model: impl Into<String>) -> Self {
        let model = model.into();
        tracing::info!(model = %model, "planner configured");
        Self {
            gateway,
            model,
            span: tracing::info_span!("agent", role = "planner"),
        }
    }

    /// One model call, no syntax loop: plans are prose.
    pub async fn create_plan(&self, requirements: &str) -> Result<Plan, GenerationError> {
        async {
            let conversation = Conversation::with_system(SYSTEM_PROMPT, requirements);
            let raw_plan = self
                .gateway
                .invoke(PLANNER_ID, &self.model, &conversation)
                .await
                .inspect_err(|e| tracing::error!(error = %e, "planning call failed"))?;
            tracing::info!(len = raw_plan.len(), "plan created");
            Ok::<_, GenerationError>(Plan { raw_plan })
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

    #[tokio::test]
    async fn wraps_raw_reply() {
        let model = Arc::new(ScriptedModel::default());
        model.script("planner-model", &["## Modules\n- calculator.py"]);
        let gw = Arc::new(ModelGateway::new(model.clone(), RetryPolicy::immediate(1)));

        let plan = PlannerAgent::new(gw.clone(), "planner-model")
            .create_plan("build a calculator")
            .await
            .unwrap();
        assert_eq!(plan.raw_plan, "## Modules\n- calculator.py");

        let prompts = model.calls_to("planner-model");
        assert!(prompts[0].starts_with("System: You are a senior software architect."));
        assert!(prompts[0].ends_with("User: build a calculator"));
        assert_eq!(gw.usage_snapshot()[PLANNER_ID].num_api_calls, 1);
    }

    #[tokio::test]
    async fn invalid_python_plan_is_fine() {
        let model = Arc::new(ScriptedModel::default());
        model.script("p", &["this is prose ( not code"]);
        let gw = Arc::new(ModelGateway::new(model.clone(), RetryPolicy::immediate(1)));

        PlannerAgent::new(gw, "p").create_plan("x").await.unwrap();
        assert_eq!(model.calls_to("p").len(), 1);
    }

    #[tokio::test]
    async fn failure_propagates() {
        let model = Arc::new(ScriptedModel::default());
        model.fail("p", 401);
        let gw = Arc::new(ModelGateway::new(model, RetryPolicy::immediate(1)));

        let err = PlannerAgent::new(gw, "p").create_plan("x").await.unwrap_err();
        assert!(matches!(err, GenerationError::Terminal { status: 401, .. }));
    }
}
