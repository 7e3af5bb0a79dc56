//! Pipeline orchestrator: plan → code → tests → verify/repair loop.
//!
//! A run is strictly sequential. Planning, initial coding and test generation
//! failures end the run before anything is written. After the artifacts are
//! persisted, test failures are handled by the bounded fix loop and never
//! abort the run.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{Instrument, Span};

use crate::agents::{CodeDraft, CoderAgent, PlannerAgent, TesterAgent};
use crate::config::PipelineConfig;
use crate::error::{GenerationError, PipelineError};
use crate::gateway::ModelGateway;
use crate::llm::{self, TextGenerator};
use crate::runner::{TestRunner, Verifier};
use crate::usage::UsageSnapshot;
use crate::workspace::{ArtifactNames, Workspace};

/// Pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Planning,
    Coding,
    TestingGenerated,
    RunTests,
    RequestFix,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Planning => write!(f, "planning"),
            Phase::Coding => write!(f, "coding"),
            Phase::TestingGenerated => write!(f, "testing_generated"),
            Phase::RunTests => write!(f, "run_tests"),
            Phase::RequestFix => write!(f, "request_fix"),
            Phase::Done => write!(f, "done"),
        }
    }
}

/// How the verify loop ended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationSummary {
    pub passed: bool,
    pub test_runs: u32,
    pub fix_requests: u32,
    /// A fix request errored and the loop stopped early.
    pub fix_abandoned: bool,
    pub last_diagnostic: String,
}

/// Everything a finished run hands back to the front end.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub code: String,
    pub tests: String,
    pub usage: UsageSnapshot,
    pub output_dir: PathBuf,
    pub app_file: String,
    pub test_file: String,
    pub verification: VerificationSummary,
    /// Non-fatal conditions: exhausted syntax retries, still-failing tests.
    pub warnings: Vec<String>,
}

impl RunReport {
    /// Human-readable steps for running the generated artifacts.
    pub fn instructions(&self) -> String {
        let dir = self.output_dir.display();
        let status = if self.verification.passed {
            format!(
                "Generated tests passed after {} run(s) and {} fix request(s).",
                self.verification.test_runs, self.verification.fix_requests
            )
        } else {
            format!(
                "WARNING: generated tests were still failing after {} run(s) and {} fix request(s).",
                self.verification.test_runs, self.verification.fix_requests
            )
        };
        format!(
            "How to run the generated code and tests:\n\n\
             1. Files were written to '{dir}/':\n\
             \x20  - {dir}/{app}\n\
             \x20  - {dir}/{test}\n\n\
             2. Run the application (if it has a main entry point):\n\
             \x20  - python {dir}/{app}\n\n\
             3. Run the tests (requires pytest):\n\
             \x20  - cd {dir} && pytest {test}\n\n\
             {status}\n\
             Each run writes new timestamped files; earlier runs are kept.\n",
            app = self.app_file,
            test = self.test_file,
        )
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    generator: Arc<dyn TextGenerator>,
    verifier: Arc<dyn Verifier>,
    span: Span,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        generator: Arc<dyn TextGenerator>,
        verifier: Arc<dyn Verifier>,
    ) -> Self {
        Self {
            config,
            generator,
            verifier,
            span: tracing::info_span!("pipeline"),
        }
    }

    /// Wire up the configured backend and the process test runner.
    pub fn from_config(config: PipelineConfig) -> Result<Self, GenerationError> {
        let generator = llm::connect(config.provider, config.resolve_api_key())?;
        let verifier = Arc::new(TestRunner::from_config(&config.runner));
        Ok(Self::new(config, generator, verifier))
    }

    pub async fn run(&self, requirements: &str) -> Result<RunReport, PipelineError> {
        self.run_inner(requirements)
            .instrument(self.span.clone())
            .await
    }

    async fn run_inner(&self, requirements: &str) -> Result<RunReport, PipelineError> {
        if requirements.trim().is_empty() {
            return Err(PipelineError::EmptyRequirements);
        }
        tracing::info!(len = requirements.len(), "starting pipeline run");

        let cfg = &self.config;
        // Fresh gateway per run so usage is never shared between runs.
        let gateway = Arc::new(ModelGateway::new(
            self.generator.clone(),
            cfg.retry.policy(),
        ));
        let planner = PlannerAgent::new(gateway.clone(), &cfg.models.planner);
        let coder = CoderAgent::new(gateway.clone(), &cfg.models.coder, cfg.max_syntax_attempts);
        let tester =
            TesterAgent::new(gateway.clone(), &cfg.models.tester, cfg.max_syntax_attempts);
        let mut warnings = Vec::new();

        enter(Phase::Planning);
        let plan = planner
            .create_plan(requirements)
            .await
            .map_err(PipelineError::Planning)?;

        enter(Phase::Coding);
        let draft = coder
            .generate_code(requirements, &plan)
            .await
            .map_err(PipelineError::Coding)?;
        note_invalid(&draft, "generated code", &mut warnings);
        let mut code = draft.code();

        enter(Phase::TestingGenerated);
        let names = ArtifactNames::next();
        let test_draft = tester
            .generate_tests(requirements, &code, &names.module)
            .await
            .map_err(PipelineError::Testing)?;
        note_invalid(&test_draft, "generated tests", &mut warnings);
        let tests = test_draft.code();

        // Code first: a test file must never point at an unwritten module.
        let workspace = Workspace::create(&cfg.output_dir).await?;
        workspace.write_new(&names.app_file, &code).await?;
        let test_path = workspace.write_new(&names.test_file, &tests).await?;

        let max_runs = cfg.max_fix_attempts.max(1);
        let mut summary = VerificationSummary::default();
        for run in 1..=max_runs {
            enter(Phase::RunTests);
            tracing::info!(run, max_runs, "running generated tests");
            let outcome = self.verifier.verify(&test_path).await;
            summary.test_runs = run;
            summary.last_diagnostic = outcome.diagnostic;

            if outcome.passed {
                tracing::info!(run, "generated tests passed");
                summary.passed = true;
                break;
            }
            tracing::warn!(
                run,
                preview = %preview(&summary.last_diagnostic, 500),
                "generated tests failed"
            );

            if run == max_runs {
                tracing::error!(runs = run, "max fix attempts reached, tests still failing");
                break;
            }

            enter(Phase::RequestFix);
            summary.fix_requests += 1;
            match coder
                .fix_code(&code, &summary.last_diagnostic, requirements)
                .await
            {
                Ok(fixed) => {
                    note_invalid(&fixed, "fixed code", &mut warnings);
                    code = fixed.code();
                    workspace.write_file(&names.app_file, &code).await?;
                }
                Err(e) => {
                    tracing::error!(error = %e, "fix request failed, keeping last code");
                    summary.fix_abandoned = true;
                    warnings.push(format!("fix request failed: {e}"));
                    break;
                }
            }
        }

        if !summary.passed {
            warnings.push(format!(
                "generated tests still failing after {} run(s)",
                summary.test_runs
            ));
        }

        enter(Phase::Done);
        let usage = gateway.usage_snapshot();
        tracing::info!(
            passed = summary.passed,
            fixes = summary.fix_requests,
            callers = usage.len(),
            "pipeline run completed"
        );

        Ok(RunReport {
            code,
            tests,
            usage,
            output_dir: cfg.output_dir.clone(),
            app_file: names.app_file,
            test_file: names.test_file,
            verification: summary,
            warnings,
        })
    }
}

fn enter(phase: Phase) {
    tracing::debug!(%phase, "phase");
}

fn note_invalid(draft: &CodeDraft, what: &str, warnings: &mut Vec<String>) {
    if !draft.is_valid() {
        warnings.push(format!(
            "{what} failed syntax check after {} attempt(s): {}",
            draft.attempts, draft.verdict.detail
        ));
    }
}

fn preview(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(passed: bool) -> RunReport {
        RunReport {
            code: String::new(),
            tests: String::new(),
            usage: UsageSnapshot::new(),
            output_dir: PathBuf::from("generated"),
            app_file: "generated_app_x.py".into(),
            test_file: "test_generated_app_x.py".into(),
            verification: VerificationSummary {
                passed,
                test_runs: 2,
                fix_requests: 1,
                ..Default::default()
            },
            warnings: vec![],
        }
    }

    #[test]
    fn instructions_name_both_files() {
        let text = report(true).instructions();
        assert!(text.contains("generated/generated_app_x.py"));
        assert!(text.contains("pytest test_generated_app_x.py"));
        assert!(text.contains("passed after 2 run(s) and 1 fix request(s)"));
    }

    #[test]
    fn instructions_flag_failing_run() {
        assert!(report(false).instructions().contains("WARNING"));
    }

    #[test]
    fn preview_respects_char_boundaries() {
        assert_eq!(preview("héllo", 2), "hé");
        assert_eq!(preview("hi", 10), "hi");
    }

    #[test]
    fn phase_display() {
        assert_eq!(Phase::TestingGenerated.to_string(), "testing_generated");
        assert_eq!(Phase::Done.to_string(), "done");
    }
}
