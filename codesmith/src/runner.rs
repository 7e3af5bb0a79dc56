//! Runs a generated test file in a child process.
//!
//! The process starts in the test file's directory so the test can import
//! its companion module by name. It is killed if it outlives the timeout.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::process::Command;
use tracing::{Instrument, Span};

use crate::config::RunnerConfig;

/// Pass/fail plus everything the test process printed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationOutcome {
    pub passed: bool,
    pub diagnostic: String,
}

impl VerificationOutcome {
    fn failed(diagnostic: String) -> Self {
        Self {
            passed: false,
            diagnostic,
        }
    }
}

/// Executes a test artifact. Never fails: problems become a failing outcome.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, test_path: &Path) -> VerificationOutcome;
}

pub struct TestRunner {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    span: Span,
}

impl TestRunner {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
            span: tracing::info_span!("runner"),
        }
    }

    pub fn from_config(config: &RunnerConfig) -> Self {
        Self::new(
            config.program.clone(),
            config.args.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub async fn run(&self, test_path: &Path) -> VerificationOutcome {
        self.run_inner(test_path).instrument(self.span.clone()).await
    }

    async fn run_inner(&self, test_path: &Path) -> VerificationOutcome {
        let dir = test_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let file = test_path.file_name().unwrap_or(test_path.as_os_str());

        tracing::info!(program = %self.program, test = %test_path.display(), "running tests");

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(file)
            .current_dir(dir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, child).await {
            Err(_) => {
                tracing::warn!(timeout_secs = self.timeout.as_secs_f64(), "test run timed out");
                return VerificationOutcome::failed(format!(
                    "Test execution timed out after {:.1} seconds",
                    self.timeout.as_secs_f64()
                ));
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, program = %self.program, "failed to launch test process");
                return VerificationOutcome::failed(format!(
                    "Failed to launch `{}`: {e}",
                    self.program
                ));
            }
            Ok(Ok(output)) => output,
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut diagnostic = String::new();
        diagnostic.push_str(&stdout);
        if !stderr.is_empty() {
            if !diagnostic.is_empty() && !diagnostic.ends_with('\n') {
                diagnostic.push('\n');
            }
            diagnostic.push_str(&stderr);
        }

        let passed = output.status.success();
        if passed {
            tracing::info!("tests passed");
        } else {
            tracing::warn!(code = ?output.status.code(), "tests failed");
        }
        VerificationOutcome { passed, diagnostic }
    }
}

#[async_trait]
impl Verifier for TestRunner {
    async fn verify(&self, test_path: &Path) -> VerificationOutcome {
        self.run(test_path).await
    }
}
