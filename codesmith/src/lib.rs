//! codesmith: multi-agent code generation with a self-healing test loop.
//!
//! Turns a natural-language requirements document into a Python module and
//! a pytest suite:
//! - Planner: requirements → structured plan
//! - Coder: plan → module, syntax-checked with re-prompting
//! - Tester: module → test suite importing it by name
//! - Orchestrator: runs the tests and asks the coder for repairs, bounded

pub mod agents;
pub mod config;
pub mod error;
pub mod fences;
pub mod gateway;
pub mod llm;
pub mod pipeline;
pub mod runner;
pub mod syntax;
pub mod usage;
pub mod workspace;
