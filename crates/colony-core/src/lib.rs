//! Colony core: an autonomous research engine.
//!
//! A goal is split into threads by the Seeder. Each thread runs an
//! explore/critique/verify loop under a run-wide iteration budget, every
//! iteration lands in an append-only knowledge store, and the Synthesizer
//! turns the run's session memory into one report.

pub mod agents;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod llm;
pub mod memory;
pub mod metrics;
pub mod model;
pub mod security;
pub mod sources;
pub mod telemetry;
mod workflow;

pub use config::{ColonyConfig, ConfigLoader, RunConfig, VerifierConfig};
pub use controller::{IterationBudget, LoopLimits, RecursionController, RunContext, ThreadRun};
pub use error::{ColonyError, GenerationError, ProviderError};
pub use events::{ProgressEvent, ProgressSink};
pub use llm::{AnthropicGenerator, DynGenerator, FnGenerator, TextGenerator};
pub use memory::{
    DynKnowledgeStore, InMemoryKnowledgeStore, JsonlKnowledgeStore, KnowledgeStore, MemoryEntry,
};
pub use model::{
    Citation, Finding, FindingSummary, Report, SessionRecord, SourceKind, ThreadOutcome,
    ThreadReport, Verdict, VerdictClass, VerificationStatus, VerifiedCitation,
};
pub use telemetry::{TelemetryOptions, init_telemetry};
pub use workflow::{Colony, ColonyBuilder};
