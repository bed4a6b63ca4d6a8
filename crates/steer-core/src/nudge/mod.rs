//! Nudge engine
//!
//! This module is organized around a single registry of nudge types:
//! - `registry` - the closed `NudgeType` enum with its impact table
//! - `generator` - rule engine producing candidate nudges
//! - `personalize` - preference filter, success prediction, feedback
//! - `lifecycle` - state transitions and type-specific executors

mod generator;
mod lifecycle;
mod personalize;
mod registry;

pub use generator::{NudgeGenerator, RiskContext};
pub use lifecycle::{NudgeLifecycle, NudgeMetrics};
pub use personalize::{PersonalizationFilter, PredictionConfidence, SuccessPrediction};
pub use registry::NudgeType;
