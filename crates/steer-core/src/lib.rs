//! Steer Core Library
//!
//! Shared functionality for the Steer proactive finance engine:
//! - Database access and migrations
//! - Cash-flow forecasting and risk scoring
//! - Income/spend rhythm analysis
//! - Nudge generation, personalization, and lifecycle
//! - Scheduled automation agents with a shortfall guardian
//! - Explainability service with an optional narrative backend

pub mod agents;
pub mod db;
pub mod error;
pub mod explain;
pub mod forecast;
pub mod models;
pub mod money;
pub mod narrative;
pub mod notify;
pub mod nudge;
pub mod rhythm;
pub mod risk;

pub use agents::{
    Agent, AgentContext, AgentReport, AgentRunner, CashflowAgent, GoalBackstopAgent,
    MicroSaveAutopilot, NightlyDigestAgent, RunSummary, Severity, ShortfallEvent,
    ShortfallGuardian, SpendingGuardrailAgent,
};
pub use db::{AuditEntry, Database};
pub use error::{Error, Result};
pub use explain::{AllowanceExplanation, ExplainabilityService, Explanation, RiskExplanation};
pub use forecast::{CashFlowForecast, FlowRates, Prediction, Trend};
pub use money::Money;
pub use narrative::{MockBackend, NarrativeBackend, NarrativeClient, OllamaBackend};
pub use notify::{LogNotifier, Notification, Notifier};
pub use nudge::{
    NudgeGenerator, NudgeLifecycle, NudgeMetrics, NudgeType, PersonalizationFilter,
    SuccessPrediction,
};
pub use rhythm::{Cadence, IncomeRhythm, RhythmProfile, SpendRhythm};
pub use risk::{EmiRisk, RiskAssessment};
