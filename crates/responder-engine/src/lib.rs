// crates/responder-engine/src/lib.rs
// ============================================================================
// Module: Responder Engine Library
// Description: Scheduler, step executor, simulation, approvals, and audit plumbing.
// Purpose: Drive runbooks from trigger to terminal state with graduated autonomy.
// Dependencies: responder-adapters, responder-core, serde_json, tokio, tracing
// ============================================================================

//! ## Overview
//! The engine crate wires the core model to live adapters and stores:
//! the [`RunbookScheduler`] owns the execution state machine, the
//! [`StepExecutor`] owns one-step semantics (templates, guards, timeouts,
//! retries), the [`SimulationEngine`] predicts effects without producing
//! them, and the [`ApprovalQueue`] / [`QueueExecutor`] pair implements the
//! persist-and-return human gate for L2 write actions.
//! Invariants:
//! - Every state transition is validated, audited, and persisted.
//! - Approved payloads execute byte-identically to what was frozen.
//! - Rollback replays inverse actions in reverse completion order.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod error;
pub mod executor;
pub mod queue;
pub mod scheduler;
pub mod simulation;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditLogger;
pub use audit::ENGINE_ACTOR;
pub use error::EngineError;
pub use executor::StepExecutor;
pub use executor::StepOutcome;
pub use queue::ApprovalExecution;
pub use queue::ApprovalQueue;
pub use queue::ApprovalRequest;
pub use queue::QueueExecutor;
pub use scheduler::RunbookScheduler;
pub use scheduler::SchedulerOutcome;
pub use scheduler::TriggerRequest;
pub use simulation::SimulationEngine;
pub use simulation::StepSimulation;
