//! MIORA Infinity Core -- Autonomous Self-Evolution Runtime
//!
//! A periodic multi-subsystem coordinator: three timer-driven drivers
//! (capability growth, evolution generation, the upgrade-module loop)
//! report into a unified coordinator that folds their output into one
//! clamped aggregate state and persists it between sessions.

pub mod types;
pub mod config;
pub mod rng;
pub mod growth;
pub mod evolution;
pub mod upgrade;
pub mod coordinator;
pub mod state;
