//! Application layer containing the verification orchestration.
//!
//! This module defines the `TaskCoordinator`, which owns the verification
//! tasks of all known transactions. Tasks report their outcomes over a
//! `tokio` channel and the coordinator applies them one at a time, so every
//! record has a single writer.

pub mod coordinator;
