//! Integration test suite for mise.
//!
//! These tests drive the public API end to end: step definitions through
//! scheduling, then live timers through the orchestrator.
//!
//! # Test Categories
//!
//! - `scheduling`: Start-time derivation, critical path, validation
//! - `orchestration`: Auto-start, bulk and per-timer controls, completion
//!
//! # Timing
//!
//! Orchestration tests run on tokio's paused clock, so multi-minute recipes
//! finish instantly and deterministically.

mod fixtures;

mod orchestration;
mod scheduling;
