//! Core data models for the credential check.
//!
//! A run is a fixed, ordered plan of `CheckSpec`s. Each executed spec yields a
//! `CheckOutcome`, and the outcomes roll up into a `RunSummary` that drives
//! the report and the process exit code.

pub mod check;
pub mod outcome;
