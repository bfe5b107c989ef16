//! Shared wire types for the rfqbot OTC swap automation.
//!
//! Everything in this crate is transport-agnostic: envelopes as they appear
//! in the replicated side-channel log, the tool names and response shapes of
//! the action surface, the start options of the automation engine, and the
//! invite/welcome capability helpers.

pub mod capabilities;
pub mod config;
pub mod objects;
