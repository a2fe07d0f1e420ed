//! Integration test suite for relay.
//!
//! These tests drive the public API end to end: agents are registered,
//! batches are selected and planned, and plans are executed against
//! agents simulated over in-process channels.
//!
//! # Test Categories
//!
//! - `selection`: Agent ranking and batch assignment
//! - `planning`: Phase construction and plan-wide invariants
//! - `coordination`: Phase barriers, failures and concurrent plans
//! - `pipeline`: Full select, plan and execute runs
//!
//! # CI Compatibility
//!
//! No external agents or network access are needed; every agent is a
//! task answering on a tokio channel.


mod selection;
mod planning;
mod coordination;
