//! buildlens-lib: build orchestration and diagnostics for SDK projects
//!
//! This crate wraps an external build tool and adds what it does not provide:
//! - `exec`: running the tool transparently, captured, or teed
//! - `classify`: turning captured diagnostics into actionable failure categories
//! - `lines`, `resources`, `size`: metrics harvested after a successful build
//! - `build`: the orchestrator that ties these into one build lifecycle
//! - `report`: per-section size reports for built artifacts

pub mod build;
pub mod classify;
pub mod config;
pub mod consts;
pub mod exec;
pub mod lines;
pub mod platform;
pub mod project;
pub mod report;
pub mod resources;
pub mod size;
pub mod telemetry;
pub mod tool;
pub mod util;
