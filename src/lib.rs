//! Tierline - resilient multi-tier LLM execution
//!
//! Classifies a task into a model tier, runs it against an injected provider
//! [`Executor`](executor::Executor) with retry and per-(provider, tier)
//! circuit breaking, falls back across tiers and providers, and feeds
//! quality scores back into tier recommendations.
//!
//! Every component is an explicitly owned object shared via `Arc`; nothing
//! is process-global.

pub mod circuit;
pub mod classifier;
pub mod cli;
pub mod clock;
pub mod config;
pub mod executor;
pub mod logging;
pub mod policy;
pub mod quality;
pub mod registry;
pub mod telemetry;
