//! Lead Copilot Library
//!
//! Reads CRM leads from a Notion database, derives ICP fit, a research
//! brief, a priority tier and a next action for each one, and writes the
//! results back. Unchanged leads are skipped between runs via content
//! fingerprints.
//!
//! # Modules
//!
//! - `agents`: ICP, research, priority and action field agents.
//! - `cli`: Command-line arguments.
//! - `config`: Configuration management.
//! - `errors`: Error handling types.
//! - `fingerprint`: Incremental-processing state.
//! - `llm`: LLM client and adapter (retry, shape validation, repair).
//! - `models`: Leads and derived field bundles.
//! - `notify`: Slack run summaries.
//! - `notion`: Notion record store client.
//! - `pipeline`: Per-lead orchestration and run summary.
//! - `prompts`: Prompt templates.
//! - `retry`: Bounded exponential backoff.
//! - `rules`: Deterministic priority, staleness and confidence rules.
//! - `setup`: Interactive `.env` setup.
//! - `signals`: Trigger-signal detection.
//! - `store`: Record store capability and in-memory store.

pub mod agents;
pub mod cli;
pub mod config;
pub mod errors;
pub mod fingerprint;
pub mod llm;
pub mod models;
pub mod notify;
pub mod notion;
pub mod pipeline;
pub mod prompts;
pub mod retry;
pub mod rules;
pub mod setup;
pub mod signals;
pub mod store;
