//! Memloop - memory-lifecycle core for conversational agents
//!
//! Inputs are buffered as short-term memory per conversation instance,
//! answered through a completion provider, and consolidated into long-term
//! memory when the buffer grows or ages past its thresholds. Orchestrator
//! state is checkpointed after every transition so a restarted process
//! resumes exactly where it stopped.

pub mod config;
pub mod core;
pub mod providers;
pub mod routes;
pub mod storage;

#[cfg(test)]
mod testing;
