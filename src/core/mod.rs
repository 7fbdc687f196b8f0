//! Memory orchestration core
//!
//! Short-term buffering, consolidation into long-term memory, and cached
//! query answering. Everything outside this module reaches the core through
//! [`InstanceHost`].

mod checkpoint;
mod clock;
mod host;
mod orchestrator;
mod policy;
mod query;

pub use checkpoint::{Checkpoint, NovelInput};
pub use clock::{Clock, SystemClock};
pub use host::InstanceHost;
pub use orchestrator::{
    consolidation_batch, novel_input_prompt, BufferState, Collaborators, CompletionSettings,
    ConsolidationOutcome, MemoryOrchestrator, OrchestratorError, StepOutcome,
};
pub use policy::{ConsolidationPolicy, DEFAULT_SIZE_THRESHOLD, DEFAULT_TIME_THRESHOLD_MINUTES};
pub use query::{latest_answer, query_prompt, AnswerSource, QueryAnswer, QueryOrchestrator, QUERY_PARTITION};
