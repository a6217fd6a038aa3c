//! Answer generation: prompt assembly, token-bounded batch answering and
//! multi-batch synthesis.

pub mod answerer;
pub mod prompts;
pub mod synthesizer;

pub use synthesizer::{AnswerGenerationError, AnswerPipeline, ChatTurn};
