//! Retrieval-augmented and plain chat pipelines.

pub mod chains;
pub mod prompts;

pub use chains::{ChainBuilder, ChainInput, PlainChain, RagChain, RagOutput};
