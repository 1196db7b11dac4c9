//! Invocable chat pipelines.
//!
//! `RagChain` first rewrites the latest turn into a standalone question,
//! retrieves passages for it and answers from those passages only.
//! `PlainChain` answers from the conversation alone.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use super::prompts;
use crate::error::{GatewayError, Result};
use crate::llm::{Chain, ChatModel, LlmConnectionPool};
use crate::memory::Message;
use crate::vector_store::{Passage, Retriever};

#[derive(Debug, Clone)]
pub struct ChainInput {
    pub input: String,
    pub chat_history: Vec<Message>,
}

impl ChainInput {
    pub fn new(input: impl Into<String>, chat_history: Vec<Message>) -> Self {
        Self { input: input.into(), chat_history }
    }
}

#[derive(Debug, Clone)]
pub struct RagOutput {
    pub answer: String,
    pub standalone_question: String,
    pub context: Vec<Passage>,
}

impl RagOutput {
    /// Distinct source file names of the passages, sorted. A passage without
    /// one counts as "Unknown".
    pub fn sources(&self) -> Vec<String> {
        self.context
            .iter()
            .map(|p| p.source_file().unwrap_or("Unknown").to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[derive(Clone)]
pub struct RagChain {
    llm: Arc<dyn ChatModel>,
    retriever: Retriever,
}

impl RagChain {
    pub fn new(llm: Arc<dyn ChatModel>, retriever: Retriever) -> Self {
        Self { llm, retriever }
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// The latest turn rewritten to stand on its own. Without history it is
    /// returned unchanged.
    async fn standalone_question(&self, input: &ChainInput) -> Result<String> {
        if input.chat_history.is_empty() {
            return Ok(input.input.clone());
        }
        let rewritten = self
            .llm
            .complete(&prompts::contextualize_messages(&input.chat_history, &input.input))
            .await?;
        let rewritten = rewritten.trim();
        if rewritten.is_empty() {
            Ok(input.input.clone())
        } else {
            debug!("Contextualized question: {}", rewritten);
            Ok(rewritten.to_string())
        }
    }
}

#[async_trait]
impl Chain for RagChain {
    type Input = ChainInput;
    type Output = RagOutput;

    async fn invoke(&self, input: &ChainInput) -> Result<RagOutput> {
        let standalone_question = self.standalone_question(input).await?;
        let context = self.retriever.retrieve(&standalone_question).await?;
        let answer = self
            .llm
            .complete(&prompts::answer_messages(&context, &input.chat_history, &input.input))
            .await?;

        Ok(RagOutput { answer, standalone_question, context })
    }

    fn rebind(&self, llm: Arc<dyn ChatModel>) -> Self {
        Self { llm, retriever: self.retriever.clone() }
    }
}

#[derive(Clone)]
pub struct PlainChain {
    llm: Arc<dyn ChatModel>,
}

impl PlainChain {
    pub fn new(llm: Arc<dyn ChatModel>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Chain for PlainChain {
    type Input = ChainInput;
    type Output = String;

    async fn invoke(&self, input: &ChainInput) -> Result<String> {
        self.llm
            .complete(&prompts::plain_messages(&input.chat_history, &input.input))
            .await
    }

    fn rebind(&self, llm: Arc<dyn ChatModel>) -> Self {
        Self { llm }
    }
}

/// Binds chains to pool handles.
pub struct ChainBuilder {
    pool: Arc<LlmConnectionPool>,
}

impl ChainBuilder {
    pub fn new(pool: Arc<LlmConnectionPool>) -> Self {
        Self { pool }
    }

    pub async fn build(&self, retriever: Option<Retriever>) -> Result<RagChain> {
        let retriever = retriever.ok_or_else(|| {
            GatewayError::Configuration("No retriever available. Please upload documents first.".to_string())
        })?;
        let llm = self.pool.acquire_round_robin().await?;
        info!("RAG chain created for namespace '{}'", retriever.namespace());
        Ok(RagChain::new(llm, retriever))
    }

    pub async fn build_plain(&self) -> Result<PlainChain> {
        Ok(PlainChain::new(self.pool.acquire_round_robin().await?))
    }
}
