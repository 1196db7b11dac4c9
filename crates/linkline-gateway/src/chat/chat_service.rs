//! Chat orchestration: RAG-or-plain routing over per-user history.

use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use super::bot::{explain_messages, ContextMessage, ExplainChain};
use super::models::{
    ChatFailure, ChatOutcome, ChatReply, ChatRequest, ClearHistoryResult, HealthReport, RagAttempt,
    UserHistory,
};
use crate::error::Result;
use crate::llm::{LlmConnectionPool, RetryExecutor, RetryPolicy};
use crate::memory::{HistoryStore, Message};
use crate::rag::prompts::HEALTH_CHECK_PROMPT;
use crate::rag::{ChainBuilder, ChainInput};
use crate::thread_pool::{ThreadPool, WorkerLane};
use crate::vector_store::VectorNamespaceManager;

pub struct ChatService {
    pool: Arc<LlmConnectionPool>,
    chains: ChainBuilder,
    retry: RetryExecutor,
    namespaces: Arc<VectorNamespaceManager>,
    histories: Arc<dyn HistoryStore>,
    thread_pool: Arc<ThreadPool>,
}

impl ChatService {
    pub fn new(
        pool: Arc<LlmConnectionPool>,
        namespaces: Arc<VectorNamespaceManager>,
        histories: Arc<dyn HistoryStore>,
        thread_pool: Arc<ThreadPool>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            chains: ChainBuilder::new(pool.clone()),
            retry: RetryExecutor::new(pool.clone(), thread_pool.clone(), retry_policy),
            pool,
            namespaces,
            histories,
            thread_pool,
        }
    }

    /// Answer one message. Never fails: any error becomes a `ChatOutcome::Failed`
    /// and leaves the history as it was before the failing step.
    pub async fn process_message(&self, request: &ChatRequest) -> ChatOutcome {
        let result = match request.normalized() {
            Ok(request) => self.respond(&request).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(reply) => ChatOutcome::Reply(reply),
            Err(e) => {
                error!("Critical error while processing message for user '{}': {}", request.user_id, e);
                ChatOutcome::Failed(ChatFailure::new(e))
            }
        }
    }

    async fn respond(&self, request: &ChatRequest) -> Result<ChatReply> {
        if request.new_chat {
            info!("Starting a new chat for user '{}'", request.user_id);
            self.histories.reset(&request.user_id);
        }
        let history = self.histories.get_history(&request.user_id);

        let attempt = if request.use_rag && !request.group().is_empty() {
            self.try_rag(&request.message, &history, request.group()).await?
        } else {
            RagAttempt::Unavailable
        };

        let (response, sources, rag_enabled) = match attempt {
            RagAttempt::Used { answer, sources } => (answer, sources, true),
            RagAttempt::Unavailable => {
                info!("Using regular chat chain (no RAG).");
                let chain = self.chains.build_plain().await?;
                let answer = self
                    .retry
                    .invoke_with_retry(chain, ChainInput::new(request.message.clone(), history))
                    .await?;
                (answer, Vec::new(), false)
            }
        };

        self.histories.append_exchange(&request.user_id, &request.message, &response);

        Ok(ChatReply {
            user_id: request.user_id.clone(),
            response,
            sources_used: if sources.is_empty() { None } else { Some(sources) },
            rag_enabled,
        })
    }

    async fn try_rag(&self, message: &str, history: &[Message], group_id: &str) -> Result<RagAttempt> {
        let retriever = match self.namespaces.get_retriever(group_id).await {
            Some(retriever) => retriever,
            None => {
                warn!(
                    "RAG requested for group '{}', but no retriever was found. Falling back to regular chat.",
                    group_id
                );
                return Ok(RagAttempt::Unavailable);
            }
        };

        info!("RAG enabled for group '{}'", group_id);
        let chain = self.chains.build(Some(retriever)).await?;
        let output = self
            .retry
            .invoke_with_retry(chain, ChainInput::new(message, history.to_vec()))
            .await?;

        let sources = output.sources();
        if output.context.is_empty() {
            warn!("RAG retrieved no context docs.");
        } else {
            info!("RAG retrieved {} docs -> {:?}", output.context.len(), sources);
        }
        Ok(RagAttempt::Used { answer: output.answer, sources })
    }

    /// Direct answer to a bot mention, framed by the group's recent messages.
    /// Provider failures are reported in the text rather than raised.
    pub async fn explain(&self, query: &str, context: &[ContextMessage]) -> String {
        let result = async {
            let chain = ExplainChain::new(self.pool.acquire_round_robin().await?);
            self.retry
                .invoke_with_retry(chain, explain_messages(query, context))
                .await
        }
        .await;

        match result {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Explain request failed: {}", e);
                format!("Error fetching response: {}", e)
            }
        }
    }

    pub fn get_user_history(&self, user_id: &str) -> UserHistory {
        let messages = self.histories.get_history(user_id);
        UserHistory {
            user_id: user_id.to_string(),
            message_count: messages.len(),
            messages,
        }
    }

    pub fn clear_user_history(&self, user_id: &str) -> ClearHistoryResult {
        let message = if self.histories.clear_history(user_id) {
            format!("Chat history cleared for user {}", user_id)
        } else {
            format!("No chat history found for user {}", user_id)
        };
        ClearHistoryResult { status: "success".to_string(), message }
    }

    pub fn active_users(&self) -> usize {
        self.histories.user_count()
    }

    /// One round trip through a pooled handle.
    pub async fn health_check(&self) -> HealthReport {
        let probe = async {
            let llm = self.pool.acquire_round_robin().await?;
            let started = Instant::now();
            let reply = self
                .thread_pool
                .spawn(WorkerLane::Llm, async move {
                    llm.complete(&[Message::user(HEALTH_CHECK_PROMPT)]).await
                })
                .await?;
            Ok::<_, crate::error::GatewayError>((reply, started.elapsed()))
        };

        match probe.await {
            Ok((test_response, elapsed)) => HealthReport::Healthy {
                pool_size: self.pool.size(),
                response_time_ms: elapsed.as_secs_f64() * 1000.0,
                test_response,
            },
            Err(e) => HealthReport::Unhealthy { error: e.to_string() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::models::CRITICAL_ERROR_REPLY;
    use crate::error::GatewayError;
    use crate::ingestion::FileType;
    use crate::memory::{InMemoryHistoryStore, Role};
    use crate::test_support::{
        fast_retry_policy, shared_model_pool, test_namespace_manager, test_thread_pool,
        ScriptedChatModel,
    };
    use crate::vector_store::InMemoryVectorBackend;
    use std::io::Write;
    use tempfile::NamedTempFile;

    struct Harness {
        service: ChatService,
        model: Arc<ScriptedChatModel>,
        namespaces: Arc<VectorNamespaceManager>,
    }

    fn harness() -> Harness {
        let model = Arc::new(ScriptedChatModel::named("assistant"));
        let thread_pool = test_thread_pool();
        let namespaces = test_namespace_manager(InMemoryVectorBackend::new(), thread_pool.clone());
        let service = ChatService::new(
            shared_model_pool(model.clone()),
            namespaces.clone(),
            Arc::new(InMemoryHistoryStore::new()),
            thread_pool,
            fast_retry_policy(2),
        );
        Harness { service, model, namespaces }
    }

    async fn upload(namespaces: &VectorNamespaceManager, group: &str, name: &str, content: &str) {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        namespaces
            .add_document(file.path().to_path_buf(), name, FileType::Txt, group)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_plain_chat_skips_retrieval() {
        let h = harness();
        h.model.push_reply("Returns are accepted within 30 days.");

        let request = ChatRequest::new("alice", "What is the return policy?").with_rag(false);
        let outcome = h.service.process_message(&request).await;

        assert_eq!(
            outcome,
            ChatOutcome::Reply(ChatReply {
                user_id: "alice".into(),
                response: "Returns are accepted within 30 days.".into(),
                sources_used: None,
                rag_enabled: false,
            })
        );
        assert_eq!(h.service.get_user_history("alice").message_count, 2);
    }

    #[tokio::test]
    async fn test_rag_falls_back_without_index() {
        let h = harness();
        h.model.push_reply("plain answer");

        let request = ChatRequest::new("bob", "What is in the syllabus?").with_group("cs101");
        let outcome = h.service.process_message(&request).await;

        let reply = outcome.reply().unwrap();
        assert!(!reply.rag_enabled);
        assert_eq!(reply.response, "plain answer");
        assert_eq!(reply.sources_used, None);
    }

    #[tokio::test]
    async fn test_rag_uses_group_documents() {
        let h = harness();
        upload(
            &h.namespaces,
            "cs101",
            "syllabus.txt",
            "The final exam is worth forty percent of the grade.",
        )
        .await;
        h.model.push_reply("Forty percent.");

        let request = ChatRequest::new("carol", "How much is the final exam worth?").with_group("cs101");
        let outcome = h.service.process_message(&request).await;

        let reply = outcome.reply().unwrap();
        assert!(reply.rag_enabled);
        assert_eq!(reply.response, "Forty percent.");
        assert_eq!(reply.sources_used, Some(vec!["syllabus.txt".to_string()]));

        let prompt = h.model.prompts().pop().unwrap();
        assert!(prompt[0].content.contains("forty percent of the grade"));
    }

    #[tokio::test]
    async fn test_new_chat_resets_history() {
        let h = harness();
        let first = ChatRequest::new("dave", "hello").with_rag(false);
        h.service.process_message(&first).await;
        h.service.process_message(&first).await;
        assert_eq!(h.service.get_user_history("dave").message_count, 4);

        let second = ChatRequest::new("dave", "start over").with_rag(false).starting_new_chat();
        h.service.process_message(&second).await;

        let history = h.service.get_user_history("dave");
        assert_eq!(history.message_count, 2);
        assert_eq!(history.messages[0].role, Role::User);
        assert_eq!(history.messages[0].content, "start over");
        assert_eq!(history.messages[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_history_is_sent_on_follow_up() {
        let h = harness();
        h.service.process_message(&ChatRequest::new("erin", "my name is Erin").with_rag(false)).await;
        h.service.process_message(&ChatRequest::new("erin", "what is my name?").with_rag(false)).await;

        let prompt = h.model.prompts().pop().unwrap();
        assert_eq!(prompt.len(), 4);
        assert_eq!(prompt[1], Message::user("my name is Erin"));
    }

    #[tokio::test]
    async fn test_failure_is_structured_and_history_untouched() {
        let h = harness();
        h.model.push_error(GatewayError::Backend("upstream down".into()));
        h.model.push_error(GatewayError::Backend("upstream down".into()));

        let outcome = h.service.process_message(&ChatRequest::new("frank", "hi").with_rag(false)).await;

        match outcome {
            ChatOutcome::Failed(failure) => {
                assert!(failure.error.contains("upstream down"));
                assert_eq!(failure.response, CRITICAL_ERROR_REPLY);
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(h.service.get_user_history("frank").message_count, 0);
    }

    #[tokio::test]
    async fn test_blank_message_is_a_structured_failure() {
        let h = harness();
        let outcome = h.service.process_message(&ChatRequest::new("gina", "   ")).await;
        assert!(outcome.is_error());
        assert!(h.model.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_explain_reports_errors_in_text() {
        let h = harness();
        h.model.push_reply("Recursion is a function calling itself.");
        let context = vec![ContextMessage { user_id: "u1".into(), message: "we covered loops".into() }];

        let answer = h.service.explain("what is recursion", &context).await;
        assert_eq!(answer, "Recursion is a function calling itself.");

        h.model.push_error(GatewayError::Validation("bad prompt".into()));
        let answer = h.service.explain("what is recursion", &[]).await;
        assert!(answer.starts_with("Error fetching response:"));
    }

    #[tokio::test]
    async fn test_clear_history() {
        let h = harness();
        assert!(h.service.clear_user_history("nobody").message.starts_with("No chat history"));

        h.service.process_message(&ChatRequest::new("hank", "hi").with_rag(false)).await;
        let result = h.service.clear_user_history("hank");
        assert_eq!(result.status, "success");
        assert_eq!(h.service.get_user_history("hank").message_count, 0);
    }

    #[tokio::test]
    async fn test_health_check() {
        let h = harness();
        h.model.push_reply("OK");

        match h.service.health_check().await {
            HealthReport::Healthy { pool_size, test_response, .. } => {
                assert_eq!(pool_size, 1);
                assert_eq!(test_response, "OK");
            }
            other => panic!("expected healthy, got {:?}", other),
        }
    }
}
