use crate::memory::Message;
use crate::vector_store::Passage;

pub const CONTEXTUALIZE_SYSTEM_PROMPT: &str = "Given a chat history and the latest user question \
which might reference context in the chat history, formulate a standalone question which can be \
understood without the chat history. Do NOT answer the question, just reformulate it if needed \
and otherwise return it as is.";

pub const QA_SYSTEM_PROMPT: &str = "You are an assistant for question-answering tasks. \
Use the following pieces of retrieved context to answer the question. \
If you don't know the answer, just say that you don't know. \
Use three sentences maximum and keep the answer concise.";

pub const PLAIN_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

pub const HEALTH_CHECK_PROMPT: &str = "Say 'OK' if you're working properly.";

fn with_history(system: String, history: &[Message], input: &str) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(Message::system(system));
    messages.extend_from_slice(history);
    messages.push(Message::user(input));
    messages
}

pub fn contextualize_messages(history: &[Message], input: &str) -> Vec<Message> {
    with_history(CONTEXTUALIZE_SYSTEM_PROMPT.to_string(), history, input)
}

/// Passages stuffed into the answering prompt, separated by blank lines.
pub fn format_context(passages: &[Passage]) -> String {
    passages
        .iter()
        .map(|p| p.content.trim())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn answer_messages(passages: &[Passage], history: &[Message], input: &str) -> Vec<Message> {
    let system = format!("{}\n\nContext:\n{}", QA_SYSTEM_PROMPT, format_context(passages));
    with_history(system, history, input)
}

pub fn plain_messages(history: &[Message], input: &str) -> Vec<Message> {
    with_history(PLAIN_SYSTEM_PROMPT.to_string(), history, input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Role;
    use crate::vector_store::Metadata;

    fn passage(content: &str) -> Passage {
        Passage { content: content.to_string(), metadata: Metadata::new(), score: 0.5 }
    }

    #[test]
    fn test_answer_prompt_layout() {
        let history = vec![Message::user("hi"), Message::assistant("hello")];
        let messages = answer_messages(&[passage("A"), passage("  "), passage("B")], &history, "question?");

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.ends_with("Context:\nA\n\nB"));
        assert!(messages[0].content.contains("three sentences maximum"));
        assert_eq!(messages[3], Message::user("question?"));
    }

    #[test]
    fn test_plain_prompt() {
        let messages = plain_messages(&[], "What is the return policy?");
        assert_eq!(messages, vec![
            Message::system(PLAIN_SYSTEM_PROMPT),
            Message::user("What is the return policy?"),
        ]);
    }
}
