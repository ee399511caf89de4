//! Retrieval-augmented generation (§4.4): wraps an [`Agent`] by composition
//! (not inheritance, per §9's design note) and injects retrieved context
//! into its instructions ahead of each turn.

pub mod embedding;
pub mod postprocessor;
pub mod vectorstore;

use crate::agent::{remove_delimited_content, Agent};
use crate::observer::{topics, Event};
use crate::provider::TextStream;
use crate::types::{Document, Message};
use crate::{Error, Result};
use embedding::EmbeddingProvider;
use md5::{Digest, Md5};
use postprocessor::PostProcessor;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use vectorstore::VectorStore;

const EXTRA_CONTEXT_OPEN: &str = "<EXTRA-CONTEXT>";
const EXTRA_CONTEXT_CLOSE: &str = "</EXTRA-CONTEXT>";
const DEFAULT_TOP_K: usize = 5;

/// An [`Agent`] augmented with document retrieval.
pub struct Rag {
    agent: Agent,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    post_processors: Vec<Arc<dyn PostProcessor>>,
    top_k: usize,
    base_instructions: String,
}

impl Rag {
    pub fn new(agent: Agent, embedding_provider: Arc<dyn EmbeddingProvider>, vector_store: Arc<dyn VectorStore>) -> Self {
        let base_instructions = agent.instructions().unwrap_or_default().to_string();
        Self {
            agent,
            embedding_provider,
            vector_store,
            post_processors: Vec::new(),
            top_k: DEFAULT_TOP_K,
            base_instructions,
        }
    }

    pub fn add_post_processor(mut self, post_processor: Arc<dyn PostProcessor>) -> Self {
        self.post_processors.push(post_processor);
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Embeds `documents` and ingests them into the vector store (§4.4 "Ingest").
    pub async fn add_documents(&self, documents: Vec<Document>) -> Result<()> {
        self.agent_observers_publish(topics::RAG_ADDDOCUMENTS_START, Value::Null).await;
        let embedded = self.embedding_provider.embed_documents(&documents).await?;
        self.vector_store.add_documents(embedded).await?;
        self.agent_observers_publish(topics::RAG_ADDDOCUMENTS_STOP, Value::Null).await;
        Ok(())
    }

    /// Retrieves, deduplicates, and post-processes documents relevant to
    /// `question` (§4.4 "Retrieve").
    pub async fn retrieve_documents(&self, question: &str) -> Result<Vec<Document>> {
        if question.trim().is_empty() {
            return Err(Error::agent("query required"));
        }

        self.agent_observers_publish(topics::RAG_RETRIEVAL_START, Value::Null).await;

        let query_embedding = self.embedding_provider.embed_query(question).await?;

        self.agent_observers_publish(
            topics::RAG_VECTORSTORE_SEARCHING,
            serde_json::json!({"question": question}),
        )
        .await;

        let started = Instant::now();
        let results = self.vector_store.similarity_search(&query_embedding, self.top_k).await?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        self.agent_observers_publish(
            topics::RAG_VECTORSTORE_RESULT,
            serde_json::json!({
                "store": "InMemoryVectorStore",
                "question": question,
                "documents": results.iter().map(|d| &d.id).collect::<Vec<_>>(),
                "elapsed_ms": elapsed_ms,
            }),
        )
        .await;

        let mut seen = std::collections::HashSet::new();
        let deduped: Vec<Document> = results
            .into_iter()
            .filter(|d| !d.content.is_empty())
            .filter(|d| {
                let mut hasher = Md5::new();
                hasher.update(d.content.as_bytes());
                let digest = format!("{:x}", hasher.finalize());
                seen.insert(digest)
            })
            .collect();

        self.agent_observers_publish(topics::RAG_POSTPROCESSING_START, Value::Null).await;
        let mut processed = deduped;
        for post_processor in &self.post_processors {
            processed = post_processor.process(question, processed).await?;
        }
        self.agent_observers_publish(topics::RAG_POSTPROCESSING_END, Value::Null).await;

        self.agent_observers_publish(topics::RAG_RETRIEVAL_STOP, Value::Null).await;

        Ok(processed)
    }

    fn format_context_block(documents: &[Document]) -> String {
        let mut block = String::from(EXTRA_CONTEXT_OPEN);
        block.push('\n');
        block.push_str("--- Relevant Information Start ---\n");
        for doc in documents {
            let source = doc.source_name.clone().unwrap_or_else(|| "N/A".to_string());
            block.push_str(&format!("{source}\n{}\n\n", doc.content));
        }
        block.push_str("--- Relevant Information End ---\n");
        block.push_str(EXTRA_CONTEXT_CLOSE);
        block
    }

    /// Replaces any existing `<EXTRA-CONTEXT>` block in the agent's
    /// instructions with a freshly formatted one for `documents` (§4.4
    /// "Context injection").
    fn inject_context(&mut self, documents: &[Document]) {
        let stripped = remove_delimited_content(&self.base_instructions, EXTRA_CONTEXT_OPEN, EXTRA_CONTEXT_CLOSE);
        let context_block = Self::format_context_block(documents);
        let instructions = format!("{stripped}\n\n{context_block}");
        self.agent.set_instructions(instructions);
    }

    /// Retrieves context for `message`, injects it, and delegates to the
    /// wrapped agent's `chat` (§4.4 "Context injection").
    pub async fn answer(&mut self, message: impl Into<String>) -> Result<Message> {
        let message = message.into();
        self.agent_observers_publish(topics::RAG_ANSWER_START, Value::Null).await;

        let documents = self.retrieve_documents(&message).await?;
        self.inject_context(&documents);
        let result = self.agent.chat(message).await;

        self.agent_observers_publish(topics::RAG_ANSWER_STOP, Value::Null).await;
        result
    }

    /// Streaming variant of [`Rag::answer`].
    pub async fn stream_answer(&mut self, message: impl Into<String>) -> Result<TextStream> {
        let message = message.into();
        self.agent_observers_publish(topics::RAG_ANSWER_START, Value::Null).await;

        let documents = self.retrieve_documents(&message).await?;
        self.inject_context(&documents);
        let result = self.agent.stream(message).await;

        self.agent_observers_publish(topics::RAG_ANSWER_STOP, Value::Null).await;
        result
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn agent_mut(&mut self) -> &mut Agent {
        &mut self.agent
    }

    async fn agent_observers_publish(&self, topic: &str, payload: Value) {
        self.agent.observers().publish(Event::new(topic, payload)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Provider, StructuredSchema};
    use crate::tools::Tool;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StubProvider {
        last_instructions: Mutex<Option<String>>,
    }

    #[async_trait]
    impl Provider for StubProvider {
        fn name(&self) -> String {
            "stub".to_string()
        }

        async fn chat(&self, _messages: &[Message], instructions: Option<&str>, _tools: &[Tool]) -> Result<Message> {
            *self.last_instructions.lock().unwrap() = instructions.map(|s| s.to_string());
            Ok(Message::assistant_text("answer"))
        }

        async fn stream(&self, messages: &[Message], instructions: Option<&str>, tools: &[Tool]) -> Result<TextStream> {
            let message = self.chat(messages, instructions, tools).await?;
            Ok(crate::provider::stream::single_chunk_stream(message.text()))
        }

        async fn structured(&self, _messages: &[Message], _instructions: Option<&str>, _schema: &StructuredSchema) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    struct StubEmbeddings;

    #[async_trait]
    impl EmbeddingProvider for StubEmbeddings {
        async fn embed_documents(&self, documents: &[Document]) -> Result<Vec<Document>> {
            Ok(documents
                .iter()
                .cloned()
                .map(|mut d| {
                    d.embedding = Some(vec![1.0, 0.0]);
                    d
                })
                .collect())
        }

        async fn embed_query(&self, _query: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }
    }

    #[tokio::test]
    async fn test_retrieve_documents_rejects_empty_question() {
        let agent = Agent::new(Arc::new(StubProvider { last_instructions: Mutex::new(None) }));
        let rag = Rag::new(agent, Arc::new(StubEmbeddings), Arc::new(vectorstore::InMemoryVectorStore::new()));
        let err = rag.retrieve_documents("   ").await.unwrap_err();
        assert!(matches!(err, Error::Agent(_)));
    }

    #[tokio::test]
    async fn test_answer_injects_context_block() {
        let agent = Agent::new(Arc::new(StubProvider { last_instructions: Mutex::new(None) })).with_instructions("base prompt");
        let store = Arc::new(vectorstore::InMemoryVectorStore::new());
        let mut doc = Document::new("1", "paris is the capital of france", "text").with_source_name("geo.txt");
        doc.embedding = Some(vec![1.0, 0.0]);
        store.add_documents(vec![doc]).await.unwrap();

        let mut rag = Rag::new(agent, Arc::new(StubEmbeddings), store);
        let response = rag.answer("what is the capital of france?").await.unwrap();
        assert_eq!(response.text(), "answer");

        let instructions = rag.agent().instructions().unwrap().to_string();
        assert!(instructions.contains("<EXTRA-CONTEXT>"));
        assert!(instructions.contains("geo.txt"));
        assert!(instructions.contains("paris is the capital"));
    }

    #[tokio::test]
    async fn test_answer_replaces_stale_context_block_not_accumulate() {
        let agent = Agent::new(Arc::new(StubProvider { last_instructions: Mutex::new(None) })).with_instructions("base prompt");
        let store = Arc::new(vectorstore::InMemoryVectorStore::new());
        let mut doc = Document::new("1", "first fact", "text");
        doc.embedding = Some(vec![1.0, 0.0]);
        store.add_documents(vec![doc]).await.unwrap();

        let mut rag = Rag::new(agent, Arc::new(StubEmbeddings), store);
        rag.answer("question one").await.unwrap();
        rag.answer("question two").await.unwrap();

        let instructions = rag.agent().instructions().unwrap().to_string();
        assert_eq!(instructions.matches("<EXTRA-CONTEXT>").count(), 1);
    }

    #[test]
    fn test_format_context_block_defaults_source_to_na() {
        let doc = Document::new("1", "content", "text");
        let block = Rag::format_context_block(&[doc]);
        assert!(block.contains("N/A"));
        assert!(block.contains("--- Relevant Information Start ---"));
    }
}
