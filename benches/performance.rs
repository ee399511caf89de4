use criterion::{black_box, criterion_group, criterion_main, Criterion};
use open_agent::rag::vectorstore::{InMemoryVectorStore, VectorStore};
use open_agent::{ContentBlock, Document, Message, MessageRole, TextBlock, ToolUseBlock};
use tokio::runtime::Runtime;

fn sample_message(tool_calls: usize) -> Message {
    let mut blocks = vec![ContentBlock::Text(TextBlock::new(
        "The quick brown fox jumps over the lazy dog.",
    ))];
    for i in 0..tool_calls {
        blocks.push(ContentBlock::ToolUse(ToolUseBlock::new(
            format!("call-{i}"),
            "search",
            format!("{{\"query\":\"item {i}\"}}"),
        )));
    }
    Message::new(MessageRole::Assistant, blocks)
}

fn bench_message_encode_decode(c: &mut Criterion) {
    let message = sample_message(4);
    let encoded = serde_json::to_string(&message).unwrap();

    c.bench_function("message_encode", |b| {
        b.iter(|| serde_json::to_string(black_box(&message)).unwrap())
    });

    c.bench_function("message_decode", |b| {
        b.iter(|| serde_json::from_str::<Message>(black_box(&encoded)).unwrap())
    });
}

fn seeded_store(count: usize, dims: usize) -> InMemoryVectorStore {
    let store = InMemoryVectorStore::new();
    let rt = Runtime::new().unwrap();
    let docs = (0..count)
        .map(|i| {
            let mut doc = Document::new(format!("doc-{i}"), format!("content {i}"), "bench");
            let mut embedding = vec![0.0_f32; dims];
            embedding[i % dims] = 1.0;
            embedding[(i + 1) % dims] = 0.5;
            doc.embedding = Some(embedding);
            doc
        })
        .collect();
    rt.block_on(store.add_documents(docs)).unwrap();
    store
}

fn bench_vectorstore_similarity_search(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let store = seeded_store(1_000, 64);
    let query = {
        let mut v = vec![0.0_f32; 64];
        v[0] = 1.0;
        v
    };

    c.bench_function("vectorstore_similarity_search_top10_of_1000", |b| {
        b.iter(|| {
            rt.block_on(store.similarity_search(black_box(&query), black_box(10)))
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_message_encode_decode, bench_vectorstore_similarity_search);
criterion_main!(benches);
