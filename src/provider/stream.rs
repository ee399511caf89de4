//! Shared streaming plumbing reused by every backend.

use crate::Result;
use futures::stream::Stream;
use std::pin::Pin;

/// A lazy sequence of text chunks, closed by dropping it (which drops the
/// underlying HTTP response and cancels the transport, satisfying §4.2's
/// "closing the returned sequence must close the underlying HTTP response").
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Wraps a single already-materialized string as a one-item `TextStream`.
///
/// Used by backends whose turn resolved to a tool call rather than text: per
/// §4.2, tool-call detection in streams is out of scope for the streamed
/// return type, so a turn that needs tool dispatch is run as a `chat` call
/// internally and its text (if any) is replayed through this single-item
/// stream so callers driving `stream()` still see a consistent shape.
pub fn single_chunk_stream(text: String) -> TextStream {
    Box::pin(futures::stream::once(async move { Ok(text) }))
}
