//! Chat history: an ordered message log with context-window eviction and an
//! optional file-backed persistence hook.
//!
//! Two reference implementations are provided, mirroring the spec's "in-memory
//! reference implementation" plus the file-backed extension this crate carries
//! as a supplemental reference (SPEC_FULL §3/§6): [`InMemoryChatHistory`] and
//! [`FileChatHistory`]. Both satisfy the same invariant: after any mutation,
//! `len() <= context_window`, oldest entries evicted first.

use crate::types::Message;
use crate::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Mutex;

/// Ordered sequence of messages bounded by a configured context window.
pub trait ChatHistory: Send + Sync {
    /// Appends a message, evicting the oldest entries first if `context_window`
    /// would otherwise be exceeded.
    fn add(&self, message: Message) -> Result<()>;

    /// Removes and returns the oldest message, if any.
    fn remove_oldest(&self) -> Result<Option<Message>>;

    /// Removes every message.
    fn flush_all(&self) -> Result<()>;

    /// A snapshot of the current message sequence, oldest first.
    fn snapshot(&self) -> Vec<Message>;

    fn len(&self) -> usize {
        self.snapshot().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn context_window(&self) -> usize;
}

/// `Vec`-backed in-memory chat history.
pub struct InMemoryChatHistory {
    context_window: usize,
    messages: Mutex<Vec<Message>>,
}

impl InMemoryChatHistory {
    pub fn new(context_window: usize) -> Self {
        Self {
            context_window,
            messages: Mutex::new(Vec::new()),
        }
    }

    fn evict_if_needed(messages: &mut Vec<Message>, context_window: usize) {
        while messages.len() > context_window {
            messages.remove(0);
        }
    }
}

impl ChatHistory for InMemoryChatHistory {
    fn add(&self, message: Message) -> Result<()> {
        let mut messages = self.messages.lock().unwrap();
        messages.push(message);
        Self::evict_if_needed(&mut messages, self.context_window);
        Ok(())
    }

    fn remove_oldest(&self) -> Result<Option<Message>> {
        let mut messages = self.messages.lock().unwrap();
        if messages.is_empty() {
            Ok(None)
        } else {
            Ok(Some(messages.remove(0)))
        }
    }

    fn flush_all(&self) -> Result<()> {
        self.messages.lock().unwrap().clear();
        Ok(())
    }

    fn snapshot(&self) -> Vec<Message> {
        self.messages.lock().unwrap().clone()
    }

    fn context_window(&self) -> usize {
        self.context_window
    }
}

/// JSON-Lines file-backed chat history.
///
/// Each line is a serialized `Message`; blank lines are ignored on read. Every
/// mutation truncates and rewrites the whole file under a mutex, matching the
/// open question resolution in SPEC_FULL §9 (simplicity over throughput).
pub struct FileChatHistory {
    context_window: usize,
    path: PathBuf,
    messages: Mutex<Vec<Message>>,
}

impl FileChatHistory {
    /// Opens (or creates) a JSON-Lines file at `path`, loading any existing
    /// messages found there.
    pub fn open(path: impl Into<PathBuf>, context_window: usize) -> Result<Self> {
        let path = path.into();
        let mut messages = Vec::new();

        if path.exists() {
            let file = File::open(&path).map_err(|e| Error::chat_history(e.to_string()))?;
            for line in BufReader::new(file).lines() {
                let line = line.map_err(|e| Error::chat_history(e.to_string()))?;
                if line.trim().is_empty() {
                    continue;
                }
                let message: Message = serde_json::from_str(&line)?;
                messages.push(message);
            }
        }

        InMemoryChatHistory::evict_if_needed(&mut messages, context_window);

        let history = Self {
            context_window,
            path,
            messages: Mutex::new(messages),
        };
        history.rewrite()?;
        Ok(history)
    }

    fn rewrite(&self) -> Result<()> {
        let messages = self.messages.lock().unwrap();
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|e| Error::chat_history(e.to_string()))?;
        for message in messages.iter() {
            let line = serde_json::to_string(message)?;
            writeln!(file, "{line}").map_err(|e| Error::chat_history(e.to_string()))?;
        }
        Ok(())
    }
}

impl ChatHistory for FileChatHistory {
    fn add(&self, message: Message) -> Result<()> {
        {
            let mut messages = self.messages.lock().unwrap();
            messages.push(message);
            InMemoryChatHistory::evict_if_needed(&mut messages, self.context_window);
        }
        self.rewrite()
    }

    fn remove_oldest(&self) -> Result<Option<Message>> {
        let removed = {
            let mut messages = self.messages.lock().unwrap();
            if messages.is_empty() {
                None
            } else {
                Some(messages.remove(0))
            }
        };
        if removed.is_some() {
            self.rewrite()?;
        }
        Ok(removed)
    }

    fn flush_all(&self) -> Result<()> {
        self.messages.lock().unwrap().clear();
        self.rewrite()
    }

    fn snapshot(&self) -> Vec<Message> {
        self.messages.lock().unwrap().clone()
    }

    fn context_window(&self) -> usize {
        self.context_window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    #[test]
    fn test_in_memory_history_evicts_oldest() {
        let history = InMemoryChatHistory::new(2);
        history.add(Message::user("one")).unwrap();
        history.add(Message::user("two")).unwrap();
        history.add(Message::user("three")).unwrap();

        let snapshot = history.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].text(), "two");
        assert_eq!(snapshot[1].text(), "three");
    }

    #[test]
    fn test_in_memory_history_flush() {
        let history = InMemoryChatHistory::new(10);
        history.add(Message::user("one")).unwrap();
        history.flush_all().unwrap();
        assert!(history.is_empty());
    }

    #[test]
    fn test_file_chat_history_round_trips() {
        let dir = std::env::temp_dir().join(format!("agent-history-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("history.jsonl");
        if path.exists() {
            std::fs::remove_file(&path).unwrap();
        }

        {
            let history = FileChatHistory::open(&path, 10).unwrap();
            history.add(Message::user("ping")).unwrap();
            history.add(Message::assistant_text("pong")).unwrap();
        }

        let reopened = FileChatHistory::open(&path, 10).unwrap();
        let snapshot = reopened.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[1].text(), "pong");

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_file_chat_history_ignores_blank_lines() {
        let dir = std::env::temp_dir().join(format!("agent-history-test2-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("history_blank.jsonl");
        std::fs::write(&path, "\n\n").unwrap();

        let history = FileChatHistory::open(&path, 10).unwrap();
        assert!(history.is_empty());

        std::fs::remove_file(&path).ok();
    }
}
