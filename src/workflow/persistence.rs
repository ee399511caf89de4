//! Workflow interrupt persistence: save/load/delete a paused run's state
//! (§4.5 "Interruption"/"Resumption").

use crate::workflow::WorkflowInterrupt;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Mutex;

/// Saves/loads/deletes the interrupted state of a workflow run, keyed by
/// workflow id. Implementations must be safe under concurrent workflow
/// instances (§4.5 "Concurrency").
#[async_trait]
pub trait WorkflowPersistence: Send + Sync {
    async fn save(&self, workflow_id: &str, interrupt: &WorkflowInterrupt) -> Result<()>;
    async fn load(&self, workflow_id: &str) -> Result<Option<WorkflowInterrupt>>;
    async fn delete(&self, workflow_id: &str) -> Result<()>;
}

/// `HashMap`-backed reference implementation.
#[derive(Default)]
pub struct InMemoryWorkflowPersistence {
    saved: Mutex<HashMap<String, WorkflowInterrupt>>,
}

impl InMemoryWorkflowPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowPersistence for InMemoryWorkflowPersistence {
    async fn save(&self, workflow_id: &str, interrupt: &WorkflowInterrupt) -> Result<()> {
        self.saved.lock().unwrap().insert(workflow_id.to_string(), interrupt.clone());
        Ok(())
    }

    async fn load(&self, workflow_id: &str) -> Result<Option<WorkflowInterrupt>> {
        Ok(self.saved.lock().unwrap().get(workflow_id).cloned())
    }

    async fn delete(&self, workflow_id: &str) -> Result<()> {
        self.saved.lock().unwrap().remove(workflow_id);
        Ok(())
    }
}

/// JSON file-backed reference implementation, one file per workflow id
/// under `directory`. Mirrors [`crate::history::FileChatHistory`]'s
/// mutex-guarded truncate-and-rewrite discipline (§4.5 "Reference
/// persistence").
pub struct FileWorkflowPersistence {
    directory: PathBuf,
    lock: Mutex<()>,
}

impl FileWorkflowPersistence {
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory).map_err(|e| Error::workflow(e.to_string()))?;
        Ok(Self {
            directory,
            lock: Mutex::new(()),
        })
    }

    fn path_for(&self, workflow_id: &str) -> PathBuf {
        self.directory.join(format!("{workflow_id}.json"))
    }
}

#[async_trait]
impl WorkflowPersistence for FileWorkflowPersistence {
    async fn save(&self, workflow_id: &str, interrupt: &WorkflowInterrupt) -> Result<()> {
        let _guard = self.lock.lock().unwrap();
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(self.path_for(workflow_id))
            .map_err(|e| Error::workflow(e.to_string()))?;
        let json = serde_json::to_string(interrupt)?;
        file.write_all(json.as_bytes()).map_err(|e| Error::workflow(e.to_string()))?;
        Ok(())
    }

    async fn load(&self, workflow_id: &str) -> Result<Option<WorkflowInterrupt>> {
        let _guard = self.lock.lock().unwrap();
        let path = self.path_for(workflow_id);
        if !path.exists() {
            return Ok(None);
        }
        let mut contents = String::new();
        File::open(&path)
            .map_err(|e| Error::workflow(e.to_string()))?
            .read_to_string(&mut contents)
            .map_err(|e| Error::workflow(e.to_string()))?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    async fn delete(&self, workflow_id: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap();
        let path = self.path_for(workflow_id);
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| Error::workflow(e.to_string()))?;
        }
        Ok(())
    }
}
