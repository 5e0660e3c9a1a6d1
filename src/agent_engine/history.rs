use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::TapClawResult;
use crate::llm::types::{ConversationTurn, Role};

/// Turns kept in memory; older ones only survive in the transcript file.
const MAX_RETAINED_TURNS: usize = 200;

/// One line of the JSONL transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub ts: i64,
    pub role: Role,
    pub content: String,
}

pub struct ConversationHistory {
    session_id: String,
    turns: VecDeque<ConversationTurn>,
    file_path: Option<PathBuf>,
}

impl ConversationHistory {
    pub fn in_memory() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            turns: VecDeque::new(),
            file_path: None,
        }
    }

    /// Transcript under the platform data directory.
    pub fn persistent() -> Self {
        let dir = data_dir_or_cwd();
        match Self::persistent_in(&dir) {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "transcript dir unavailable, history kept in memory");
                Self::in_memory()
            }
        }
    }

    pub fn persistent_in(dir: &Path) -> TapClawResult<Self> {
        std::fs::create_dir_all(dir)?;
        let mut history = Self::in_memory();
        history.file_path = Some(dir.join(format!("session_{}.jsonl", history.session_id)));
        Ok(history)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        let turn = ConversationTurn {
            role,
            content: content.into(),
        };
        if let Some(path) = &self.file_path {
            if let Err(e) = append_entry(path, &turn) {
                tracing::warn!(path = %path.display(), error = %e, "history entry not persisted");
            }
        }
        self.turns.push_back(turn);
        while self.turns.len() > MAX_RETAINED_TURNS {
            self.turns.pop_front();
        }
    }

    /// The last `n` turns, oldest first.
    pub fn trailing(&self, n: usize) -> Vec<ConversationTurn> {
        let skip = self.turns.len().saturating_sub(n);
        self.turns.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Reads a transcript written by a persistent history. Malformed lines are skipped.
    pub fn load(path: &Path) -> TapClawResult<Vec<HistoryEntry>> {
        let file = std::fs::File::open(path)?;
        let mut entries = Vec::new();
        for line in std::io::BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::debug!(error = %e, "skipping malformed transcript line"),
            }
        }
        Ok(entries)
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::in_memory()
    }
}

fn append_entry(path: &Path, turn: &ConversationTurn) -> TapClawResult<()> {
    let entry = HistoryEntry {
        ts: chrono::Utc::now().timestamp_millis(),
        role: turn.role,
        content: turn.content.clone(),
    };
    let line = serde_json::to_string(&entry)?;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{line}")?;
    Ok(())
}

/// `<data_local_dir>/TapClaw/sessions`, falling back to the working directory.
fn data_dir_or_cwd() -> PathBuf {
    match dirs::data_local_dir() {
        Some(base) => base.join("TapClaw").join("sessions"),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}
