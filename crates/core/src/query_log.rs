use crate::answer::Answer;
use crate::models::{Confidence, QueryContext};
use crate::query::Retrieval;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Hit reference kept in the log: enough to audit what was retrieved
/// without duplicating chunk text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggedHit {
    pub id: Uuid,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryLogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub user: Option<String>,
    pub query: String,
    pub context: QueryContext,
    pub hits: Vec<LoggedHit>,
    pub answer: String,
    pub confidence: Confidence,
}

impl QueryLogEntry {
    pub fn from_exchange(
        query: &str,
        context: &QueryContext,
        retrieval: &Retrieval,
        answer: &Answer,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            user: context.user.clone(),
            query: query.to_string(),
            context: context.clone(),
            hits: retrieval
                .hits
                .iter()
                .map(|hit| LoggedHit {
                    id: hit.id,
                    score: hit.score,
                })
                .collect(),
            answer: answer.answer.clone(),
            confidence: answer.confidence,
        }
    }
}

/// Append-only JSONL audit log of answered queries. Logging failures are
/// surfaced as `io::Error` so callers can warn and continue; a full disk
/// must never fail the query itself.
pub struct QueryLog {
    path: PathBuf,
}

impl QueryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &QueryLogEntry) -> io::Result<()> {
        let line = serde_json::to_string(entry)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }

    /// Reads the whole log back, skipping lines that fail to parse. A torn
    /// final line from a crashed writer must not hide the rest.
    pub fn read_all(&self) -> io::Result<Vec<QueryLogEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = std::fs::File::open(&self.path)?;
        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(entry) = serde_json::from_str::<QueryLogEntry>(&line) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }
}
