//! Append-only, hash-chained audit log. One JSON line per lifecycle event
//! the Reactor applies, so an operator can reconstruct exactly what the
//! Store held at any point without trusting the Store itself.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub eval_id: Uuid,
    pub ts_utc: DateTime<Utc>,
    pub topic: String,
    pub payload: Value,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

pub struct AuditWriter {
    path: PathBuf,
    last_hash: Option<String>,
}

impl AuditWriter {
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(AuditWriter {
            path,
            last_hash: None,
        })
    }

    pub fn append(&mut self, eval_id: Uuid, topic: &str, payload: Value) -> std::io::Result<AuditEvent> {
        let mut ev = AuditEvent {
            event_id: Uuid::new_v4(),
            eval_id,
            ts_utc: Utc::now(),
            topic: topic.to_string(),
            payload,
            hash_prev: self.last_hash.clone(),
            hash_self: None,
        };
        let self_hash = compute_event_hash(&ev);
        ev.hash_self = Some(self_hash.clone());
        self.last_hash = Some(self_hash);

        let line = canonical_json_line(&ev);
        append_line(&self.path, &line)?;
        Ok(ev)
    }
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut f = OpenOptions::new().create(true).append(true).open(path)?;
    f.write_all(line.as_bytes())?;
    f.write_all(b"\n")
}

fn canonical_json_line<T: Serialize>(v: &T) -> String {
    let raw = serde_json::to_value(v).expect("audit event always serializes");
    let sorted = sort_keys(&raw);
    serde_json::to_string(&sorted).expect("sorted value always serializes")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

fn compute_event_hash(ev: &AuditEvent) -> String {
    let mut clone = ev.clone();
    clone.hash_self = None;
    let canonical = canonical_json_line(&clone);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Valid { lines: usize },
    Broken { line: usize, reason: String },
}

pub fn verify_hash_chain_str(content: &str) -> VerifyResult {
    let mut prev_hash: Option<String> = None;
    let mut line_count = 0usize;

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let ev: AuditEvent = match serde_json::from_str(trimmed) {
            Ok(ev) => ev,
            Err(e) => {
                return VerifyResult::Broken {
                    line: i + 1,
                    reason: format!("unparseable audit line: {e}"),
                }
            }
        };
        if ev.hash_prev != prev_hash {
            return VerifyResult::Broken {
                line: i + 1,
                reason: format!(
                    "hash_prev mismatch: expected {prev_hash:?}, got {:?}",
                    ev.hash_prev
                ),
            };
        }
        if let Some(claimed) = ev.hash_self.clone() {
            let recomputed = compute_event_hash(&ev);
            if claimed != recomputed {
                return VerifyResult::Broken {
                    line: i + 1,
                    reason: format!("hash_self mismatch: claimed {claimed}, recomputed {recomputed}"),
                };
            }
        }
        line_count += 1;
        prev_hash = ev.hash_self.clone();
    }
    VerifyResult::Valid { lines: line_count }
}
