use super::*;
use std::sync::Mutex as StdMutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Session recording granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
pub enum SessionRecordLevel {
    /// Disable recording.
    Off,
    /// Record hello, RPC exchanges and close only.
    KeyEventsOnly,
    /// Record key events and every raw chunk read from the server.
    #[default]
    Full,
}

/// A single recorded session event.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionRecordEntry {
    pub ts_ms: u128,
    pub event: SessionEvent,
}

/// Options for normalizing JSONL recordings into stable fixtures.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions {
    /// Keep raw chunk events.
    pub keep_raw_chunks: bool,
    /// Replace wall-clock timestamps with the event index.
    pub renumber_timestamps: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            keep_raw_chunks: false,
            renumber_timestamps: true,
        }
    }
}

/// Supported recorded event types.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionEstablished {
        device_addr: String,
        #[serde(default)]
        session_id: Option<String>,
        capabilities: Vec<String>,
        #[serde(default)]
        framing: Framing,
    },
    SessionClosed {
        reason: String,
    },
    RpcExchange {
        message_id: String,
        operation: String,
        request: String,
        reply: String,
        ok: bool,
    },
    RawChunk {
        data: String,
    },
}

/// In-memory session recorder.
#[derive(Debug, Clone)]
pub struct SessionRecorder {
    level: SessionRecordLevel,
    entries: Arc<StdMutex<Vec<SessionRecordEntry>>>,
}

impl SessionRecorder {
    /// Create a recorder with the given level.
    pub fn new(level: SessionRecordLevel) -> Self {
        Self {
            level,
            entries: Arc::new(StdMutex::new(Vec::new())),
        }
    }

    /// Current recording level.
    pub fn level(&self) -> SessionRecordLevel {
        self.level
    }

    /// Record a key-level event.
    pub fn record_event(&self, event: SessionEvent) -> Result<(), NetconfError> {
        if self.level == SessionRecordLevel::Off {
            return Ok(());
        }
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| NetconfError::InternalServerError(format!("record lock error: {e}")))?;
        guard.push(SessionRecordEntry {
            ts_ms: now_ms(),
            event,
        });
        Ok(())
    }

    /// Record raw data read from the server when enabled.
    pub fn record_raw_chunk(&self, data: String) -> Result<(), NetconfError> {
        if self.level != SessionRecordLevel::Full {
            return Ok(());
        }
        self.record_event(SessionEvent::RawChunk { data })
    }

    /// Snapshot all records.
    pub fn entries(&self) -> Result<Vec<SessionRecordEntry>, NetconfError> {
        let guard = self
            .entries
            .lock()
            .map_err(|e| NetconfError::InternalServerError(format!("record lock error: {e}")))?;
        Ok(guard.clone())
    }

    /// Export records as JSONL.
    pub fn to_jsonl(&self) -> Result<String, NetconfError> {
        let entries = self.entries()?;
        let mut lines = Vec::with_capacity(entries.len());
        for entry in entries {
            let line = serde_json::to_string(&entry).map_err(|e| {
                NetconfError::InternalServerError(format!("record encode error: {e}"))
            })?;
            lines.push(line);
        }
        Ok(lines.join("\n"))
    }

    /// Restore recorder from JSONL lines.
    pub fn from_jsonl(jsonl: &str) -> Result<Self, NetconfError> {
        let mut parsed = Vec::new();
        for line in jsonl.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: SessionRecordEntry = serde_json::from_str(line).map_err(|e| {
                NetconfError::InternalServerError(format!("record decode error: {e}"))
            })?;
            parsed.push(entry);
        }

        Ok(SessionRecorder {
            level: SessionRecordLevel::Full,
            entries: Arc::new(StdMutex::new(parsed)),
        })
    }

    /// Normalize JSONL recording content into a stable fixture representation.
    pub fn normalize_jsonl(jsonl: &str, options: NormalizeOptions) -> Result<String, NetconfError> {
        let recorder = Self::from_jsonl(jsonl)?;
        let mut indexed = recorder
            .entries()?
            .into_iter()
            .enumerate()
            .collect::<Vec<(usize, SessionRecordEntry)>>();

        indexed
            .sort_by(|(idx_a, a), (idx_b, b)| a.ts_ms.cmp(&b.ts_ms).then_with(|| idx_a.cmp(idx_b)));

        let filtered = indexed
            .into_iter()
            .filter_map(|(_, entry)| match &entry.event {
                SessionEvent::RawChunk { .. } if !options.keep_raw_chunks => None,
                _ => Some(entry),
            })
            .enumerate()
            .map(|(idx, mut entry)| {
                if options.renumber_timestamps {
                    entry.ts_ms = idx as u128 + 1;
                }
                entry
            })
            .collect::<Vec<_>>();

        let normalized = SessionRecorder {
            level: SessionRecordLevel::Full,
            entries: Arc::new(StdMutex::new(filtered)),
        };
        normalized.to_jsonl()
    }
}

impl Default for SessionRecorder {
    fn default() -> Self {
        Self::new(SessionRecordLevel::Full)
    }
}

/// Offline replayer backed by session recording data.
#[derive(Debug, Clone)]
pub struct SessionReplayer {
    entries: Vec<SessionRecordEntry>,
    cursor: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayContext {
    pub device_addr: String,
    pub session_id: Option<String>,
    pub capabilities: Vec<String>,
    pub framing: Framing,
}

impl SessionReplayer {
    /// Build a replayer from a recorder snapshot.
    pub fn from_recorder(recorder: &SessionRecorder) -> Self {
        let entries = recorder.entries().unwrap_or_default();
        Self { entries, cursor: 0 }
    }

    /// Build a replayer from JSONL recording data.
    pub fn from_jsonl(jsonl: &str) -> Result<Self, NetconfError> {
        let recorder = SessionRecorder::from_jsonl(jsonl)?;
        Ok(Self::from_recorder(&recorder))
    }

    /// Returns the recorded hello context if present.
    pub fn initial_context(&self) -> Option<ReplayContext> {
        self.entries.iter().find_map(|entry| match &entry.event {
            SessionEvent::SessionEstablished {
                device_addr,
                session_id,
                capabilities,
                framing,
            } => Some(ReplayContext {
                device_addr: device_addr.clone(),
                session_id: session_id.clone(),
                capabilities: capabilities.clone(),
                framing: *framing,
            }),
            _ => None,
        })
    }

    /// Replay the next recorded reply for `operation`.
    ///
    /// Error replies come back as [`NetconfError::Rpc`], the same way a live
    /// session reports them.
    pub fn replay_next(&mut self, operation: &str) -> Result<RpcReply, NetconfError> {
        while self.cursor < self.entries.len() {
            let entry = &self.entries[self.cursor];
            self.cursor += 1;

            if let SessionEvent::RpcExchange {
                operation: recorded_operation,
                reply,
                ..
            } = &entry.event
            {
                if recorded_operation != operation {
                    continue;
                }
                let reply = RpcReply::parse(reply)?;
                if let Some(err) = reply.first_error() {
                    return Err(NetconfError::Rpc(err.clone()));
                }
                return Ok(reply);
            }
        }

        Err(NetconfError::ReplayMismatchError(format!(
            "no replayable reply found for operation '{operation}'"
        )))
    }

    /// Replay a sequence of operations, stopping at the first failure.
    pub fn replay_script(&mut self, operations: &[&str]) -> Result<Vec<RpcReply>, NetconfError> {
        let mut replies = Vec::with_capacity(operations.len());
        for operation in operations {
            replies.push(self.replay_next(operation)?);
        }
        Ok(replies)
    }
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOISY_FIXTURE: &str = r#"{"ts_ms":30,"event":{"kind":"raw_chunk","data":"<rpc-reply"}}
{"ts_ms":10,"event":{"kind":"session_established","device_addr":"netconf@10.0.0.1:830","session_id":"7","capabilities":["urn:ietf:params:netconf:base:1.1"],"framing":"chunked"}}
{"ts_ms":40,"event":{"kind":"rpc_exchange","message_id":"101","operation":"get","request":"<rpc/>","reply":"<rpc-reply message-id=\"101\"><data/></rpc-reply>","ok":true}}
"#;

    fn exchange(operation: &str, reply: &str) -> SessionEvent {
        SessionEvent::RpcExchange {
            message_id: "101".to_string(),
            operation: operation.to_string(),
            request: "<rpc/>".to_string(),
            reply: reply.to_string(),
            ok: true,
        }
    }

    #[test]
    fn recorder_jsonl_roundtrip() {
        let recorder = SessionRecorder::new(SessionRecordLevel::Full);
        recorder
            .record_event(SessionEvent::SessionClosed {
                reason: "test".to_string(),
            })
            .expect("record close");

        let jsonl = recorder.to_jsonl().expect("encode jsonl");
        let restored = SessionRecorder::from_jsonl(&jsonl).expect("decode jsonl");
        let entries = restored.entries().expect("entries");

        assert_eq!(entries.len(), 1);
        assert!(matches!(
            entries[0].event,
            SessionEvent::SessionClosed { .. }
        ));
    }

    #[test]
    fn key_events_level_skips_raw_chunks() {
        let recorder = SessionRecorder::new(SessionRecordLevel::KeyEventsOnly);
        recorder
            .record_raw_chunk("<hello/>".to_string())
            .expect("record raw");
        assert!(recorder.entries().expect("entries").is_empty());

        let off = SessionRecorder::new(SessionRecordLevel::Off);
        off.record_event(exchange("get", "<rpc-reply/>"))
            .expect("record exchange");
        assert!(off.entries().expect("entries").is_empty());
    }

    #[test]
    fn normalize_sorts_filters_and_renumbers() {
        let normalized = SessionRecorder::normalize_jsonl(NOISY_FIXTURE, NormalizeOptions::default())
            .expect("normalize");
        let entries = SessionRecorder::from_jsonl(&normalized)
            .expect("decode")
            .entries()
            .expect("entries");

        assert_eq!(entries.len(), 2);
        assert!(matches!(
            entries[0].event,
            SessionEvent::SessionEstablished { .. }
        ));
        assert_eq!(entries[0].ts_ms, 1);
        assert_eq!(entries[1].ts_ms, 2);
    }

    #[test]
    fn replayer_skips_other_operations() {
        let recorder = SessionRecorder::new(SessionRecordLevel::Full);
        recorder
            .record_event(exchange("get-config", r#"<rpc-reply message-id="101"><data/></rpc-reply>"#))
            .expect("record");
        recorder
            .record_event(exchange("edit-config", r#"<rpc-reply message-id="102"><ok/></rpc-reply>"#))
            .expect("record");

        let mut replayer = SessionReplayer::from_recorder(&recorder);
        let reply = replayer.replay_next("edit-config").expect("replay");
        assert!(reply.ok);

        let err = replayer.replay_next("get-config").expect_err("cursor moved past");
        assert!(matches!(err, NetconfError::ReplayMismatchError(_)));
    }

    #[test]
    fn replayer_exposes_hello_context() {
        let replayer = SessionReplayer::from_jsonl(NOISY_FIXTURE).expect("load");
        let ctx = replayer.initial_context().expect("context");

        assert_eq!(ctx.device_addr, "netconf@10.0.0.1:830");
        assert_eq!(ctx.session_id.as_deref(), Some("7"));
        assert_eq!(ctx.framing, Framing::Chunked);
    }
}
