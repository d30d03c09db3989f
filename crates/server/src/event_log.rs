//! Optional JSONL event logging (`LOG_EVENTS=true`), one line per upstream
//! or downstream event, for offline inspection of a session's traffic.
//! Ad-hoc logging is explicitly out of the translator's scope; this is
//! the external collaborator that scope carves out.

use jiff::Zoned;
use serde::Serialize;
use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};

pub struct EventLogger {
    dir: PathBuf,
    file: Mutex<Option<(String, std::fs::File)>>,
}

impl EventLogger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            file: Mutex::new(None),
        }
    }

    /// Appends one JSON line for `conversation_id`, creating
    /// `<LOG_DIR>/<conversation_id>.jsonl` on first use for that
    /// conversation. Failures are logged and otherwise swallowed — event
    /// logging must never take down a request.
    pub fn log(&self, conversation_id: &str, direction: &str, payload: &impl Serialize) {
        if let Err(err) = self.try_log(conversation_id, direction, payload) {
            log::warn!("event log write failed: {err}");
        }
    }

    fn try_log(&self, conversation_id: &str, direction: &str, payload: &impl Serialize) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;

        let mut guard = self.file.lock().unwrap_or_else(|poison| poison.into_inner());

        let needs_new_file = match &*guard {
            Some((id, _)) => id != conversation_id,
            None => true,
        };

        if needs_new_file {
            let path = self.path_for(conversation_id);
            let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
            *guard = Some((conversation_id.to_string(), file));
        }

        let (_, file) = guard.as_mut().expect("just populated above");

        let record = serde_json::json!({
            "timestamp": Zoned::now().to_string(),
            "direction": direction,
            "event": serde_json::to_value(payload).unwrap_or_default(),
        });

        writeln!(file, "{record}")
    }

    fn path_for(&self, conversation_id: &str) -> PathBuf {
        let sanitized: String = conversation_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();

        Path::join(&self.dir, format!("{sanitized}.jsonl"))
    }
}
