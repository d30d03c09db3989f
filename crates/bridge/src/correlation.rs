//! Correlation Store (C6): per-conversation state that survives across HTTP
//! requests — the upstream response id to chain the next turn from, and the
//! tool-id bindings needed to translate a `tool_result` back into a
//! `function_call_output`.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use mini_moka::sync::Cache;

const IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);
const MAX_CONVERSATIONS: u64 = 100_000;

/// A single tool-call binding: the upstream `call_id` the model used, paired
/// with the `tool_use_id` handed to the downstream client, plus the tool
/// name (carried so a later response translation doesn't need to re-derive it).
#[derive(Debug, Clone)]
pub struct ToolBinding {
    pub tool_use_id: String,
    pub name: String,
}

/// Per-conversation record. `tool_bindings` values are unique; both lookup
/// directions (`call_id` → binding, `tool_use_id` → `call_id`) are O(1) via
/// the secondary index.
#[derive(Debug, Default)]
pub struct Conversation {
    pub last_response_id: Option<String>,
    tool_bindings: HashMap<String, ToolBinding>,
    by_tool_use_id: HashMap<String, String>,
}

impl Conversation {
    pub fn call_id_for_tool_use(&self, tool_use_id: &str) -> Option<&str> {
        self.by_tool_use_id.get(tool_use_id).map(String::as_str)
    }

    pub fn binding_for_call(&self, call_id: &str) -> Option<&ToolBinding> {
        self.tool_bindings.get(call_id)
    }

    pub fn tool_use_id_for_call(&self, call_id: &str) -> Option<&str> {
        self.tool_bindings.get(call_id).map(|b| b.tool_use_id.as_str())
    }

    /// Merge newly-minted bindings into this conversation's tables. Additive:
    /// a collision on `call_id` keeps the newer binding, with a warning.
    pub fn merge_bindings(&mut self, bindings: impl IntoIterator<Item = (String, ToolBinding)>) {
        for (call_id, binding) in bindings {
            if let Some(existing) = self.tool_bindings.get(&call_id)
                && existing.tool_use_id != binding.tool_use_id
            {
                log::warn!(
                    "tool binding collision for call_id {call_id}: replacing {} with {}",
                    existing.tool_use_id,
                    binding.tool_use_id
                );
                self.by_tool_use_id.remove(&existing.tool_use_id);
            }

            self.by_tool_use_id.insert(binding.tool_use_id.clone(), call_id.clone());
            self.tool_bindings.insert(call_id, binding);
        }
    }
}

/// Process-wide store of [`Conversation`] records, keyed by the opaque
/// conversation id from `x-conversation-id`/`x-session-id`. Idle eviction is
/// delegated to `mini_moka`'s time-to-idle policy; [`Store::sweep`] is invoked
/// periodically by the coordinator to force that eviction on a fixed cadence
/// rather than relying purely on access-triggered maintenance.
pub struct Store {
    cache: Cache<String, Arc<Mutex<Conversation>>>,
}

impl Store {
    pub fn new() -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(MAX_CONVERSATIONS)
                .time_to_idle(IDLE_TIMEOUT)
                .build(),
        }
    }

    /// Fetches the conversation record, creating an empty one on first
    /// reference. Touches the entry's idle clock.
    pub fn get_or_create(&self, id: &str) -> Arc<Mutex<Conversation>> {
        if let Some(existing) = self.cache.get(id) {
            return existing;
        }

        let created = Arc::new(Mutex::new(Conversation::default()));
        self.cache.insert(id.to_string(), created.clone());
        created
    }

    /// Re-touches the idle clock for `id` without mutating its contents.
    pub fn touch(&self, id: &str) {
        self.cache.get(id);
    }

    /// Applies the coordinator's end-of-turn update: the new upstream
    /// response id (if the turn completed) and any bindings minted during
    /// the turn.
    pub fn update(&self, id: &str, last_response_id: Option<String>, bindings: Vec<(String, ToolBinding)>) {
        let record = self.get_or_create(id);
        let mut guard = record.lock().unwrap_or_else(|poison| poison.into_inner());

        if let Some(response_id) = last_response_id {
            guard.last_response_id = Some(response_id);
        }

        guard.merge_bindings(bindings);
    }

    pub fn destroy(&self, id: &str) {
        self.cache.invalidate(id);
    }

    /// Forces moka's idle-eviction housekeeping to run now. Intended to be
    /// called from a `tokio::time::interval` task every five minutes so idle
    /// conversations are actually reclaimed on a fixed cadence rather than
    /// only when some other key happens to be accessed.
    pub fn sweep(&self) {
        self.cache.run_pending_tasks();
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_returns_same_record_on_repeat_calls() {
        let store = Store::new();

        let first = store.get_or_create("conv-1");
        first.lock().unwrap().last_response_id = Some("resp_1".to_string());

        let second = store.get_or_create("conv-1");
        assert_eq!(second.lock().unwrap().last_response_id.as_deref(), Some("resp_1"));
    }

    #[test]
    fn bindings_are_bidirectionally_lookupable() {
        let mut conversation = Conversation::default();
        conversation.merge_bindings([(
            "call_1".to_string(),
            ToolBinding {
                tool_use_id: "toolu_1".to_string(),
                name: "calc".to_string(),
            },
        )]);

        assert_eq!(conversation.tool_use_id_for_call("call_1"), Some("toolu_1"));
        assert_eq!(conversation.call_id_for_tool_use("toolu_1"), Some("call_1"));
    }

    #[test]
    fn newer_binding_wins_on_collision() {
        let mut conversation = Conversation::default();
        conversation.merge_bindings([(
            "call_1".to_string(),
            ToolBinding {
                tool_use_id: "toolu_old".to_string(),
                name: "calc".to_string(),
            },
        )]);
        conversation.merge_bindings([(
            "call_1".to_string(),
            ToolBinding {
                tool_use_id: "toolu_new".to_string(),
                name: "calc".to_string(),
            },
        )]);

        assert_eq!(conversation.tool_use_id_for_call("call_1"), Some("toolu_new"));
        assert_eq!(conversation.call_id_for_tool_use("toolu_old"), None);
        assert_eq!(conversation.call_id_for_tool_use("toolu_new"), Some("call_1"));
    }

    #[test]
    fn update_merges_bindings_and_sets_response_id() {
        let store = Store::new();
        store.update(
            "conv-1",
            Some("resp_1".to_string()),
            vec![(
                "call_1".to_string(),
                ToolBinding {
                    tool_use_id: "toolu_1".to_string(),
                    name: "calc".to_string(),
                },
            )],
        );

        let record = store.get_or_create("conv-1");
        let guard = record.lock().unwrap();
        assert_eq!(guard.last_response_id.as_deref(), Some("resp_1"));
        assert_eq!(guard.tool_use_id_for_call("call_1"), Some("toolu_1"));
    }

    #[test]
    fn destroy_removes_the_record() {
        let store = Store::new();
        store.get_or_create("conv-1").lock().unwrap().last_response_id = Some("resp_1".to_string());
        store.destroy("conv-1");

        let record = store.get_or_create("conv-1");
        assert_eq!(record.lock().unwrap().last_response_id, None);
    }
}
