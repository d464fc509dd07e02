use crate::command::storage::CommandSummary;
use crate::command::CommandStorage;
use dashmap::DashMap;
use std::sync::Arc;

/// Lock-free view of every tracked command, keyed by storage uuid.
///
/// The engine writes; anything holding a clone reads without going through
/// the engine.
#[derive(Debug, Clone, Default)]
pub struct CommandBoard {
    entries: Arc<DashMap<String, CommandSummary>>,
}

impl CommandBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn upsert(&self, storage: &CommandStorage) {
        self.entries
            .insert(storage.uuid().to_string(), storage.summary());
    }

    pub(crate) fn remove(&self, uuid: &str) -> Option<CommandSummary> {
        self.entries.remove(uuid).map(|(_, summary)| summary)
    }

    pub(crate) fn clear(&self) {
        self.entries.clear();
    }

    pub fn get(&self, uuid: &str) -> Option<CommandSummary> {
        self.entries.get(uuid).map(|entry| entry.clone())
    }

    pub fn find_by_cmd_id(&self, cmd_id: &str) -> Option<CommandSummary> {
        self.entries
            .iter()
            .find(|entry| entry.cmd_id == cmd_id)
            .map(|entry| entry.value().clone())
    }

    pub fn list(&self) -> Vec<CommandSummary> {
        self.entries.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
