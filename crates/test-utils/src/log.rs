//! # Consensus Log
//!
//! An in-memory, totally ordered message log with one stream per log
//! address.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, bail};
use chrono::Utc;
use dashmap::DashMap;
use hcs_did::{EventId, LogAddress, LogMessage, LogTransport};

/// In-memory [`LogTransport`].
///
/// Clones share the same log.
#[derive(Clone, Debug, Default)]
pub struct MemoryLog {
    topics: Arc<DashMap<LogAddress, Vec<LogMessage>>>,
    stalled: Arc<AtomicBool>,
    unavailable: Arc<AtomicBool>,
    rejecting: Arc<AtomicBool>,
}

impl MemoryLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, appends are recorded but never confirmed: the returned
    /// future stays pending.
    pub fn stall(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    /// When set, reads and appends fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// When set, appends fail while reads still succeed.
    pub fn reject_appends(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    /// Record raw bytes, bypassing any checks. Returns the assigned position.
    pub fn inject(&self, address: &LogAddress, contents: Vec<u8>) -> EventId {
        let mut messages = self.topics.entry(*address).or_default();
        let sequence = messages.len() as u64 + 1;
        let now = Utc::now();
        let timestamp = messages.last().map_or(now, |last| last.event_id.timestamp.max(now));
        let event_id = EventId::new(timestamp, sequence);
        messages.push(LogMessage { event_id, contents });
        event_id
    }

    /// Re-deliver an already recorded message at its original position.
    pub fn redeliver(&self, address: &LogAddress, event_id: EventId) {
        let Some(mut messages) = self.topics.get_mut(address) else {
            return;
        };
        let Some(pos) = messages.iter().position(|m| m.event_id == event_id) else {
            return;
        };
        let duplicate = messages[pos].clone();
        messages.insert(pos + 1, duplicate);
    }

    /// Every message recorded against `address`, in order.
    #[must_use]
    pub fn messages(&self, address: &LogAddress) -> Vec<LogMessage> {
        self.topics.get(address).map(|m| m.clone()).unwrap_or_default()
    }
}

impl LogTransport for MemoryLog {
    async fn read(
        &self, address: &LogAddress, after: Option<EventId>, limit: usize,
    ) -> Result<Vec<LogMessage>> {
        if self.unavailable.load(Ordering::SeqCst) {
            bail!("log is unavailable");
        }
        let Some(messages) = self.topics.get(address) else {
            return Ok(vec![]);
        };
        let page = messages
            .iter()
            .filter(|m| after.is_none_or(|after| m.event_id > after))
            .take(limit)
            .cloned()
            .collect();
        Ok(page)
    }

    async fn append(&self, address: &LogAddress, payload: Vec<u8>) -> Result<EventId> {
        if self.unavailable.load(Ordering::SeqCst) {
            bail!("log is unavailable");
        }
        if self.rejecting.load(Ordering::SeqCst) {
            bail!("submission rejected");
        }
        let event_id = self.inject(address, payload);
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(event_id)
    }
}
