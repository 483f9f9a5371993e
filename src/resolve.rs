//! # DID Resolver
//!
//! Resolve a `did:hedera` identifier into a [`DocumentState`] by replaying the
//! identifier's operation stream from the consensus log.
//!
//! Resolution is read-only. An identifier with no events resolves to the
//! empty document skeleton rather than an error: absence of history is a
//! valid state.
//!
//! See [DID resolution](https://www.w3.org/TR/did-core/#did-resolution) for more.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::instrument;

use crate::config::Config;
use crate::document::DocumentState;
use crate::error::{Error, Result};
use crate::identifier::Identifier;
use crate::operation::{self, EventId};
use crate::provider::LogTransport;

#[derive(Debug)]
struct Snapshot {
    fetched: Instant,
    state: Arc<DocumentState>,
}

/// Replays operation streams into document snapshots.
///
/// Cloning is cheap: clones share the log transport and the snapshot cache.
#[derive(Clone, Debug)]
pub struct Resolver<L> {
    log: L,
    config: Config,
    cache: Arc<DashMap<String, Snapshot>>,
}

impl<L: LogTransport> Resolver<L> {
    /// Create a resolver reading from `log`.
    #[must_use]
    pub fn new(log: L, config: Config) -> Self {
        Self {
            log,
            config,
            cache: Arc::new(DashMap::new()),
        }
    }

    /// The resolver's configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The log transport the resolver reads from.
    #[must_use]
    pub const fn log(&self) -> &L {
        &self.log
    }

    /// Resolve the current state of a DID document.
    ///
    /// Serves a cached snapshot when one younger than the configured cache
    /// lifetime exists, otherwise replays the log.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] if `did` does not parse, or
    /// [`Error::LogUnavailable`] if the log cannot be read.
    #[instrument(level = "debug", skip(self))]
    pub async fn resolve(&self, did: &str) -> Result<DocumentState> {
        let identifier = Identifier::from_str(did)?;
        if let Some(state) = self.cached(&identifier.did()) {
            return Ok(state);
        }
        self.replay(&identifier).await
    }

    /// Resolve the current state of a DID document, bypassing the cache.
    ///
    /// The cache is refreshed with the result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] if `did` does not parse, or
    /// [`Error::LogUnavailable`] if the log cannot be read.
    #[instrument(level = "debug", skip(self))]
    pub async fn resolve_fresh(&self, did: &str) -> Result<DocumentState> {
        let identifier = Identifier::from_str(did)?;
        self.replay(&identifier).await
    }

    /// Drop any cached snapshot for `did`.
    pub fn invalidate(&self, did: &str) {
        let key = Identifier::from_str(did).map_or_else(|_| did.to_string(), |id| id.did());
        self.cache.remove(&key);
    }

    fn cached(&self, did: &str) -> Option<DocumentState> {
        if self.config.cache_ttl.is_zero() {
            return None;
        }
        let snapshot = self.cache.get(did)?;
        if snapshot.fetched.elapsed() >= self.config.cache_ttl {
            return None;
        }
        Some(snapshot.state.as_ref().clone())
    }

    async fn replay(&self, identifier: &Identifier) -> Result<DocumentState> {
        let did = identifier.did();
        let mut state = DocumentState::empty(&did);
        let mut after: Option<EventId> = None;

        'pages: loop {
            let page = self
                .log
                .read(&identifier.log_address, after, self.config.page_size.max(1))
                .await
                .map_err(|e| Error::LogUnavailable(format!("{e:#}")))?;
            let Some(last) = page.last() else {
                break;
            };
            if after.is_some_and(|prev| last.event_id <= prev) {
                tracing::warn!(%did, "log page did not advance, stopping replay");
                break;
            }
            after = Some(last.event_id);

            for msg in &page {
                let event = match operation::decode(msg) {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::warn!(event_id = ?msg.event_id, "skipping event: {e}");
                        continue;
                    }
                };
                if event.did != did {
                    continue;
                }
                if state.metadata.version_id.is_some_and(|applied| event.event_id <= applied) {
                    tracing::warn!(event_id = ?event.event_id, "skipping duplicate event");
                    continue;
                }
                if let Err(e) = operation::verify(&event, &state) {
                    tracing::warn!(
                        event_id = ?event.event_id, operation = event.operation.name(),
                        "skipping event: {e}"
                    );
                    continue;
                }

                state = state.apply(&event);
                if state.is_deactivated() {
                    break 'pages;
                }
            }
        }

        tracing::debug!(%did, version = ?state.metadata.version_id, "replayed document");
        if !self.config.cache_ttl.is_zero() {
            self.store(did, &state);
        }
        Ok(state)
    }

    // A replay that started before a confirmed mutation can finish after it:
    // never replace a snapshot with an older one.
    fn store(&self, did: String, state: &DocumentState) {
        let snapshot = Snapshot {
            fetched: Instant::now(),
            state: Arc::new(state.clone()),
        };
        match self.cache.entry(did) {
            Entry::Occupied(mut entry) => {
                if entry.get().state.metadata.version_id <= state.metadata.version_id {
                    entry.insert(snapshot);
                } else {
                    tracing::debug!(did = %entry.key(), "keeping newer cached snapshot");
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(snapshot);
            }
        }
    }
}
