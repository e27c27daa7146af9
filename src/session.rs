//! In-memory photo sessions
//!
//! One session per upload, keyed by a UUID. Entries expire a fixed time
//! after their last access and the store holds at most `capacity` of them,
//! evicting the least recently used first.

use crate::config::{OutputFormat, ServerConfig};
use crate::error::{PhotoError, Result};
use crate::geometry::CropSettings;
use crate::specs::SizeChoice;
use axum::body::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Message returned for unknown or expired session ids
pub const INVALID_SESSION: &str = "Invalid session";

/// Latest result produced for a session
#[derive(Debug, Clone)]
pub struct ProcessedPhoto {
    pub bytes: Bytes,
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
    /// Size choice the photo was produced for (`passport_us`, `custom`, ...)
    pub spec_id: &'static str,
    /// `Some` for auto-processed photos
    pub face_detected: Option<bool>,
}

/// One user's upload and edits
#[derive(Debug, Clone)]
pub struct PhotoSession {
    pub id: String,
    pub original: Bytes,
    pub filename: String,
    pub dimensions: (u32, u32),
    pub size_choice: Option<SizeChoice>,
    pub crop: Option<CropSettings>,
    pub processed: Option<ProcessedPhoto>,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

impl PhotoSession {
    fn new(id: String, original: Bytes, filename: String, dimensions: (u32, u32), now: DateTime<Utc>) -> Self {
        Self {
            id,
            original,
            filename,
            dimensions,
            size_choice: None,
            crop: None,
            processed: None,
            created_at: now,
            last_accessed: now,
        }
    }

    /// Size choice, `Original` until the user picks one
    #[must_use]
    pub fn effective_size(&self) -> SizeChoice {
        self.size_choice.clone().unwrap_or(SizeChoice::Original)
    }
}

/// Store counters
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SessionStoreStats {
    pub created: u64,
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub evicted: u64,
}

impl SessionStoreStats {
    /// Share of lookups that found a live session
    #[must_use]
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Thread-safe session map with TTL and LRU capacity eviction
#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, PhotoSession>>,
    ttl: chrono::Duration,
    capacity: usize,
    stats: Mutex<SessionStoreStats>,
}

impl SessionStore {
    #[must_use]
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::weeks(52 * 100)),
            capacity: capacity.max(1),
            stats: Mutex::new(SessionStoreStats::default()),
        }
    }

    #[must_use]
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.session_ttl(), config.max_sessions)
    }

    /// Register a new upload and return its session id
    ///
    /// # Errors
    /// Lock poisoning only.
    pub fn create(&self, filename: String, original: Bytes, dimensions: (u32, u32)) -> Result<String> {
        self.create_at(filename, original, dimensions, Utc::now())
    }

    fn create_at(
        &self,
        filename: String,
        original: Bytes,
        dimensions: (u32, u32),
        now: DateTime<Utc>,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let (expired, evicted) = {
            let mut sessions = self.write()?;
            let expired = self.remove_expired(&mut sessions, now);

            let mut evicted = 0;
            while sessions.len() >= self.capacity {
                let oldest = sessions
                    .values()
                    .min_by_key(|session| session.last_accessed)
                    .map(|session| session.id.clone());
                let Some(oldest) = oldest else { break };
                sessions.remove(&oldest);
                debug!(session_id = %oldest, "Evicted least recently used session");
                evicted += 1;
            }

            sessions.insert(
                id.clone(),
                PhotoSession::new(id.clone(), original, filename, dimensions, now),
            );
            (expired, evicted)
        };

        self.record(|stats| {
            stats.created += 1;
            stats.expired += expired as u64;
            stats.evicted += evicted;
        })?;
        Ok(id)
    }

    /// Snapshot of a live session; refreshes its last-access time
    ///
    /// # Errors
    /// `Invalid session` for unknown or expired ids.
    pub fn get(&self, id: &str) -> Result<PhotoSession> {
        self.update(id, |session| session.clone())
    }

    /// Run `f` on a live session and refresh its last-access time
    ///
    /// # Errors
    /// `Invalid session` for unknown or expired ids.
    pub fn update<F, R>(&self, id: &str, f: F) -> Result<R>
    where
        F: FnOnce(&mut PhotoSession) -> R,
    {
        self.update_at(id, f, Utc::now())
    }

    fn update_at<F, R>(&self, id: &str, f: F, now: DateTime<Utc>) -> Result<R>
    where
        F: FnOnce(&mut PhotoSession) -> R,
    {
        let outcome = {
            let mut sessions = self.write()?;
            match sessions.get(id).map(|session| self.is_expired(session, now)) {
                Some(false) => sessions
                    .get_mut(id)
                    .map(|session| {
                        session.last_accessed = now;
                        f(session)
                    })
                    .ok_or(false),
                Some(true) => {
                    sessions.remove(id);
                    Err(true)
                },
                None => Err(false),
            }
        };

        match outcome {
            Ok(result) => {
                self.record(|stats| stats.hits += 1)?;
                Ok(result)
            },
            Err(expired) => {
                self.record(|stats| {
                    stats.misses += 1;
                    if expired {
                        stats.expired += 1;
                    }
                })?;
                Err(PhotoError::invalid_input(INVALID_SESSION))
            },
        }
    }

    /// # Errors
    /// Lock poisoning only.
    pub fn remove(&self, id: &str) -> Result<bool> {
        Ok(self.write()?.remove(id).is_some())
    }

    /// Drop every expired session and return how many went
    ///
    /// # Errors
    /// Lock poisoning only.
    pub fn sweep_expired(&self) -> Result<usize> {
        self.sweep_expired_at(Utc::now())
    }

    fn sweep_expired_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let removed = {
            let mut sessions = self.write()?;
            self.remove_expired(&mut sessions, now)
        };
        if removed > 0 {
            self.record(|stats| stats.expired += removed as u64)?;
        }
        Ok(removed)
    }

    /// Live session count, expired entries not yet swept included
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().map_or(0, |sessions| sessions.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn stats(&self) -> SessionStoreStats {
        self.stats.lock().map(|stats| *stats).unwrap_or_default()
    }

    /// Sweep expired sessions every `interval` until the task is aborted
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match self.sweep_expired() {
                    Ok(0) => {},
                    Ok(removed) => info!(removed, remaining = self.len(), "Expired sessions swept"),
                    Err(e) => tracing::error!("Session sweep failed: {e}"),
                }
            }
        })
    }

    fn is_expired(&self, session: &PhotoSession, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(session.last_accessed) > self.ttl
    }

    fn remove_expired(&self, sessions: &mut HashMap<String, PhotoSession>, now: DateTime<Utc>) -> usize {
        let before = sessions.len();
        sessions.retain(|_, session| !self.is_expired(session, now));
        before - sessions.len()
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, PhotoSession>>> {
        self.sessions
            .write()
            .map_err(|_| PhotoError::internal("Session store lock poisoned"))
    }

    fn record<F: FnOnce(&mut SessionStoreStats)>(&self, f: F) -> Result<()> {
        let mut stats = self
            .stats
            .lock()
            .map_err(|_| PhotoError::internal("Session stats lock poisoned"))?;
        f(&mut stats);
        Ok(())
    }
}
