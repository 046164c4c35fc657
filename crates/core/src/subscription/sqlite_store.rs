//! SQLite-backed subscription store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use tracing::warn;

use crate::classifier::CandidateRelease;
use crate::media::{EpisodeSet, MediaType};
use crate::searcher::SearchSnapshotStore;

use super::legacy::parse_legacy_description;
use super::{
    HistoryEntry, NewSubscription, StoreError, Subscription, SubscriptionFilters,
    SubscriptionState, SubscriptionStore,
};

const SUBSCRIPTION_COLUMNS: &str = "id, name, year, media_type, external_id, season, filters, \
     description, quality_upgrade, best_rank, missing_episodes, total_episodes, start_episode, \
     state, created_at, updated_at";

/// SQLite-backed subscription store, also holding the last interactive search.
pub struct SqliteSubscriptionStore {
    conn: Mutex<Connection>,
}

impl SqliteSubscriptionStore {
    /// Open (or create) the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS subscriptions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                year INTEGER,
                media_type TEXT NOT NULL,
                external_id TEXT,
                season INTEGER,
                filters TEXT,
                description TEXT,
                quality_upgrade INTEGER NOT NULL DEFAULT 0,
                best_rank INTEGER,
                missing_episodes TEXT,
                total_episodes INTEGER,
                start_episode INTEGER,
                state TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_subscriptions_state ON subscriptions(state);

            CREATE TABLE IF NOT EXISTS subscription_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                subscription_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                year INTEGER,
                media_type TEXT NOT NULL,
                season INTEGER,
                satisfied_episodes TEXT,
                finished_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS search_results (
                position INTEGER PRIMARY KEY,
                payload TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        // Migration: rows written before filters moved out of `description`
        let _ = conn.execute("ALTER TABLE subscriptions ADD COLUMN filters TEXT", []);

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Insert a row carrying only a legacy packed description.
    pub fn import_legacy(
        &self,
        name: &str,
        year: Option<u32>,
        media_type: MediaType,
        season: Option<u32>,
        description: &str,
    ) -> Result<Subscription, StoreError> {
        let id = {
            let conn = self.conn()?;
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO subscriptions (name, year, media_type, season, description, state, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    name,
                    year,
                    media_type.as_str(),
                    season,
                    description,
                    SubscriptionState::New.as_str(),
                    now,
                    now,
                ],
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;
            conn.last_insert_rowid()
        };
        self.get(id)?.ok_or(StoreError::NotFound(id))
    }

    fn row_to_subscription(row: &Row<'_>) -> rusqlite::Result<Subscription> {
        let id: i64 = row.get(0)?;
        let media_type: String = row.get(3)?;
        let filters_json: Option<String> = row.get(6)?;
        let description: Option<String> = row.get(7)?;
        let missing_json: Option<String> = row.get(10)?;
        let state: String = row.get(13)?;
        let created_at: String = row.get(14)?;
        let updated_at: String = row.get(15)?;

        let mut quality_upgrade: bool = row.get(8)?;
        let mut total_episodes: Option<u32> = row.get(11)?;
        let mut start_episode: Option<u32> = row.get(12)?;

        let filters = match (filters_json, description.filter(|d| !d.is_empty())) {
            (Some(json), _) => serde_json::from_str(&json).unwrap_or_else(|e| {
                warn!(subscription_id = id, error = %e, "Unreadable filters, using defaults");
                SubscriptionFilters::default()
            }),
            (None, Some(desc)) => {
                let legacy = parse_legacy_description(&desc);
                quality_upgrade |= legacy.quality_upgrade;
                total_episodes = total_episodes.or(legacy.total_episodes);
                start_episode = start_episode.or(legacy.current_episode);
                legacy.filters
            }
            (None, None) => SubscriptionFilters::default(),
        };

        // Corrupt coverage reads as "never computed"
        let missing_episodes = missing_json.and_then(|json| {
            serde_json::from_str::<EpisodeSet>(&json)
                .map_err(|e| {
                    warn!(subscription_id = id, error = %e, "Corrupt missing episodes, resetting");
                })
                .ok()
        });

        Ok(Subscription {
            id,
            name: row.get(1)?,
            year: row.get(2)?,
            media_type: MediaType::parse(&media_type).unwrap_or(MediaType::Movie),
            external_id: row.get(4)?,
            season: row.get(5)?,
            filters,
            quality_upgrade,
            best_rank: row.get(9)?,
            missing_episodes,
            total_episodes,
            start_episode,
            state: SubscriptionState::parse(&state).unwrap_or(SubscriptionState::New),
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
        })
    }

    fn row_to_history(row: &Row<'_>) -> rusqlite::Result<HistoryEntry> {
        let media_type: String = row.get(4)?;
        let satisfied: Option<String> = row.get(6)?;
        let finished_at: String = row.get(7)?;
        Ok(HistoryEntry {
            id: row.get(0)?,
            subscription_id: row.get(1)?,
            name: row.get(2)?,
            year: row.get(3)?,
            media_type: MediaType::parse(&media_type).unwrap_or(MediaType::Movie),
            season: row.get(5)?,
            satisfied_episodes: satisfied.and_then(|json| serde_json::from_str(&json).ok()),
            finished_at: parse_timestamp(&finished_at),
        })
    }

    /// Run an UPDATE and map "no row touched" to `NotFound`.
    fn execute_update(
        &self,
        id: i64,
        sql: &str,
        values: &[&dyn rusqlite::ToSql],
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(sql, values)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

impl SubscriptionStore for SqliteSubscriptionStore {
    fn create(&self, request: &NewSubscription) -> Result<Subscription, StoreError> {
        let filters_json = to_json(&request.filters)?;
        let id = {
            let conn = self.conn()?;
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO subscriptions (name, year, media_type, external_id, season, filters, quality_upgrade, total_episodes, start_episode, state, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    request.name,
                    request.year,
                    request.media_type.as_str(),
                    request.external_id,
                    request.season,
                    filters_json,
                    request.quality_upgrade,
                    request.total_episodes,
                    request.start_episode,
                    SubscriptionState::New.as_str(),
                    now,
                    now,
                ],
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;
            conn.last_insert_rowid()
        };

        self.get(id)?.ok_or(StoreError::NotFound(id))
    }

    fn get(&self, id: i64) -> Result<Option<Subscription>, StoreError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM subscriptions WHERE id = ?", SUBSCRIPTION_COLUMNS);
        let result = conn.query_row(&sql, params![id], Self::row_to_subscription);

        match result {
            Ok(subscription) => Ok(Some(subscription)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e.to_string())),
        }
    }

    fn list_by_state(
        &self,
        state: SubscriptionState,
        media_type: Option<MediaType>,
    ) -> Result<Vec<Subscription>, StoreError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM subscriptions WHERE state = ?1 AND (?2 IS NULL OR media_type = ?2) ORDER BY id ASC",
            SUBSCRIPTION_COLUMNS
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(
                params![state.as_str(), media_type.map(|t| t.as_str())],
                Self::row_to_subscription,
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut subscriptions = Vec::new();
        for row_result in rows {
            subscriptions.push(row_result.map_err(|e| StoreError::Database(e.to_string()))?);
        }
        Ok(subscriptions)
    }

    fn update_state(&self, id: i64, state: SubscriptionState) -> Result<(), StoreError> {
        self.execute_update(
            id,
            "UPDATE subscriptions SET state = ?, updated_at = ? WHERE id = ?",
            params![state.as_str(), Utc::now().to_rfc3339(), id],
        )
    }

    fn update_missing(
        &self,
        id: i64,
        missing: Option<&EpisodeSet>,
        total_episodes: Option<u32>,
    ) -> Result<(), StoreError> {
        let missing_json = missing.map(to_json).transpose()?;
        self.execute_update(
            id,
            "UPDATE subscriptions SET missing_episodes = ?, total_episodes = COALESCE(?, total_episodes), updated_at = ? WHERE id = ?",
            params![missing_json, total_episodes, Utc::now().to_rfc3339(), id],
        )
    }

    fn update_best_rank(&self, id: i64, rank: u32) -> Result<(), StoreError> {
        self.execute_update(
            id,
            "UPDATE subscriptions SET best_rank = ?, updated_at = ? WHERE id = ?",
            params![rank, Utc::now().to_rfc3339(), id],
        )
    }

    fn archive(&self, id: i64, satisfied: Option<&EpisodeSet>) -> Result<HistoryEntry, StoreError> {
        let subscription = self.get(id)?.ok_or(StoreError::NotFound(id))?;
        let satisfied_json = satisfied.map(to_json).transpose()?;
        let finished_at = Utc::now();

        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        tx.execute(
            "INSERT INTO subscription_history (subscription_id, name, year, media_type, season, satisfied_episodes, finished_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                id,
                subscription.name,
                subscription.year,
                subscription.media_type.as_str(),
                subscription.season,
                satisfied_json,
                finished_at.to_rfc3339(),
            ],
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;
        let history_id = tx.last_insert_rowid();
        tx.execute("DELETE FROM subscriptions WHERE id = ?", params![id])
            .map_err(|e| StoreError::Database(e.to_string()))?;
        tx.commit()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(HistoryEntry {
            id: history_id,
            subscription_id: id,
            name: subscription.name,
            year: subscription.year,
            media_type: subscription.media_type,
            season: subscription.season,
            satisfied_episodes: satisfied.cloned(),
            finished_at,
        })
    }

    fn history(&self) -> Result<Vec<HistoryEntry>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, subscription_id, name, year, media_type, season, satisfied_episodes, finished_at FROM subscription_history ORDER BY id ASC",
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], Self::row_to_history)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut entries = Vec::new();
        for row_result in rows {
            entries.push(row_result.map_err(|e| StoreError::Database(e.to_string()))?);
        }
        Ok(entries)
    }

    fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.execute_update(id, "DELETE FROM subscriptions WHERE id = ?", params![id])
    }
}

impl SearchSnapshotStore for SqliteSubscriptionStore {
    fn replace_last_search(&self, candidates: &[CandidateRelease]) -> Result<(), StoreError> {
        let payloads = candidates
            .iter()
            .map(to_json)
            .collect::<Result<Vec<_>, _>>()?;

        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        tx.execute("DELETE FROM search_results", [])
            .map_err(|e| StoreError::Database(e.to_string()))?;
        for (position, payload) in payloads.iter().enumerate() {
            tx.execute(
                "INSERT INTO search_results (position, payload) VALUES (?, ?)",
                params![position as i64, payload],
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;
        }
        tx.commit()
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn last_search(&self) -> Result<Vec<CandidateRelease>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT payload FROM search_results ORDER BY position ASC")
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut candidates = Vec::new();
        for row_result in rows {
            let payload = row_result.map_err(|e| StoreError::Database(e.to_string()))?;
            candidates.push(
                serde_json::from_str(&payload)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?,
            );
        }
        Ok(candidates)
    }
}
