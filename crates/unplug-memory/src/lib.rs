//! In-memory implementation of the remote backend client.
//!
//! A lightweight, non-persistent stand-in for the hosted backend, useful for:
//! - Offline development without a backend project
//! - Integration tests for the synchronization engine
//! - Reference implementation of the `RemoteClient` contract
//!
//! Rows live in per-table vectors. Queries support equality filtering,
//! creation-descending ordering, and limit/offset pagination. Mutations fan
//! change events out to live subscribers of the owning user, in commit order.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use tokio::sync::mpsc;
use tracing::warn;

use unplug_api::{
    Change, RemoteClient, Row, RowChange, RowMatch, Subscription, SubscriptionHandle, SyncError,
    CREATED_AT_COLUMN, ID_COLUMN, OWNER_COLUMN, SUBSCRIPTION_BUFFER,
};

/// Field-equality query with pagination: the subset of the hosted backend's
/// query builder the app actually uses.
#[derive(Debug, Clone, Default)]
pub struct RowQuery {
    eq: Vec<(String, serde_json::Value)>,
    limit: Option<usize>,
    offset: usize,
}

impl RowQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: impl Into<String>, value: serde_json::Value) -> Self {
        self.eq.push((column.into(), value));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    fn matches(&self, row: &Row) -> bool {
        self.eq
            .iter()
            .all(|(column, value)| row.get(column) == Some(value))
    }
}

struct Subscriber {
    owner_id: String,
    released: Arc<AtomicBool>,
    tx: mpsc::Sender<RowChange>,
}

#[derive(Default)]
struct Table {
    rows: Vec<Row>,
    subscribers: Vec<Subscriber>,
}

impl Table {
    fn position(&self, matcher: &RowMatch) -> Option<usize> {
        self.rows.iter().position(|row| {
            row_str(row, ID_COLUMN) == Some(matcher.id.as_str())
                && row_str(row, OWNER_COLUMN) == Some(matcher.owner_id.as_str())
        })
    }

    /// Fan a change out to live subscribers of the owning user. Released and
    /// closed channels are pruned; a full channel drops the event (the
    /// consumer resyncs via manual refresh).
    fn notify(&mut self, owner_id: &str, change: RowChange) {
        self.subscribers.retain(|subscriber| {
            if subscriber.released.load(Ordering::SeqCst) {
                return false;
            }
            if subscriber.owner_id != owner_id {
                return true;
            }
            match subscriber.tx.try_send(change.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Closed(_)) => false,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(owner_id, "subscriber lagging, dropping change event");
                    true
                }
            }
        });
    }
}

/// In-memory mock of the hosted backend.
#[derive(Default)]
pub struct MemoryRemote {
    tables: Mutex<HashMap<String, Table>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run an equality/pagination query against one table.
    pub fn query(&self, table: &str, query: &RowQuery) -> Vec<Row> {
        let tables = self.tables.lock().unwrap();
        let Some(table) = tables.get(table) else {
            return Vec::new();
        };

        let mut rows: Vec<Row> = table
            .rows
            .iter()
            .filter(|row| query.matches(row))
            .cloned()
            .collect();
        rows.sort_by_key(|row| Reverse(created_key(row)));

        let end = query
            .limit
            .map(|limit| (query.offset + limit).min(rows.len()))
            .unwrap_or(rows.len());
        let start = query.offset.min(end);
        rows[start..end].to_vec()
    }

    /// Number of rows currently stored in a table, across all owners.
    pub fn row_count(&self, table: &str) -> usize {
        let tables = self.tables.lock().unwrap();
        tables.get(table).map(|t| t.rows.len()).unwrap_or(0)
    }
}

fn row_str<'a>(row: &'a Row, column: &str) -> Option<&'a str> {
    row.get(column).and_then(|value| value.as_str())
}

/// Sort key for creation-descending ordering; unparseable or missing
/// timestamps sort last.
fn created_key(row: &Row) -> Option<DateTime<FixedOffset>> {
    row_str(row, CREATED_AT_COLUMN).and_then(|s| DateTime::parse_from_rfc3339(s).ok())
}

#[async_trait]
impl RemoteClient for MemoryRemote {
    async fn fetch_owned(&self, table: &str, owner_id: &str) -> Result<Vec<Row>, SyncError> {
        Ok(self.query(
            table,
            &RowQuery::new().eq(OWNER_COLUMN, serde_json::Value::String(owner_id.to_string())),
        ))
    }

    async fn insert_row(&self, table: &str, row: Row) -> Result<Row, SyncError> {
        let mut row = row;
        let Some(owner_id) = row_str(&row, OWNER_COLUMN).map(str::to_string) else {
            return Err(SyncError::remote(format!(
                "insert into {table} rejected: row has no {OWNER_COLUMN}"
            )));
        };

        // Server-assigned fields, filled only when the caller left them out.
        if !row.contains_key(ID_COLUMN) {
            row.insert(
                ID_COLUMN.to_string(),
                serde_json::Value::String(uuid::Uuid::new_v4().to_string()),
            );
        }
        if !row.contains_key(CREATED_AT_COLUMN) {
            row.insert(
                CREATED_AT_COLUMN.to_string(),
                serde_json::to_value(chrono::Utc::now()).unwrap_or(serde_json::Value::Null),
            );
        }

        let mut tables = self.tables.lock().unwrap();
        let table = tables.entry(table.to_string()).or_default();

        let id = row_str(&row, ID_COLUMN).unwrap_or_default().to_string();
        if table
            .rows
            .iter()
            .any(|existing| row_str(existing, ID_COLUMN) == Some(id.as_str()))
        {
            return Err(SyncError::remote(format!("duplicate id {id}")));
        }

        table.rows.push(row.clone());
        table.notify(&owner_id, Change::Inserted { record: row.clone() });
        Ok(row)
    }

    async fn update_rows(
        &self,
        table: &str,
        matcher: &RowMatch,
        patch: Row,
    ) -> Result<u64, SyncError> {
        let mut tables = self.tables.lock().unwrap();
        let Some(table) = tables.get_mut(table) else {
            return Ok(0);
        };
        let Some(index) = table.position(matcher) else {
            return Ok(0);
        };

        for (column, value) in patch {
            table.rows[index].insert(column, value);
        }
        let updated = table.rows[index].clone();
        table.notify(&matcher.owner_id, Change::Updated { record: updated });
        Ok(1)
    }

    async fn delete_rows(&self, table: &str, matcher: &RowMatch) -> Result<u64, SyncError> {
        let mut tables = self.tables.lock().unwrap();
        let Some(table) = tables.get_mut(table) else {
            return Ok(0);
        };
        let Some(index) = table.position(matcher) else {
            return Ok(0);
        };

        table.rows.remove(index);
        table.notify(
            &matcher.owner_id,
            Change::Deleted {
                id: matcher.id.clone(),
            },
        );
        Ok(1)
    }

    async fn subscribe(&self, table: &str, owner_id: &str) -> Result<Subscription, SyncError> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let handle = SubscriptionHandle::new();

        let mut tables = self.tables.lock().unwrap();
        let table = tables.entry(table.to_string()).or_default();
        table.subscribers.push(Subscriber {
            owner_id: owner_id.to_string(),
            released: handle.released_flag(),
            tx,
        });

        Ok(Subscription { handle, events: rx })
    }
}
