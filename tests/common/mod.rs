#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eventbrite_etl::domain::model::value_as_key;
use eventbrite_etl::domain::ports::Warehouse;
use eventbrite_etl::{Record, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Warehouse double that keeps rows per table in memory.
#[derive(Clone, Default)]
pub struct MemoryWarehouse {
    tables: Arc<Mutex<HashMap<String, Vec<Record>>>>,
    deletes: Arc<Mutex<Vec<(String, String, Vec<(String, String)>)>>>,
    refreshes: Arc<Mutex<usize>>,
    last_load: Option<DateTime<Utc>>,
}

fn matches(record: &Record, item_id: &str, secondary: &[(&str, &str)]) -> bool {
    record.id().as_deref() == Some(item_id)
        && secondary.iter().all(|(key, value)| {
            record.get(key).and_then(value_as_key).as_deref() == Some(*value)
        })
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_last_load(last_load: DateTime<Utc>) -> Self {
        Self {
            last_load: Some(last_load),
            ..Self::default()
        }
    }

    pub async fn seed(&self, table: &str, record: Record) {
        let mut tables = self.tables.lock().await;
        tables.entry(table.to_string()).or_default().push(record);
    }

    pub async fn rows(&self, table: &str) -> Vec<Record> {
        let tables = self.tables.lock().await;
        tables.get(table).cloned().unwrap_or_default()
    }

    pub async fn deletes(&self) -> Vec<(String, String, Vec<(String, String)>)> {
        self.deletes.lock().await.clone()
    }

    pub async fn refresh_count(&self) -> usize {
        *self.refreshes.lock().await
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn last_event_load_date(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.last_load)
    }

    async fn get_item(
        &self,
        table: &str,
        item_id: &str,
        secondary: &[(&str, &str)],
    ) -> Result<Option<Record>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .get(table)
            .and_then(|rows| rows.iter().find(|r| matches(r, item_id, secondary)))
            .cloned())
    }

    async fn delete_item(
        &self,
        table: &str,
        item_id: &str,
        secondary: &[(&str, &str)],
    ) -> Result<u64> {
        self.deletes.lock().await.push((
            table.to_string(),
            item_id.to_string(),
            secondary
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ));

        let mut tables = self.tables.lock().await;
        let Some(rows) = tables.get_mut(table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|r| !matches(r, item_id, secondary));
        Ok((before - rows.len()) as u64)
    }

    async fn load_item(&self, item: &Record, table: &str) -> Result<()> {
        self.seed(table, item.clone()).await;
        Ok(())
    }

    async fn load_items(&self, items: &[Record], table: &str) -> Result<()> {
        for item in items {
            self.seed(table, item.clone()).await;
        }
        Ok(())
    }

    async fn refresh_views(&self) -> Result<()> {
        *self.refreshes.lock().await += 1;
        Ok(())
    }
}
