use crate::config::DatabaseSettings;
use crate::core::sql;
use crate::domain::model::{Record, TableColumn};
use crate::domain::ports::Warehouse;
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

/// The Postgres schema the loader writes into.
pub struct PgWarehouse {
    pool: PgPool,
    schema: String,
    views: Vec<String>,
    // Column lists per table, fetched once per run.
    columns: Mutex<HashMap<String, Vec<TableColumn>>>,
}

impl PgWarehouse {
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self> {
        let options = PgConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .username(&settings.user)
            .password(&settings.password)
            .database(&settings.database)
            .application_name("eventbrite-etl");

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_secs(8))
            .connect_with(options)
            .await?;

        tracing::info!(
            "Connected to {}:{}/{} (schema {})",
            settings.host,
            settings.port,
            settings.database,
            settings.schema
        );

        Ok(Self::with_pool(
            pool,
            settings.schema.clone(),
            settings.materialized_views.clone(),
        ))
    }

    pub fn with_pool(pool: PgPool, schema: String, views: Vec<String>) -> Self {
        Self {
            pool,
            schema,
            views,
            columns: Mutex::new(HashMap::new()),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Runs raw SQL; several statements separated by `;` are allowed.
    pub async fn execute(&self, sql: &str) -> Result<()> {
        sqlx::raw_sql(sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn execute_in_transaction(&self, statements: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for statement in statements {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn refresh_view(&self, view: &str) -> Result<()> {
        tracing::info!("Refreshing materialized view {}.{}", self.schema, view);
        sqlx::query(&sql::refresh_view_statement(&self.schema, view))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn backup_table(&self, table: &str) -> Result<()> {
        let backup = sql::backup_table_name(table);
        tracing::info!("Backing up {}.{} to {}", self.schema, table, backup);
        self.execute_in_transaction(&sql::copy_table_statements(&self.schema, table, &backup))
            .await?;
        self.forget_columns(&backup).await;
        Ok(())
    }

    pub async fn revert_table(&self, table: &str) -> Result<()> {
        let backup = sql::backup_table_name(table);
        tracing::info!("Reverting {}.{} from {}", self.schema, table, backup);
        self.execute_in_transaction(&sql::restore_table_statements(&self.schema, &backup, table))
            .await
    }

    pub async fn truncate_table(&self, table: &str) -> Result<()> {
        tracing::info!("Truncating {}.{}", self.schema, table);
        sqlx::query(&sql::truncate_statement(&self.schema, table))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn forget_columns(&self, table: &str) {
        self.columns.lock().await.remove(table);
    }

    /// Column names and types of `table`, cached after the first lookup.
    pub async fn get_columns(&self, table: &str) -> Result<Vec<TableColumn>> {
        let mut cache = self.columns.lock().await;
        if let Some(columns) = cache.get(table) {
            return Ok(columns.clone());
        }

        let rows: Vec<(String, String)> = sqlx::query_as(sql::COLUMNS_QUERY)
            .bind(&self.schema)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        let columns: Vec<TableColumn> = rows
            .into_iter()
            .map(|(name, sql_type)| TableColumn { name, sql_type })
            .collect();
        tracing::debug!("{}.{} has {} columns", self.schema, table, columns.len());

        cache.insert(table.to_string(), columns.clone());
        Ok(columns)
    }

    async fn column(&self, table: &str, name: &str) -> Result<TableColumn> {
        self.get_columns(table)
            .await?
            .into_iter()
            .find(|c| c.name == name)
            .ok_or_else(|| EtlError::ValidationError {
                message: format!("{}.{} has no column {}", self.schema, table, name),
            })
    }

    pub async fn update_column(
        &self,
        table: &str,
        item_id: &str,
        column: &str,
        value: &Value,
    ) -> Result<u64> {
        let column = self.column(table, column).await?;
        let result = sqlx::query(&sql::update_column_statement(&self.schema, table, &column))
            .bind(sql::encode_value(value, &column))
            .bind(item_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_rows(
        &self,
        table: &str,
        columns: &[&TableColumn],
        rows: &[Record],
    ) -> Result<()> {
        let statement = sql::insert_statement(&self.schema, table, columns, rows.len());
        let mut query = sqlx::query(&statement);
        for value in sql::row_params(rows, columns) {
            query = query.bind(value);
        }
        query.execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Warehouse for PgWarehouse {
    async fn last_event_load_date(&self) -> Result<Option<DateTime<Utc>>> {
        let raw: Option<String> = sqlx::query_scalar(&sql::last_event_load_statement(&self.schema))
            .fetch_one(&self.pool)
            .await?;

        Ok(raw.as_deref().and_then(|raw| {
            let parsed = sql::parse_db_timestamp(raw);
            if parsed.is_none() {
                tracing::warn!("Could not parse last load_datetime {:?}", raw);
            }
            parsed
        }))
    }

    async fn get_item(
        &self,
        table: &str,
        item_id: &str,
        secondary: &[(&str, &str)],
    ) -> Result<Option<Record>> {
        let statement = sql::select_item_statement(&self.schema, table, secondary);
        let mut query = sqlx::query_scalar::<_, String>(&statement).bind(item_id);
        for (_, value) in secondary {
            query = query.bind(*value);
        }

        match query.fetch_optional(&self.pool).await? {
            Some(json) => Ok(Record::from_value(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn delete_item(
        &self,
        table: &str,
        item_id: &str,
        secondary: &[(&str, &str)],
    ) -> Result<u64> {
        let statement = sql::delete_statement(&self.schema, table, secondary);
        let mut query = sqlx::query(&statement).bind(item_id);
        for (_, value) in secondary {
            query = query.bind(*value);
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn load_item(&self, item: &Record, table: &str) -> Result<()> {
        let columns = self.get_columns(table).await?;
        let matching = sql::insert_columns(item, &columns, &self.schema, table)?;
        self.insert_rows(table, &matching, std::slice::from_ref(item))
            .await
    }

    async fn load_items(&self, items: &[Record], table: &str) -> Result<()> {
        let Some(first) = items.first() else {
            return Ok(());
        };

        let columns = self.get_columns(table).await?;
        let matching = sql::insert_columns(first, &columns, &self.schema, table)?;

        for chunk in sql::insert_batches(items, matching.len()) {
            self.insert_rows(table, &matching, chunk).await?;
        }
        tracing::debug!("Inserted {} rows into {}.{}", items.len(), self.schema, table);
        Ok(())
    }

    async fn refresh_views(&self) -> Result<()> {
        for view in &self.views {
            self.refresh_view(view).await?;
        }
        Ok(())
    }
}
