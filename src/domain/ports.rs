use crate::domain::model::{AttendeesPage, EventsPage, Record};
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use std::time::Duration;

/// Read side: the Eventbrite REST API.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn get_token_info(&self) -> Result<Value>;

    async fn get_events(
        &self,
        org_id: &str,
        start: Option<NaiveDate>,
        last_modified: Option<NaiveDate>,
        page: u32,
    ) -> Result<EventsPage>;

    async fn get_event(&self, event_id: &str, page: u32) -> Result<Value>;

    async fn get_attendees(&self, event_id: &str, page: u32) -> Result<AttendeesPage>;

    async fn get_order(&self, order_id: &str, page: u32) -> Result<Value>;

    async fn get_venue(&self, venue_id: &str, page: u32) -> Result<Value>;
}

/// Write side: the Postgres schema the loader fills.
#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn last_event_load_date(&self) -> Result<Option<DateTime<Utc>>>;

    async fn get_item(
        &self,
        table: &str,
        item_id: &str,
        secondary: &[(&str, &str)],
    ) -> Result<Option<Record>>;

    async fn delete_item(&self, table: &str, item_id: &str, secondary: &[(&str, &str)])
        -> Result<u64>;

    async fn load_item(&self, item: &Record, table: &str) -> Result<()>;

    async fn load_items(&self, items: &[Record], table: &str) -> Result<()>;

    async fn refresh_views(&self) -> Result<()>;
}

pub trait ConfigProvider: Send + Sync {
    fn api_url(&self) -> &str;
    fn org_id(&self) -> &str;
    fn schema(&self) -> &str;
    fn materialized_views(&self) -> &[String];
    fn throttle(&self) -> Duration;
    fn rate_limit_backoff(&self) -> Duration;
    fn load_orders(&self) -> bool;
}
