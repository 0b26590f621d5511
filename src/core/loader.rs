use crate::core::transform;
use crate::domain::model::{
    value_as_key, LoadSummary, ATTENDEES_TABLE, EVENTS_TABLE, ORDERS_TABLE, VENUES_TABLE,
};
use crate::domain::ports::{ConfigProvider, EventSource, Warehouse};
use crate::utils::error::Result;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use serde_json::Value;
use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Pause after each event so a full run stays under the API rate limit.
    pub throttle: Duration,
    /// Pause before retrying a failed API call.
    pub rate_limit_backoff: Duration,
    pub load_orders: bool,
}

impl LoaderOptions {
    pub fn from_config<C: ConfigProvider>(config: &C) -> Self {
        Self {
            throttle: config.throttle(),
            rate_limit_backoff: config.rate_limit_backoff(),
            load_orders: config.load_orders(),
        }
    }
}

/// First event date to request: one day before the last load (or the last
/// load itself, if earlier). `None` loads from the first available event.
pub fn start_date(last_load: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<NaiveDate> {
    last_load.map(|last| {
        let one_day_ago = now - ChronoDuration::days(1);
        one_day_ago.min(last).date_naive()
    })
}

/// Pulls an organization's events from Eventbrite and loads them into the
/// warehouse.
pub struct EventbriteLoader<S: EventSource, W: Warehouse> {
    source: S,
    warehouse: W,
    org_id: String,
    options: LoaderOptions,
}

impl<S: EventSource, W: Warehouse> EventbriteLoader<S, W> {
    pub fn new(source: S, warehouse: W, org_id: impl Into<String>, options: LoaderOptions) -> Self {
        Self {
            source,
            warehouse,
            org_id: org_id.into(),
            options,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn warehouse(&self) -> &W {
        &self.warehouse
    }

    /// Runs `call`, and on a retryable failure waits out the rate limit
    /// window and runs it exactly once more.
    async fn with_backoff<T, F, Fut>(&self, what: &str, call: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match call().await {
            Err(e) if e.is_retryable() => {
                tracing::warn!(
                    "{} failed ({}); rate limit likely exceeded, sleeping {:?}",
                    what,
                    e,
                    self.options.rate_limit_backoff
                );
                tokio::time::sleep(self.options.rate_limit_backoff).await;
                call().await
            }
            other => other,
        }
    }

    pub async fn run(&self, start_override: Option<NaiveDate>) -> Result<LoadSummary> {
        let start = match start_override {
            Some(date) => Some(date),
            None => {
                let last_load = self.warehouse.last_event_load_date().await?;
                start_date(last_load, Utc::now())
            }
        };

        let mut summary = LoadSummary {
            start_date: start,
            ..Default::default()
        };

        match start {
            Some(date) => tracing::info!("Loading events starting at {}", date),
            None => tracing::info!("Loading events from the first available event"),
        }

        let mut page = 1;
        let mut events = self
            .with_backoff("events page 1", || {
                self.source.get_events(&self.org_id, start, None, page)
            })
            .await?;

        let total = events.pagination.object_count;
        if total == 0 {
            tracing::info!("There are no new events. Exiting");
            return Ok(summary);
        }
        tracing::info!("There are {} events to process", total);

        loop {
            for event in &events.events {
                if event.is_null() {
                    continue;
                }
                self.load_event(event, &mut summary).await?;

                if !self.options.throttle.is_zero() {
                    tokio::time::sleep(self.options.throttle).await;
                }
            }

            match events.pagination.next_page(page) {
                Some(next) => {
                    page = next;
                    tracing::info!("Pulling events on page {}", page);
                    events = self
                        .with_backoff(&format!("events page {}", page), || {
                            self.source.get_events(&self.org_id, start, None, page)
                        })
                        .await?;
                }
                None => break,
            }
        }

        self.warehouse.refresh_views().await?;
        summary.views_refreshed = true;

        tracing::info!(
            "Loaded {} events, {} venues, {} attendees, {} orders",
            summary.events,
            summary.venues,
            summary.attendees,
            summary.orders
        );
        Ok(summary)
    }

    async fn load_event(&self, event: &Value, summary: &mut LoadSummary) -> Result<()> {
        let Some(event_id) = event.get("id").and_then(value_as_key) else {
            tracing::warn!("Skipping event without an id");
            return Ok(());
        };
        let name = event
            .pointer("/name/text")
            .and_then(Value::as_str)
            .unwrap_or("<unnamed>");
        tracing::info!("Loading information for {}", name);

        // Delete first so the unique index on id holds after a reload.
        self.warehouse
            .delete_item(EVENTS_TABLE, &event_id, &[])
            .await?;
        self.warehouse
            .load_item(&transform::event_record(event, Utc::now()), EVENTS_TABLE)
            .await?;
        summary.events += 1;

        if let Some(venue_id) = event.get("venue_id").and_then(value_as_key) {
            if self.load_venue_if_missing(&venue_id).await? {
                summary.venues += 1;
            }
        }

        let order_ids = self.load_attendees(&event_id, summary).await?;

        if self.options.load_orders {
            for order_id in &order_ids {
                self.load_order(order_id).await?;
                summary.orders += 1;
            }
        }
        Ok(())
    }

    async fn load_venue_if_missing(&self, venue_id: &str) -> Result<bool> {
        if self
            .warehouse
            .get_item(VENUES_TABLE, venue_id, &[])
            .await?
            .is_some()
        {
            return Ok(false);
        }

        let venue = self
            .with_backoff(&format!("venue {}", venue_id), || {
                self.source.get_venue(venue_id, 1)
            })
            .await?;
        self.warehouse
            .load_item(&transform::venue_record(&venue), VENUES_TABLE)
            .await?;
        Ok(true)
    }

    /// Loads every attendee of `event_id` and returns their distinct order ids.
    async fn load_attendees(
        &self,
        event_id: &str,
        summary: &mut LoadSummary,
    ) -> Result<BTreeSet<String>> {
        let mut order_ids = BTreeSet::new();
        let mut page = 1;

        loop {
            let attendees = self
                .with_backoff(&format!("attendees of {} page {}", event_id, page), || {
                    self.source.get_attendees(event_id, page)
                })
                .await?;

            for attendee in &attendees.attendees {
                let Some(attendee_id) = attendee.get("id").and_then(value_as_key) else {
                    continue;
                };
                self.warehouse
                    .delete_item(ATTENDEES_TABLE, &attendee_id, &[("event_id", event_id)])
                    .await?;
                self.warehouse
                    .load_item(
                        &transform::attendee_record(attendee, Utc::now()),
                        ATTENDEES_TABLE,
                    )
                    .await?;
                summary.attendees += 1;

                if let Some(order_id) = attendee.get("order_id").and_then(value_as_key) {
                    order_ids.insert(order_id);
                }
            }

            match attendees.pagination.next_page(page) {
                Some(next) => page = next,
                None => break,
            }
        }

        Ok(order_ids)
    }

    async fn load_order(&self, order_id: &str) -> Result<()> {
        let order = self
            .with_backoff(&format!("order {}", order_id), || {
                self.source.get_order(order_id, 1)
            })
            .await?;
        self.warehouse.delete_item(ORDERS_TABLE, order_id, &[]).await?;
        self.warehouse
            .load_item(&transform::order_record(&order, Utc::now()), ORDERS_TABLE)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_start_date_uses_one_day_before_now_when_last_load_is_recent() {
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 9, 0, 0).unwrap();
        let last = Utc.with_ymd_and_hms(2024, 6, 10, 3, 0, 0).unwrap();

        assert_eq!(start_date(Some(last), now), NaiveDate::from_ymd_opt(2024, 6, 9));
    }

    #[test]
    fn test_start_date_uses_last_load_when_older() {
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 9, 0, 0).unwrap();
        let last = Utc.with_ymd_and_hms(2024, 5, 2, 23, 59, 0).unwrap();

        assert_eq!(start_date(Some(last), now), NaiveDate::from_ymd_opt(2024, 5, 2));
    }

    #[test]
    fn test_start_date_without_previous_load() {
        assert_eq!(start_date(None, Utc::now()), None);
    }
}
