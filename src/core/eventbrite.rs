use crate::domain::model::{AttendeesPage, EventsPage};
use crate::domain::ports::EventSource;
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

/// Eventbrite v3 REST client authenticated with an OAuth token.
pub struct EventbriteClient {
    client: Client,
    base_url: String,
    token: String,
}

fn range_start(date: NaiveDate) -> String {
    format!("{}T00:00:00", date.format("%Y-%m-%d"))
}

impl EventbriteClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        mut params: Vec<(&str, String)>,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("GET {} {:?}", url, params);

        params.push(("token", self.token.clone()));
        let response = self.client.get(&url).query(&params).send().await?;

        let status = response.status();
        tracing::debug!("API response status: {}", status);
        if !status.is_success() {
            tracing::warn!("Response had status code: {} ({})", status.as_u16(), url);
            return Err(EtlError::HttpStatus {
                status: status.as_u16(),
                url,
            });
        }

        Ok(response.json::<T>().await?)
    }

    fn page_param(page: u32) -> Vec<(&'static str, String)> {
        vec![("page", page.to_string())]
    }
}

#[async_trait]
impl EventSource for EventbriteClient {
    async fn get_token_info(&self) -> Result<Value> {
        self.get_json("/users/me/", Vec::new()).await
    }

    async fn get_events(
        &self,
        org_id: &str,
        start: Option<NaiveDate>,
        last_modified: Option<NaiveDate>,
        page: u32,
    ) -> Result<EventsPage> {
        let mut params = Self::page_param(page);
        if let Some(start) = start {
            params.push(("start_date.range_start", range_start(start)));
        }
        if let Some(modified) = last_modified {
            params.push(("date_modified.range_start", range_start(modified)));
        }
        self.get_json(&format!("/organizers/{}/events/", org_id), params)
            .await
    }

    async fn get_event(&self, event_id: &str, page: u32) -> Result<Value> {
        self.get_json(&format!("/events/{}", event_id), Self::page_param(page))
            .await
    }

    async fn get_attendees(&self, event_id: &str, page: u32) -> Result<AttendeesPage> {
        self.get_json(
            &format!("/events/{}/attendees", event_id),
            Self::page_param(page),
        )
        .await
    }

    async fn get_order(&self, order_id: &str, page: u32) -> Result<Value> {
        self.get_json(&format!("/orders/{}", order_id), Self::page_param(page))
            .await
    }

    async fn get_venue(&self, venue_id: &str, page: u32) -> Result<Value> {
        self.get_json(&format!("/venues/{}", venue_id), Self::page_param(page))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn test_range_start_format() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 7).unwrap();
        assert_eq!(range_start(date), "2024-01-07T00:00:00");
    }

    #[tokio::test]
    async fn test_get_events_sends_token_page_and_range() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(GET)
                .path("/organizers/42/events/")
                .query_param("token", "tok")
                .query_param("page", "3")
                .query_param("start_date.range_start", "2024-01-07T00:00:00")
                .query_param("date_modified.range_start", "2024-01-01T00:00:00");
            then.status(200).json_body(json!({
                "pagination": {"object_count": 1, "page_number": 3, "has_more_items": false},
                "events": [{"id": "e1"}]
            }));
        });

        let client = EventbriteClient::new(server.base_url(), "tok").unwrap();
        let page = client
            .get_events(
                "42",
                NaiveDate::from_ymd_opt(2024, 1, 7),
                NaiveDate::from_ymd_opt(2024, 1, 1),
                3,
            )
            .await
            .unwrap();

        api_mock.assert();
        assert_eq!(page.pagination.page_number, 3);
        assert_eq!(page.events, vec![json!({"id": "e1"})]);
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(GET).path("/venues/9");
            then.status(429);
        });

        let client = EventbriteClient::new(server.base_url(), "tok").unwrap();
        let err = client.get_venue("9", 1).await.unwrap_err();

        api_mock.assert();
        match err {
            EtlError::HttpStatus { status, url } => {
                assert_eq!(status, 429);
                assert!(url.ends_with("/venues/9"));
                assert!(!url.contains("tok"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_single_object_endpoints() {
        let server = MockServer::start();
        let event_mock = server.mock(|when, then| {
            when.method(GET).path("/events/e1").query_param("page", "1");
            then.status(200).json_body(json!({"id": "e1"}));
        });
        let order_mock = server.mock(|when, then| {
            when.method(GET).path("/orders/o1").query_param("token", "tok");
            then.status(200).json_body(json!({"id": "o1"}));
        });
        let attendees_mock = server.mock(|when, then| {
            when.method(GET).path("/events/e1/attendees").query_param("page", "2");
            then.status(200).json_body(json!({
                "pagination": {"page_number": 2, "has_more_items": false},
                "attendees": [{"id": "a1"}]
            }));
        });

        let client = EventbriteClient::new(server.base_url(), "tok").unwrap();

        assert_eq!(client.get_event("e1", 1).await.unwrap()["id"], "e1");
        assert_eq!(client.get_order("o1", 1).await.unwrap()["id"], "o1");
        let attendees = client.get_attendees("e1", 2).await.unwrap();
        assert_eq!(attendees.attendees.len(), 1);
        assert_eq!(attendees.pagination.next_page(2), None);

        event_mock.assert();
        order_mock.assert();
        attendees_mock.assert();
    }

    #[tokio::test]
    async fn test_token_info_hits_users_me() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(GET).path("/users/me/").query_param("token", "tok");
            then.status(200).json_body(json!({"id": "u1", "name": "Organizer"}));
        });

        let client = EventbriteClient::new(format!("{}/", server.base_url()), "tok").unwrap();
        let info = client.get_token_info().await.unwrap();

        api_mock.assert();
        assert_eq!(info["name"], "Organizer");
    }
}
