//! HTTP-backed implementations of the external collaborator ports. These
//! are thin clients over the CRM's record-store service, the provider
//! gateway, and the real-time connection gateway; the core never sees
//! anything but the port traits.

use crate::ports::{
    ProviderClient, ProviderPage, RealtimePublisher, RecordIdentifierQuery, RecordStore,
    SendMessageRequest, SendReceipt,
};
use anyhow::{Context, Result};
use models_comms::channel::ChannelType;
use models_comms::links::RecordRef;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;

#[derive(Clone)]
pub struct HttpRecordStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRecordStore {
    pub fn new(client: reqwest::Client, base_url: String) -> HttpRecordStore {
        HttpRecordStore { client, base_url }
    }
}

#[derive(Debug, Deserialize)]
struct RecordsResponse {
    records: Vec<RecordRef>,
}

impl RecordStore for HttpRecordStore {
    async fn find_records_by_identifiers(
        &self,
        query: &RecordIdentifierQuery,
    ) -> Result<Vec<RecordRef>> {
        let response = self
            .client
            .post(format!("{}/records/search", self.base_url))
            .json(&json!({
                "email": query.emails,
                "phone": query.phones,
            }))
            .send()
            .await
            .context("Record store search request failed")?
            .error_for_status()
            .context("Record store search returned an error status")?
            .json::<RecordsResponse>()
            .await
            .context("Record store search returned malformed JSON")?;

        Ok(response.records)
    }

    async fn find_company_records_by_domain(&self, domain: &str) -> Result<Vec<RecordRef>> {
        let response = self
            .client
            .get(format!("{}/records/companies", self.base_url))
            .query(&[("domain", domain)])
            .send()
            .await
            .context("Company domain lookup request failed")?
            .error_for_status()
            .context("Company domain lookup returned an error status")?
            .json::<RecordsResponse>()
            .await
            .context("Company domain lookup returned malformed JSON")?;

        Ok(response.records)
    }
}

#[derive(Clone)]
pub struct HttpProviderClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpProviderClient {
    pub fn new(client: reqwest::Client, base_url: String, api_key: String) -> HttpProviderClient {
        HttpProviderClient {
            client,
            base_url,
            api_key,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    messages: Vec<JsonValue>,
    next_cursor: Option<String>,
}

impl ProviderClient for HttpProviderClient {
    async fn fetch_messages(
        &self,
        account_id: &str,
        thread_id: Option<&str>,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<ProviderPage> {
        let mut request = self
            .client
            .get(format!("{}/accounts/{account_id}/messages", self.base_url))
            .bearer_auth(&self.api_key)
            .query(&[("limit", limit.to_string())]);
        if let Some(thread_id) = thread_id {
            request = request.query(&[("thread_id", thread_id)]);
        }
        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor)]);
        }

        let response = request
            .send()
            .await
            .context("Provider message fetch failed")?
            .error_for_status()
            .context("Provider message fetch returned an error status")?
            .json::<MessagesResponse>()
            .await
            .context("Provider message fetch returned malformed JSON")?;

        Ok(ProviderPage {
            messages: response.messages,
            next_cursor: response.next_cursor,
        })
    }

    async fn send_message(&self, send: &SendMessageRequest) -> Result<SendReceipt> {
        #[derive(Debug, Deserialize)]
        struct SendResponse {
            id: String,
            provider_id: String,
            tracking_id: String,
        }

        let response = self
            .client
            .post(format!(
                "{}/accounts/{}/messages",
                self.base_url, send.account_id
            ))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "to": send.to,
                "subject": send.subject,
                "body": send.body,
                "thread_id": send.thread_id,
            }))
            .send()
            .await
            .context("Provider send request failed")?
            .error_for_status()
            .context("Provider send returned an error status")?
            .json::<SendResponse>()
            .await
            .context("Provider send returned malformed JSON")?;

        Ok(SendReceipt {
            id: response.id,
            provider_id: response.provider_id,
            tracking_id: response.tracking_id,
        })
    }

    async fn fetch_attendee_names(
        &self,
        account_id: &str,
        channel_type: ChannelType,
    ) -> Result<HashMap<String, String>> {
        let response = self
            .client
            .get(format!("{}/accounts/{account_id}/attendees", self.base_url))
            .bearer_auth(&self.api_key)
            .query(&[("channel_type", channel_type.to_string())])
            .send()
            .await
            .context("Attendee directory fetch failed")?
            .error_for_status()
            .context("Attendee directory fetch returned an error status")?
            .json::<HashMap<String, String>>()
            .await
            .context("Attendee directory fetch returned malformed JSON")?;

        Ok(response)
    }
}

#[derive(Clone)]
pub struct HttpRealtimePublisher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRealtimePublisher {
    pub fn new(client: reqwest::Client, base_url: String) -> HttpRealtimePublisher {
        HttpRealtimePublisher { client, base_url }
    }
}

impl RealtimePublisher for HttpRealtimePublisher {
    async fn publish(&self, topic: &str, payload: &JsonValue) -> Result<()> {
        self.client
            .post(format!("{}/publish", self.base_url))
            .json(&json!({ "topic": topic, "payload": payload }))
            .send()
            .await
            .context("Publish request failed")?
            .error_for_status()
            .context("Publish returned an error status")?;
        Ok(())
    }
}
