//! Webhook requests and verified events
//!
//! A [`WebhookRequest`] is what arrived on the wire. A [`VerifiedEvent`] is
//! built from it only after the signature check has passed.

use crate::{Result, WebhookError};
use axum::body::Bytes;
use axum::http::{HeaderMap, Method};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const EVENT_HEADER: &str = "x-github-event";
pub const DELIVERY_HEADER: &str = "x-github-delivery";

/// Raw inbound delivery
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl WebhookRequest {
    pub fn new(
        method: Method,
        path: impl Into<String>,
        headers: HeaderMap,
        body: impl Into<Bytes>,
    ) -> Self {
        Self {
            method,
            path: path.into(),
            headers,
            body: body.into(),
        }
    }

    /// Header value as text, `None` if absent or not visible ASCII
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn event_type(&self) -> Option<&str> {
        self.header(EVENT_HEADER).filter(|v| !v.is_empty())
    }

    pub fn delivery_id(&self) -> Option<&str> {
        self.header(DELIVERY_HEADER).filter(|v| !v.is_empty())
    }
}

/// A delivery whose signature has been checked
#[derive(Debug, Clone, Serialize)]
pub struct VerifiedEvent {
    pub event_type: String,
    pub action: Option<String>,
    pub installation_id: Option<u64>,
    /// Delivery id, for handlers that deduplicate redeliveries
    pub delivery_id: Option<String>,
    pub payload: Value,
    pub received_at: DateTime<Utc>,
}

impl VerifiedEvent {
    /// Build an event from a payload that has already been decoded
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        let action = payload
            .get("action")
            .and_then(Value::as_str)
            .map(str::to_string);
        let installation_id = payload.pointer("/installation/id").and_then(Value::as_u64);

        Self {
            event_type: event_type.into(),
            action,
            installation_id,
            delivery_id: None,
            payload,
            received_at: Utc::now(),
        }
    }

    pub fn with_delivery_id(mut self, delivery_id: impl Into<String>) -> Self {
        self.delivery_id = Some(delivery_id.into());
        self
    }

    /// Decode a verified body.
    ///
    /// The body must be a JSON object carrying the fields required for its
    /// event type. Callers must have checked the signature first.
    pub fn from_verified_body(
        event_type: &str,
        delivery_id: Option<&str>,
        body: &[u8],
    ) -> Result<Self> {
        let payload: Value = serde_json::from_slice(body)
            .map_err(|e| WebhookError::Parse(format!("body is not valid JSON: {e}")))?;

        if !payload.is_object() {
            return Err(WebhookError::Parse(
                "payload must be a JSON object".to_string(),
            ));
        }

        let missing: Vec<&str> = required_fields(event_type)
            .iter()
            .copied()
            .filter(|pointer| payload.pointer(pointer).map_or(true, Value::is_null))
            .collect();
        if !missing.is_empty() {
            return Err(WebhookError::Parse(format!(
                "{} payload is missing {}",
                event_type,
                missing.join(", ")
            )));
        }

        let mut event = Self::new(event_type, payload);
        event.delivery_id = delivery_id.map(str::to_string);
        Ok(event)
    }

    /// `event.action` when an action is present, otherwise the event type
    pub fn key(&self) -> String {
        match &self.action {
            Some(action) => format!("{}.{}", self.event_type, action),
            None => self.event_type.clone(),
        }
    }

    pub fn repository_owner(&self) -> Option<&str> {
        self.payload
            .pointer("/repository/owner/login")
            .and_then(Value::as_str)
    }

    pub fn repository_name(&self) -> Option<&str> {
        self.payload
            .pointer("/repository/name")
            .and_then(Value::as_str)
    }

    pub fn issue_number(&self) -> Option<u64> {
        self.payload
            .pointer("/issue/number")
            .and_then(Value::as_u64)
    }

    pub fn issue_title(&self) -> Option<&str> {
        self.payload.pointer("/issue/title").and_then(Value::as_str)
    }

    pub fn sender_login(&self) -> Option<&str> {
        self.payload
            .pointer("/sender/login")
            .and_then(Value::as_str)
    }

    /// Deserialize the payload into a typed structure
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(&self.payload).map_err(|e| {
            WebhookError::Parse(format!("{} payload: {}", self.event_type, e))
        })
    }
}

/// JSON pointers that must be present for an event type to be dispatched
fn required_fields(event_type: &str) -> &'static [&'static str] {
    match event_type {
        "issues" => &[
            "/action",
            "/issue/number",
            "/issue/title",
            "/repository/name",
            "/repository/owner/login",
        ],
        "issue_comment" => &[
            "/action",
            "/issue/number",
            "/comment/id",
            "/repository/name",
            "/repository/owner/login",
        ],
        "pull_request" => &[
            "/action",
            "/number",
            "/pull_request",
            "/repository/name",
            "/repository/owner/login",
        ],
        "installation" | "installation_repositories" => &["/action", "/installation/id"],
        _ => &[],
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstallationRef {
    pub id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountRef {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryRef {
    pub name: String,
    pub owner: AccountRef,
    #[serde(default)]
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueRef {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
}

/// Payload of an `issues` event
#[derive(Debug, Clone, Deserialize)]
pub struct IssuesPayload {
    pub action: String,
    #[serde(default)]
    pub installation: Option<InstallationRef>,
    pub repository: RepositoryRef,
    pub issue: IssueRef,
    #[serde(default)]
    pub sender: Option<AccountRef>,
}
