use chrono::{ DateTime, Utc };
use serde::{ Serialize, Deserialize };
use uuid::Uuid;

pub type MessageId = Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Pending,
    Streaming,
    Complete,
    Failed,
}

impl MessageStatus {
    pub fn is_in_flight(self) -> bool {
        matches!(self, MessageStatus::Pending | MessageStatus::Streaming)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    /// Returns `None` unless both values are finite and inside the WGS84 range.
    pub fn new(lat: f64, lng: f64) -> Option<Self> {
        let valid =
            lat.is_finite() &&
            lng.is_finite() &&
            (-90.0..=90.0).contains(&lat) &&
            (-180.0..=180.0).contains(&lng);
        valid.then_some(Self { lat, lng })
    }
}

/// A point of interest pulled out of an assistant answer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Place {
    /// 1-based rank inside the owning message; drives the card indicator.
    pub ordinal: u32,
    pub name: String,
    pub address: String,
    pub category: String,
    pub visit_count: u64,
    pub coordinates: Option<Coordinates>,
}

impl Place {
    pub fn is_mappable(&self) -> bool {
        self.coordinates.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub text: String,
    pub status: MessageStatus,
    pub places: Vec<Place>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn user(text: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::User,
            text: text.trim().to_string(),
            status: MessageStatus::Complete,
            places: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn assistant_placeholder() -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::Assistant,
            text: String::new(),
            status: MessageStatus::Pending,
            places: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn has_places(&self) -> bool {
        self.role == Role::Assistant && !self.places.is_empty()
    }
}

/// Body posted to the chat webhook.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub session_id: String,
    pub chat_input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}
