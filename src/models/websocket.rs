use crate::conversation::ViewModel;
use crate::models::chat::MessageId;
use serde::{ Serialize, Deserialize };

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "submit")] Submit {
        question: String,
    },
    #[serde(rename = "select_message")] SelectMessage {
        id: MessageId,
    },
    #[serde(rename = "select_place")] SelectPlace {
        ordinal: u32,
    },
    #[serde(rename = "deselect_place")]
    DeselectPlace,
    #[serde(rename = "clear")]
    Clear,
}

#[derive(Serialize, Debug)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "hello")] Hello {
        session_id: String,
        suggestions: Vec<String>,
        focus_animation_ms: u64,
        popup_delay_ms: u64,
    },
    #[serde(rename = "state")] State(ViewModel),
    #[serde(rename = "error")] Error {
        message: String,
    },
}
