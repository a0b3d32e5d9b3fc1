//! Wire types: what clients send (`Request`) and what they receive (`Event`).

use serde::{Deserialize, Serialize};

use crate::error::HubError;

/// Sent once to every new connection, after the backlog replay.
pub const WELCOME_TEXT: &str = "Welcome to the websockets demo fireworks display. \
Every piece of software spontaneously generates its own chat functionality. Nobody knows why.";

/// Sent to a connection that has been quiet for a full idle period.
pub const NUDGE_TEXT: &str = "Choose a firework <3 <3";

/// One unit broadcast to clients. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    text: String,
    asset: Option<String>,
}

impl Event {
    pub fn new(text: impl Into<String>, asset: Option<String>) -> Self {
        Self {
            text: text.into(),
            asset,
        }
    }

    /// The greeting every new connection receives. Carries no asset.
    pub fn welcome() -> Self {
        Self::new(WELCOME_TEXT, None)
    }

    /// Prompt for an idle connection, shown with the default asset.
    pub fn nudge(default_asset: String) -> Self {
        Self::new(NUDGE_TEXT, Some(default_asset))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn asset(&self) -> Option<&str> {
        self.asset.as_deref()
    }
}

/// A client-submitted intent that may produce one `Event`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    #[serde(alias = "Color", alias = "color")]
    pub attribute: String,
    #[serde(alias = "Person", alias = "person")]
    pub sender: String,
}

impl Request {
    pub fn new(attribute: impl Into<String>, sender: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            sender: sender.into(),
        }
    }

    /// Parse one inbound text frame.
    pub fn parse(raw: &str) -> Result<Self, HubError> {
        serde_json::from_str(raw).map_err(|e| HubError::Parse(e.to_string()))
    }

    /// Display text for the event this request produces: `"<sender>: <attribute>"`.
    pub fn display_text(&self) -> String {
        format!("{}: {}", self.sender, self.attribute)
    }
}
