use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;

/// When order notifications run relative to the HTTP response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Respond first, deliver and persist outcomes in a spawned task.
    Background,
    /// Deliver before responding and include outcomes in the response.
    Inline,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, JsonSchema)]
pub struct ChannelOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl ChannelOutcome {
    pub fn delivered() -> Self {
        Self { success: true, error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Per-channel result of an order notification run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, JsonSchema)]
pub struct NotificationStatus {
    pub email: ChannelOutcome,
    pub sms: ChannelOutcome,
}
