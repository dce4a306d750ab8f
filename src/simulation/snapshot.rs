//! Outbound envelope sent to the viewer

use serde::{Deserialize, Serialize};

use crate::entity::bubble::BubbleSnapshot;

/// Session-level info attached to every envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Decimal string, so 64-bit seeds survive JavaScript number parsing
    pub seed: String,
    pub grid_size: u32,
    pub total_bubbles: usize,
}

/// One message to the viewer. `bubble` is `None` only for the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub bubble: Option<BubbleSnapshot>,
    pub info: SessionInfo,
}

impl Envelope {
    pub fn handshake(info: SessionInfo) -> Self {
        Self { bubble: None, info }
    }

    pub fn bubble(snapshot: BubbleSnapshot, info: SessionInfo) -> Self {
        Self {
            bubble: Some(snapshot),
            info,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
