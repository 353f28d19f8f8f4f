//! Contract notifications
//!
//! The events the daemon reacts to. Everything else on the channel is logged
//! and ignored.

use serde::Deserialize;

use crate::channel::Frame;

pub const ACQUISITION_CONTRACT: &str = "acquisition_contract";
pub const RESALE_CONTRACT: &str = "resale_contract";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractKind {
    Acquisition,
    Resale,
}

impl ContractKind {
    pub fn from_event(event: &str) -> Option<Self> {
        match event {
            ACQUISITION_CONTRACT => Some(ContractKind::Acquisition),
            RESALE_CONTRACT => Some(ContractKind::Resale),
            _ => None,
        }
    }
}

/// Payload of both contract events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AddressPayload {
    #[serde(rename = "Address", alias = "address", default)]
    pub address: String,
}

/// A decoded contract event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractEvent {
    pub kind: ContractKind,
    pub address: String,
}

impl ContractEvent {
    /// `None` for events that are not contract events. A contract event whose
    /// payload does not decode yields the decode error.
    pub fn from_frame(frame: &Frame) -> Option<Result<Self, serde_json::Error>> {
        let kind = ContractKind::from_event(&frame.event)?;
        Some(
            frame
                .decode_payload::<AddressPayload>()
                .map(|payload| ContractEvent {
                    kind,
                    address: payload.address,
                }),
        )
    }
}
