//! qrlink Pairing - QR pairing sessions and device links
//!
//! Implements the QR login handshake: a viewer requests a pairing session
//! and displays its QR code; an authenticated scanner redeems the session,
//! which links a device to the scanner's account and pushes the login
//! result to the waiting viewer.
//!
//! # Pairing Flow
//!
//! 1. Viewer calls `PairingOrchestrator::start_pairing()` and renders the QR
//! 2. Viewer attaches to the session's notification channel
//! 3. Scanner (already logged in) calls `complete_pairing()` with the
//!    session id read from the QR code
//! 4. Exactly one redemption wins; it creates a `DeviceLink` and delivers a
//!    `login_success` message with the device credentials to the viewer

pub mod device;
pub mod notify;
pub mod orchestrator;
pub mod session;
pub mod storage;

pub use device::{
    hash_token, DeviceError, DeviceId, DeviceLink, DeviceLinkInfo, DeviceRegistry, DeviceResult,
};
pub use notify::{ChannelManager, CHANNEL_CAPACITY};
pub use orchestrator::{PairingCompleteResponse, PairingOrchestrator, PairingStartResponse};
pub use session::{PairingError, PairingResult, PairingSession, SessionRegistry};
pub use storage::{DeviceLinkStorage, StorageError, StorageResult};
