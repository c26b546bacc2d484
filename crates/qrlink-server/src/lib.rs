//! qrlink Server - Axum-based HTTP and WebSocket server
//!
//! This crate provides the web server for the QR pairing API and the
//! pairing notification stream.

pub mod http;
pub mod state;
pub mod tls;
pub mod websocket;

pub use http::create_router;
pub use state::AppState;
pub use tls::{
    calculate_cert_fingerprint, create_rustls_config, generate_self_signed_cert,
    CertificateManager, TlsError, TlsResult,
};
pub use websocket::handle_pair_socket;
