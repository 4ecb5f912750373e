//! # IHE Core
//!
//! Outbound IHE cross-community transactions for an initiating gateway:
//! - ITI-55 cross-gateway patient discovery (XCPD)
//! - ITI-38 cross-gateway document query (XCA)
//! - ITI-39 cross-gateway document retrieval (XCA)
//!
//! Requests are turned into signed SOAP 1.2 envelopes ([`envelope`]), posted to every target
//! gateway concurrently ([`transport`]), and each reply is classified into a typed response
//! ([`process`]). [`GatewayClient`] runs the whole pipeline.
//!
//! **No server concerns**: this crate only initiates transactions. Serving responding-gateway
//! endpoints, persisting documents, and patient matching belong elsewhere.

pub mod client;
pub mod config;
pub mod constants;
pub mod envelope;
mod error;
pub mod models;
pub mod process;
pub mod transport;

pub use client::GatewayClient;
pub use config::{trust_all_from_env_value, timeout_from_env_value, GatewayConfig, TransportConfig};
pub use envelope::{
    create_and_sign_bulk_dq_requests, create_and_sign_bulk_dr_requests,
    create_and_sign_bulk_xcpd_requests, SignedEnvelope,
};
pub use error::{GatewayError, GatewayResult};
pub use models::*;
pub use process::{process_dq_response, process_dr_response, process_xcpd_response};
pub use transport::{dispatch_all, HttpsTransport, SoapResponse, SoapTransport, TransportOutcome};
