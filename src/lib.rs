#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # docgate
//!
//! Rate-limited document submission for a remote registry API that allows at
//! most N submissions within any rolling window.
//!
//! ## Features
//!
//! - **Admission gate**: sliding-window limiter over a ring of the last N grant timestamps
//! - **Cancellation** by signal, deadline, or gate shutdown without disturbing other callers
//! - **Tower middleware** that admits each request before calling the inner service
//! - **Registry client** that serializes, waits for admission, then dispatches off the gate
//!
//! ## Quick Start
//!
//! ```rust
//! use docgate::{AdmissionGate, RateWindow};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let window = RateWindow::new(5, Duration::from_millis(100)).unwrap();
//!     let gate = AdmissionGate::new(window).unwrap();
//!
//!     for _ in 0..6 {
//!         let permit = gate.acquire().await.expect("gate is open");
//!         // hand the prepared request to a transport here
//!         let _ = permit.granted_at();
//!     }
//! }
//! ```

pub mod client;
pub mod clock;
pub mod document;
pub mod error;
pub mod gate;
pub mod prelude;
pub mod sleeper;
pub mod transport;

// Re-exports
pub use client::{ClientConfig, RegistryClient, RegistryClientBuilder, Submission};
pub use clock::{Clock, ManualClock, TokioClock};
pub use document::{Document, DocumentDescription, DocumentType, Product};
pub use error::{ClientError, ConfigError, GateError, SubmitError, TransportError};
pub use gate::{AdmissionGate, GateLayer, GateService, GatedError, Permit, RateWindow, TimeUnit};
pub use sleeper::{Sleeper, TokioSleeper, TrackingSleeper};
pub use transport::{PreparedRequest, ReqwestTransport, Transport, TransportResponse};
