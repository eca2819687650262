//! Convenient re-exports for common docgate types.
pub use crate::{
    client::{ClientConfig, RegistryClient, RegistryClientBuilder, Submission},
    document::{Document, DocumentDescription, DocumentType, Product},
    error::{ClientError, ConfigError, GateError, SubmitError, TransportError},
    gate::{AdmissionGate, GateLayer, GatedError, Permit, RateWindow, TimeUnit},
    transport::{PreparedRequest, ReqwestTransport, Transport, TransportResponse},
};
