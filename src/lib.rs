//! Claimstone - group health insurance claims administration backend.
//!
//! Exposes all modules so integration tests can drive the service in-process.

pub mod authz;
pub mod entities;
pub mod errors;
pub mod jwks;
pub mod settings;
pub mod storage;
pub mod web;
