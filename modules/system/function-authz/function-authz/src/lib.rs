#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Function authorization engine.
//!
//! Resolves the authorization filter of each function from the requirements
//! declared on it and on its declaring type, caches it for the process
//! lifetime, and enforces it per invocation:
//!
//! - [`domain::MetadataStore`] - per-function and per-type requirements
//! - [`domain::FunctionsAuthorizationProvider`] - single-flight filter resolution
//! - [`domain::FunctionsAuthorizationResultHandler`] - challenge/forbid
//! - [`domain::FunctionAuthorizationExecutor`] - per-invocation state machine
//! - [`sync::KeyedLock`] - per-key async lock with self-termination
//! - [`axum_ext`] - tower layer for axum hosts
//! - [`FunctionAuthorizationRuntime`] - composition root

pub mod axum_ext;
pub mod config;
pub mod domain;
pub mod runtime;
pub mod sync;

pub use config::{EmptySchemeStrategy, FunctionAuthzConfig};
pub use runtime::{FunctionAuthorizationRuntime, FunctionAuthorizationRuntimeBuilder};
