#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Function Authorization SDK
//!
//! This crate provides the public contracts of the `function_authz` module:
//!
//! - [`FunctionAuthorizationProvider`] - Resolves the authorization filter of a function
//! - [`AuthorizeRequirement`], [`AuthorizationFilter`], [`FunctionId`] - Metadata models
//! - [`AuthorizationPolicy`], [`PolicyProvider`] - Policies and their source
//! - [`AuthenticationSchemeProvider`], [`AuthenticationHandler`] - Scheme enumeration
//! - [`PolicyEvaluator`] - Authentication and authorization of one request
//! - [`AuthorizationTransport`] - Host side of challenge/forbid
//! - [`MetadataScanner`] - Discovery of per-function requirements
//! - [`FunctionAuthzError`], [`AuthorizationShortCircuit`] - Error types
//!
//! ## Usage
//!
//! ```ignore
//! use function_authz_sdk::{FunctionAuthorizationProvider, PolicyProvider};
//!
//! let filter = provider.resolve("GetOrders", policies.as_ref()).await?;
//! if let Some(policy) = filter.policy() {
//!     // authenticate and authorize against `policy`
//! }
//! ```

pub mod api;
pub mod error;
pub mod evaluator;
pub mod models;
pub mod policy;
pub mod scanner;
pub mod schemes;
pub mod transport;

pub use api::FunctionAuthorizationProvider;
pub use error::{AuthorizationShortCircuit, FunctionAuthzError};
pub use evaluator::PolicyEvaluator;
pub use models::{
    AuthenticateResult, AuthorizationFilter, AuthorizationFlow, AuthorizeOutcome,
    AuthorizeRequirement, DeclaringType, FunctionAuthorizationContext, FunctionId, HostModel,
    Principal,
};
pub use policy::{AuthorizationPolicy, AuthorizationPolicyBuilder, PolicyProvider, PolicyRequirement};
pub use scanner::{FunctionDescriptor, MetadataScanner, TypeDescriptor};
pub use schemes::{AuthenticationHandler, AuthenticationScheme, AuthenticationSchemeProvider};
pub use transport::AuthorizationTransport;
