//! Models shared by the resolution engine and its host adapters.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64_with_seed;

use crate::policy::AuthorizationPolicy;

const TYPE_HASH_SEED: u64 = 0x7479_7065;
const NAME_HASH_SEED: u64 = 0x6e61_6d65;

/// Reference to the type that declares one or more functions.
///
/// Whatever the scanner reports as the fully qualified type name.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeclaringType(Arc<str>);

impl DeclaringType {
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DeclaringType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DeclaringType").field(&&*self.0).finish()
    }
}

impl fmt::Display for DeclaringType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeclaringType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for DeclaringType {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// Identity of a function (or of a type-level entry) in the metadata store
/// and the filter cache.
///
/// Combines the hash of the declaring type with the hash of the lowercased
/// function name. The two parts are hashed with different seeds, so a
/// function named like its declaring type never collides with the type entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(u64);

impl FunctionId {
    /// Identity of an entry with neither a name nor a type.
    pub const NONE: Self = Self(0);

    #[must_use]
    pub fn new(function_name: Option<&str>, declaring_type: Option<&DeclaringType>) -> Self {
        let type_part = declaring_type.map_or(0, |t| {
            xxh3_64_with_seed(t.name().as_bytes(), TYPE_HASH_SEED)
        });
        let name_part = function_name.map_or(0, |name| {
            xxh3_64_with_seed(name.to_lowercase().as_bytes(), NAME_HASH_SEED)
        });
        Self(type_part ^ name_part)
    }

    /// Identity of the type-level entry of `declaring_type`.
    #[must_use]
    pub fn for_type(declaring_type: &DeclaringType) -> Self {
        Self::new(None, Some(declaring_type))
    }

    #[must_use]
    pub fn for_function(function_name: &str, declaring_type: &DeclaringType) -> Self {
        Self::new(Some(function_name), Some(declaring_type))
    }

    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// One authorization declaration on a function or on its declaring type.
///
/// `roles` and `schemes` are comma-separated lists. `schemes` may be present
/// but empty, which counts as "no explicit schemes".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthorizeRequirement {
    pub policy: Option<String>,
    pub roles: Option<String>,
    pub schemes: Option<String>,
}

impl AuthorizeRequirement {
    /// Requirement with no policy, roles or schemes (default policy applies).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_policy(mut self, policy: impl Into<String>) -> Self {
        self.policy = Some(policy.into());
        self
    }

    #[must_use]
    pub fn with_roles(mut self, roles: impl Into<String>) -> Self {
        self.roles = Some(roles.into());
        self
    }

    #[must_use]
    pub fn with_schemes(mut self, schemes: impl Into<String>) -> Self {
        self.schemes = Some(schemes.into());
        self
    }

    /// Named policy, if one is set and not blank.
    #[must_use]
    pub fn policy_name(&self) -> Option<&str> {
        self.policy
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    #[must_use]
    pub fn role_list(&self) -> Vec<&str> {
        split_list(self.roles.as_deref())
    }

    #[must_use]
    pub fn scheme_list(&self) -> Vec<&str> {
        split_list(self.schemes.as_deref())
    }

    /// Whether this requirement names at least one authentication scheme.
    #[must_use]
    pub fn has_schemes(&self) -> bool {
        !self.scheme_list().is_empty()
    }
}

fn split_list(value: Option<&str>) -> Vec<&str> {
    value.map_or_else(Vec::new, |v| {
        v.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .collect()
    })
}

/// Resolved, immutable authorization decision inputs for one function.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationFilter {
    policy: Option<Arc<AuthorizationPolicy>>,
    allow_anonymous: bool,
}

impl AuthorizationFilter {
    #[must_use]
    pub fn new(policy: Option<AuthorizationPolicy>, allow_anonymous: bool) -> Self {
        Self {
            policy: policy.map(Arc::new),
            allow_anonymous,
        }
    }

    /// Filter for a function with no authorization metadata.
    #[must_use]
    pub fn unrestricted() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn policy(&self) -> Option<&Arc<AuthorizationPolicy>> {
        self.policy.as_ref()
    }

    #[must_use]
    pub const fn allow_anonymous(&self) -> bool {
        self.allow_anonymous
    }
}

/// Authenticated caller, as produced by an [`AuthenticationHandler`](crate::AuthenticationHandler).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Principal {
    subject: String,
    roles: BTreeSet<String>,
    schemes: Vec<String>,
}

impl Principal {
    #[must_use]
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    #[must_use]
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    /// Records the scheme that authenticated this principal.
    #[must_use]
    pub fn authenticated_by(mut self, scheme: impl Into<String>) -> Self {
        let scheme = scheme.into();
        if !self.schemes.contains(&scheme) {
            self.schemes.push(scheme);
        }
        self
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    #[must_use]
    pub fn schemes(&self) -> &[String] {
        &self.schemes
    }

    #[must_use]
    pub fn is_in_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Folds the identity established by another scheme into this one.
    /// The first subject wins; roles and schemes accumulate.
    pub fn merge(&mut self, other: Self) {
        if self.subject.is_empty() {
            self.subject = other.subject;
        }
        self.roles.extend(other.roles);
        for scheme in other.schemes {
            if !self.schemes.contains(&scheme) {
                self.schemes.push(scheme);
            }
        }
    }
}

/// Outcome of authenticating a request against a policy's schemes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticateResult {
    Success(Principal),
    /// No scheme produced an identity (e.g. credentials absent).
    NoResult,
    /// Credentials were present but rejected.
    Failure(String),
}

impl AuthenticateResult {
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    #[must_use]
    pub const fn principal(&self) -> Option<&Principal> {
        match self {
            Self::Success(principal) => Some(principal),
            Self::NoResult | Self::Failure(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizeOutcome {
    Succeeded,
    /// Caller is not authenticated.
    Challenged,
    /// Caller is authenticated but does not satisfy the policy.
    Forbidden,
}

/// Whether the function pipeline proceeds after authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationFlow {
    Continue,
    /// The response is complete; the function must not run.
    Terminate(StatusCode),
}

impl AuthorizationFlow {
    #[must_use]
    pub const fn is_continue(self) -> bool {
        matches!(self, Self::Continue)
    }
}

/// Capability of the hosting pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostModel {
    /// The host can stop the pipeline by not calling the next stage.
    #[default]
    Middleware,
    /// The host always runs the function unless an error is raised;
    /// failures surface as [`AuthorizationShortCircuit`](crate::AuthorizationShortCircuit).
    InvocationFilter,
}

/// Everything the result handler needs to act on an authorization outcome.
///
/// `C` is the host's own invocation context, handed back to the success
/// continuation untouched.
#[derive(Debug, Clone)]
pub struct FunctionAuthorizationContext<C> {
    function_name: String,
    underlying: C,
    policy: Arc<AuthorizationPolicy>,
    outcome: AuthorizeOutcome,
}

impl<C> FunctionAuthorizationContext<C> {
    #[must_use]
    pub fn new(
        function_name: impl Into<String>,
        underlying: C,
        policy: Arc<AuthorizationPolicy>,
        outcome: AuthorizeOutcome,
    ) -> Self {
        Self {
            function_name: function_name.into(),
            underlying,
            policy,
            outcome,
        }
    }

    #[must_use]
    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    #[must_use]
    pub const fn underlying(&self) -> &C {
        &self.underlying
    }

    #[must_use]
    pub fn policy(&self) -> &AuthorizationPolicy {
        &self.policy
    }

    #[must_use]
    pub const fn outcome(&self) -> AuthorizeOutcome {
        self.outcome
    }

    #[must_use]
    pub fn into_underlying(self) -> C {
        self.underlying
    }
}
