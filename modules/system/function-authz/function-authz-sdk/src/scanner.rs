//! Discovery of per-function authorization declarations.

use crate::models::{AuthorizeRequirement, DeclaringType};

/// Authorization declarations of a type that hosts functions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub declaring_type: DeclaringType,
    pub requirements: Vec<AuthorizeRequirement>,
    pub allow_anonymous: bool,
}

impl TypeDescriptor {
    #[must_use]
    pub fn new(declaring_type: impl Into<DeclaringType>) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            requirements: Vec::new(),
            allow_anonymous: false,
        }
    }

    #[must_use]
    pub fn with_requirement(mut self, requirement: AuthorizeRequirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    #[must_use]
    pub const fn allowing_anonymous(mut self) -> Self {
        self.allow_anonymous = true;
        self
    }
}

/// Authorization declarations of one function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDescriptor {
    pub name: String,
    pub declaring_type: TypeDescriptor,
    pub requirements: Vec<AuthorizeRequirement>,
    pub allow_anonymous: bool,
}

impl FunctionDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, declaring_type: TypeDescriptor) -> Self {
        Self {
            name: name.into(),
            declaring_type,
            requirements: Vec::new(),
            allow_anonymous: false,
        }
    }

    #[must_use]
    pub fn with_requirement(mut self, requirement: AuthorizeRequirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    #[must_use]
    pub const fn allowing_anonymous(mut self) -> Self {
        self.allow_anonymous = true;
        self
    }
}

/// Reports the authorization declarations of the host's functions.
pub trait MetadataScanner: Send + Sync {
    /// Declarations of `function_name` (case-insensitive), if the host knows it.
    fn describe(&self, function_name: &str) -> Option<FunctionDescriptor>;

    /// Every function the host declares.
    fn functions(&self) -> Vec<FunctionDescriptor>;
}
