//! Per-function and per-type authorization metadata.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use function_authz_sdk::{
    AuthorizeRequirement, DeclaringType, FunctionAuthzError, FunctionDescriptor, FunctionId,
};
use parking_lot::RwLock;

use super::type_map::FunctionTypeMap;

/// Authorization declarations collected for one function or one type.
///
/// Requirements are appended in registration order; anonymous access can
/// only be switched on.
#[derive(Debug)]
pub struct AuthorizationMetadata {
    id: FunctionId,
    function_name: Option<String>,
    declaring_type: Option<DeclaringType>,
    requirements: RwLock<Vec<AuthorizeRequirement>>,
    allows_anonymous_access: AtomicBool,
}

impl AuthorizationMetadata {
    fn new(function_name: Option<String>, declaring_type: Option<DeclaringType>) -> Self {
        Self {
            id: FunctionId::new(function_name.as_deref(), declaring_type.as_ref()),
            function_name,
            declaring_type,
            requirements: RwLock::new(Vec::new()),
            allows_anonymous_access: AtomicBool::new(false),
        }
    }

    /// Record returned for functions nobody registered.
    #[must_use]
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::new(None, None))
    }

    /// Whether this is the record returned for unregistered functions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.function_name.is_none() && self.declaring_type.is_none()
    }

    #[must_use]
    pub const fn id(&self) -> FunctionId {
        self.id
    }

    #[must_use]
    pub fn function_name(&self) -> Option<&str> {
        self.function_name.as_deref()
    }

    #[must_use]
    pub const fn declaring_type(&self) -> Option<&DeclaringType> {
        self.declaring_type.as_ref()
    }

    #[must_use]
    pub fn allows_anonymous_access(&self) -> bool {
        self.allows_anonymous_access.load(Ordering::Acquire)
    }

    /// Snapshot of the requirements in registration order.
    #[must_use]
    pub fn requirements(&self) -> Vec<AuthorizeRequirement> {
        self.requirements.read().clone()
    }

    pub fn add_requirement(&self, requirement: AuthorizeRequirement) {
        self.requirements.write().push(requirement);
    }

    pub fn add_requirements<I>(&self, requirements: I)
    where
        I: IntoIterator<Item = AuthorizeRequirement>,
    {
        self.requirements.write().extend(requirements);
    }

    pub fn allow_anonymous_access(&self) {
        self.allows_anonymous_access.store(true, Ordering::Release);
    }
}

/// Registry of authorization metadata keyed by [`FunctionId`].
#[derive(Debug, Default)]
pub struct MetadataStore {
    items: DashMap<FunctionId, Arc<AuthorizationMetadata>>,
    type_map: FunctionTypeMap,
}

impl MetadataStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets or creates the type-level record of `declaring_type`.
    /// The flag is `true` when the record already existed.
    #[must_use]
    pub fn add_type(&self, declaring_type: &DeclaringType) -> (Arc<AuthorizationMetadata>, bool) {
        self.get_or_add_with(None, declaring_type, |_| {})
    }

    /// Gets or creates the record of `function_name` and maps the name to
    /// `declaring_type`.
    #[must_use]
    pub fn add_function(
        &self,
        function_name: &str,
        declaring_type: &DeclaringType,
    ) -> Arc<AuthorizationMetadata> {
        self.type_map
            .add_function_type(function_name, declaring_type.clone());
        self.get_or_add_with(Some(function_name), declaring_type, |_| {})
            .0
    }

    /// Registers everything a scanner reports for one function.
    ///
    /// The type record is populated only when it is created here; the function
    /// record likewise. Both records are complete before the function name
    /// becomes resolvable, so concurrent resolution never observes a
    /// half-registered function.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the function name is blank.
    pub fn register(
        &self,
        descriptor: &FunctionDescriptor,
    ) -> Result<Arc<AuthorizationMetadata>, FunctionAuthzError> {
        let name = descriptor.name.trim();
        if name.is_empty() {
            return Err(FunctionAuthzError::InvalidArgument(
                "function name must not be blank".to_owned(),
            ));
        }

        let type_descriptor = &descriptor.declaring_type;
        let declaring_type = &type_descriptor.declaring_type;

        let (_, type_existed) = self.get_or_add_with(None, declaring_type, |record| {
            record.add_requirements(type_descriptor.requirements.iter().cloned());
            if type_descriptor.allow_anonymous {
                record.allow_anonymous_access();
            }
        });

        let (function, function_existed) =
            self.get_or_add_with(Some(name), declaring_type, |record| {
                record.add_requirements(descriptor.requirements.iter().cloned());
                if descriptor.allow_anonymous {
                    record.allow_anonymous_access();
                }
            });

        self.type_map
            .add_function_type(name, declaring_type.clone());

        tracing::debug!(
            function = name,
            declaring_type = %declaring_type,
            type_existed,
            function_existed,
            "registered function authorization metadata"
        );

        Ok(function)
    }

    /// Type-level requirements followed by function-level requirements;
    /// anonymous access if either level allows it. Unregistered names get
    /// [`AuthorizationMetadata::empty`].
    #[must_use]
    pub fn get_merged_metadata(&self, function_name: &str) -> Arc<AuthorizationMetadata> {
        let Some(declaring_type) = self.type_map.declaring_type(function_name) else {
            return AuthorizationMetadata::empty();
        };

        let merged = AuthorizationMetadata::new(
            Some(function_name.to_owned()),
            Some(declaring_type.clone()),
        );

        if let Some(type_record) = self.items.get(&FunctionId::for_type(&declaring_type)) {
            merged.add_requirements(type_record.requirements());
            if type_record.allows_anonymous_access() {
                merged.allow_anonymous_access();
            }
        }

        if let Some(function_record) = self
            .items
            .get(&FunctionId::for_function(function_name, &declaring_type))
        {
            merged.add_requirements(function_record.requirements());
            if function_record.allows_anonymous_access() {
                merged.allow_anonymous_access();
            }
        }

        Arc::new(merged)
    }

    #[must_use]
    pub fn is_registered(&self, function_name: &str) -> bool {
        self.type_map.is_function_registered(function_name)
    }

    /// Identity of `function_name`, including its declaring type once known.
    #[must_use]
    pub fn function_id(&self, function_name: &str) -> FunctionId {
        let declaring_type = self.type_map.declaring_type(function_name);
        FunctionId::new(Some(function_name), declaring_type.as_ref())
    }

    /// Number of type-level and function-level records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn get_or_add_with<F>(
        &self,
        function_name: Option<&str>,
        declaring_type: &DeclaringType,
        init: F,
    ) -> (Arc<AuthorizationMetadata>, bool)
    where
        F: FnOnce(&AuthorizationMetadata),
    {
        let id = FunctionId::new(function_name, Some(declaring_type));
        if let Some(existing) = self.items.get(&id) {
            return (Arc::clone(existing.value()), true);
        }

        match self.items.entry(id) {
            Entry::Occupied(existing) => (Arc::clone(existing.get()), true),
            Entry::Vacant(slot) => {
                let record = AuthorizationMetadata::new(
                    function_name.map(str::to_owned),
                    Some(declaring_type.clone()),
                );
                init(&record);
                let record = Arc::new(record);
                slot.insert(Arc::clone(&record));
                (record, false)
            }
        }
    }
}
