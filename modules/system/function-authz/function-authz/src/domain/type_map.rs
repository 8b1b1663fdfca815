use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use function_authz_sdk::DeclaringType;

/// Case-insensitive `function name -> declaring type` map.
#[derive(Debug, Default)]
pub struct FunctionTypeMap {
    types: DashMap<String, DeclaringType>,
}

impl FunctionTypeMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the declaring type of `function_name`. The first registration
    /// wins; returns `false` if the name was already mapped.
    pub fn add_function_type(&self, function_name: &str, declaring_type: DeclaringType) -> bool {
        match self.types.entry(normalize(function_name)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(declaring_type);
                true
            }
        }
    }

    #[must_use]
    pub fn declaring_type(&self, function_name: &str) -> Option<DeclaringType> {
        self.types
            .get(&normalize(function_name))
            .map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn is_function_registered(&self, function_name: &str) -> bool {
        self.types.contains_key(&normalize(function_name))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

fn normalize(function_name: &str) -> String {
    function_name.to_lowercase()
}
