use function_authz_sdk::{FunctionDescriptor, MetadataScanner};

/// [`MetadataScanner`] over a fixed registration table.
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct StaticMetadataScanner {
    functions: Vec<FunctionDescriptor>,
}

impl StaticMetadataScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_function(mut self, descriptor: FunctionDescriptor) -> Self {
        self.functions.push(descriptor);
        self
    }
}

impl FromIterator<FunctionDescriptor> for StaticMetadataScanner {
    fn from_iter<I: IntoIterator<Item = FunctionDescriptor>>(iter: I) -> Self {
        Self {
            functions: iter.into_iter().collect(),
        }
    }
}

impl MetadataScanner for StaticMetadataScanner {
    fn describe(&self, function_name: &str) -> Option<FunctionDescriptor> {
        let wanted = function_name.to_lowercase();
        self.functions
            .iter()
            .find(|descriptor| descriptor.name.to_lowercase() == wanted)
            .cloned()
    }

    fn functions(&self) -> Vec<FunctionDescriptor> {
        self.functions.clone()
    }
}
