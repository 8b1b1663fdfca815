pub mod discovery;
pub mod evaluator;
pub mod executor;
pub mod filter_cache;
pub mod metadata;
pub mod policies;
pub mod provider;
pub mod result_handler;
pub mod scanner;
pub mod schemes;
pub mod type_map;

pub use discovery::MetadataRegistrar;
pub use evaluator::SchemePolicyEvaluator;
pub use executor::FunctionAuthorizationExecutor;
pub use filter_cache::{AuthorizationFilterCache, FilterCache};
pub use metadata::{AuthorizationMetadata, MetadataStore};
pub use policies::StaticPolicyProvider;
pub use provider::{FunctionsAuthorizationProvider, PLATFORM_BOOTSTRAP_SCHEMES};
pub use result_handler::FunctionsAuthorizationResultHandler;
pub use scanner::StaticMetadataScanner;
pub use schemes::SchemeRegistry;
pub use type_map::FunctionTypeMap;
