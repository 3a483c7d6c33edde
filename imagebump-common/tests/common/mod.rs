pub mod fixtures;
pub mod logging;

// Each test binary uses a different subset of these.
#[allow(unused_imports)]
pub use fixtures::{
    KSERVE_METADATA, OPERATORS_SERVICE_SPEC, ScenarioRun, kserve_source_control,
    metadata_from_yaml, seed_operators_service_spec,
};
#[allow(unused_imports)]
pub use logging::init_test_logging;
