
pub mod loader_tests;
pub mod registry_tests;
