//! Helpers for setting up throwaway databases, programmable collaborators, and seed data in tests. Compiled only
//! with the `test_utils` feature (or under `cfg(test)`), never into release builds.

pub mod mocks;
pub mod prepare_env;
pub mod seed;

pub use mocks::{MemoryRates, MockVerifier, RecordingNotifier};
pub use prepare_env::{create_database, prepare_test_env, random_db_path, run_migrations};
