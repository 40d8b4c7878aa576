//! Integration tests for the artifact store

mod concurrency;
mod exploded_mutation;
mod hash_determinism;
mod path_containment;
mod repository_lifecycle;
mod sweep_two_phase;
mod test_utils;
