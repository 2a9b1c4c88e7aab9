//! Unit tests for the token domain and the memory store

pub mod token_tests;
