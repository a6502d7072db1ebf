//! Plugin System Tests
//!
//! Cross-module tests for the plugin host with mock programs.

pub mod mock_programs;


#[cfg(test)]
pub mod protocol_tests;
