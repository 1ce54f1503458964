// lib.rs - Robot Framework language server.
//
// The binary entry point lives in main.rs; tests and benches use the
// library directly.

pub mod backend;
pub mod builtins;
pub mod bus;
pub mod classifier;
pub mod config;
pub mod document_store;
pub mod error;
pub mod features;
pub mod introspection;
pub mod keyword_matcher;
pub mod library_doc;
pub mod namespace;
pub mod perf;
pub mod state;
pub mod syntax;
pub mod utf16;

// test_utils is available in test builds and when the `test-support` feature is enabled.
#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;

/// Language id this server's features register for.
pub const ROBOT_LANGUAGE_ID: &str = "robotframework";
