#![allow(missing_docs)]
// Above needed because the rstest fixture macro seems to produce undocumented functions and structs.

use rstest::*;

/// Include this in a test to turn on logging globally.
/// Safe to include in every test, later initialisations are no-ops.
#[fixture]
pub fn logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}
