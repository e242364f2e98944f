//
// test_utils/mod.rs
//
// Fixtures and doubles shared by unit tests and benchmarks
//

pub mod fixture_solution;
pub mod recording;

pub use recording::{RecordedCall, RecordingService};

/// Route `log` output through the test harness. Safe to call repeatedly.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
