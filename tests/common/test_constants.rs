//! Shared constants for integration tests.
//!
//! Integration tests are compiled as separate crates (one per top-level file in
//! `tests/`). Placing shared constants under `tests/common/` avoids creating an
//! additional integration test binary while still allowing reuse via:
//!
//! ```rust
//! #[path = "common/test_constants.rs"]
//! mod test_constants;
//! ```

/// Region the simulated provider places most fixtures in.
pub const EAST: &str = "us-east-1";

/// Second region, used to exercise cross-scope checks.
pub const WEST: &str = "eu-west-1";

/// Nodes registered in [`EAST`].
pub const EAST_NODES: [&str; 2] = ["i-1", "i-2"];

/// Node registered in [`WEST`].
pub const WEST_NODE: &str = "i-9";
