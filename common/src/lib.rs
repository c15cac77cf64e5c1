//! Primitives shared by every crate in the design-studio workspace.
//!
//! ## Architecture
//!
//! - **common** (this crate): error plumbing shared across crates
//! - **channel-core**: the real-time job-event channel
//! - **studio**: terminal host wiring the channel to a user
//!
//! Keeping location tracking here lets every error enum in the workspace
//! render the same `[file:line:column]` suffix.

pub mod error;

pub use error::error_location::ErrorLocation;
