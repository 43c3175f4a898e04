//! Session and target management.
//!
//! # Modes
//!
//! | Mode | Session | Connection |
//! |------|---------|------------|
//! | Multiplexed | `Target.attachToTarget {flatten: true}` session ID | Shared root connection |
//! | Dedicated | None | One connection per target at `/devtools/page/{id}` |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `handle` | [`Target`] handle and its state machine |
//! | `manager` | [`Manager`] registry and reconciliation |

// ============================================================================
// Submodules
// ============================================================================

/// Target handle.
pub mod handle;

/// Target registry.
pub mod manager;

// ============================================================================
// Re-exports
// ============================================================================

pub use handle::{Session, Target};
pub use manager::{CreateOptions, Manager, ManagerOptions};
