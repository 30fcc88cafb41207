//! Session daemon for the focusdeck quadrant board.
//!
//! [`app::App`] owns the lifecycle rules, [`store::TaskStore`] the task
//! collection, and [`sync::SyncWorker`] pushes changes to the remote
//! row-store in the background.

pub mod app;
pub mod clock;
pub mod config;
pub mod error;
pub mod ipc;
pub mod persistence;
pub mod remote;
pub mod stats;
pub mod store;
pub mod sync;
pub mod ticker;

pub use app::App;
pub use error::FocusError;
