//! Chatsweep Core Library
//!
//! Reachability-based garbage collection for a chat application's storage.
//!
//! # Stores
//! - Main database: chats, knowledge bases, memories, file records
//! - Vector database: embedded document chunks grouped into collections
//! - Uploads directory: the binary content behind file records
//!
//! Everything still referenced from surviving chats and knowledge bases is
//! kept; everything else is removed, after stale chats have been expired.

pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod filenames;
pub mod observe;
pub mod references;
pub mod retention;
pub mod sweep;
pub mod unused;
pub mod uploads;

pub use config::Config;
pub use db::{MainStore, RawDocument, StoreKind, VectorStore};
pub use error::{Error, Result, SweepError};
pub use observe::{ItemKind, RecordingObserver, SetKind, SweepEvent, SweepObserver, TracingObserver};
pub use sweep::{sweep, SweepOptions, SweepReport, Sweeper};
pub use uploads::{BlobStore, UploadsDir};

/// Default config directory name
pub const CONFIG_DIR_NAME: &str = "chatsweep";
