pub mod classify;
pub mod config;
pub mod credentials;
pub mod engine;
pub mod entry;
pub mod error;
pub mod path_map;
pub mod progress;
pub mod remote;
pub mod report;
pub mod transfer;
pub mod walker;

pub use config::{ListingMode, MirrorConfig};
pub use credentials::{ConfigSecretProvider, SecretProvider};
pub use engine::{MirrorEngine, MirrorResult};
pub use entry::{EntryKind, TreeEntry};
pub use error::Error;
pub use progress::{MirrorReporter, SilentReporter};
pub use report::{MirrorReport, NodeOutcome, NodeStatus};
