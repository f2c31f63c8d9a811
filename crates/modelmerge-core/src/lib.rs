pub mod codec;
pub mod config;
pub mod logging;
pub mod session;
pub mod source;

pub use codec::{DocumentCodec, JsonCodec};
pub use config::{LoggingSettings, MergeSettings, Settings, Strategy};
pub use session::{FileMerge, FileSummary, MergeSession, SessionManager};
pub use source::{DirRevisionSource, MemoryRevisionSource, Revision, RevisionSource};
