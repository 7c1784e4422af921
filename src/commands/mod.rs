//! CLI commands implementation

pub mod checkpoint;
pub mod ingest;
pub mod init;
pub mod media;
pub mod status;

pub use checkpoint::*;
pub use ingest::*;
pub use init::*;
pub use media::*;
pub use status::*;
