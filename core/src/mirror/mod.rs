pub mod service;
pub mod source;
pub mod tree;

pub use service::{MirrorConfig, MirrorService, MirrorStatus};
pub use source::{CommitmentSource, LedgerSource};
pub use tree::{MirrorProof, MirrorTree};
