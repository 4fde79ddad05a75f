pub mod allowlist;
pub mod directory;
pub mod keyed_lock;
pub mod pipeline;

pub use allowlist::AllowlistService;
pub use directory::GroupDirectory;
pub use pipeline::{Decision, TokenHookPipeline};
