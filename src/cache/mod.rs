//! Artifact cache for provisioned conda state
//!
//! Bundles are addressed by a deterministic key and always cover the same
//! ordered set of locations. Restores and saves are advisory: a failure only
//! costs the next run time, never the current run its environment.
//!
//! # Backends
//!
//! | Backend | Storage | Use |
//! |---------|---------|-----|
//! | directory | `<root>/<key>.tar.gz` | shared volumes, local testing |
//! | http | `GET/HEAD/PUT <url>/<key>.tar.gz` | remote key/value stores |

pub mod archive;
pub mod http;
pub mod key;
pub mod local;
pub mod paths;
pub mod store;

pub use http::HttpCache;
pub use key::{CacheKey, CacheKeyBuilder, DEFAULT_NAMESPACE};
pub use local::DirectoryCache;
pub use paths::CachePathSet;
pub use store::{format_bytes, ArtifactCache, RestoreOutcome, SaveReceipt};
