//! External capabilities used by research workers.
//!
//! # Module Structure
//!
//! - [`search`](crate::tools::search) - Evidence providers (live web search, no-op stub)
//!
//! ```ignore
//! let provider = SearchProviderKind::Noop.build();
//! let hits = provider.search("grid-scale storage costs", 3).await?;
//! ```

/// Evidence providers (web search).
pub mod search;

pub use search::{EvidenceProvider, NoopSearch, SearchProviderKind};
#[cfg(feature = "web-search")]
pub use search::WebSearch;
