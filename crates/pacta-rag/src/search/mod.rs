pub mod hybrid;
pub mod lexical;

pub use hybrid::{boost_count, fuse_contributions, HybridRetriever};
pub use lexical::{LexicalHit, LexicalRanker};
