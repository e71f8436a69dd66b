// Trellis - request routing for async HTTP servers
//
// Compiles path patterns into a static index and a segment trie, caches
// match results, and runs matched handlers behind a middleware pipeline.

// Re-export core functionality
pub use trellis_core::*;
