//! End-to-end tests: fetchers over an in-memory document source, the
//! reconciliation batch, and persistence in a temporary directory.

mod mock_source;
mod pipeline;
