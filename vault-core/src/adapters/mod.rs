//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for durable storage (file or in-memory database)
//! - Plain in-process collections for tests and throwaway ledgers

pub mod duckdb;
pub mod memory;
