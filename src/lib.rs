//! shardmerge - A strict, deterministic resultset merge engine for sharded query fan-out
//!
//! A query fanned out to several backend shards comes back as several
//! ordered result streams. This crate merges them into one client-facing
//! stream with global ORDER BY, cross-shard GROUP BY aggregation, HAVING,
//! LIMIT/OFFSET and a distributed-transaction consistency check.

pub mod cli;
pub mod config;
pub mod merge;
pub mod observability;
pub mod row;
