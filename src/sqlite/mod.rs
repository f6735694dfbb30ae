//! `SQLite` driver backed by rusqlite and a bb8 pool.
//!
//! - config: options and the pool's connection manager
//! - params: conversion from `RowValues` to rusqlite values
//! - query: statement execution and result extraction
//! - executor: the pooled [`SqliteDatabase`] handle
//! - transaction: [`SqliteTx`], a transaction owning one pooled connection

pub mod config;
mod connection;
pub mod executor;
pub mod params;
pub mod query;
pub mod transaction;

pub use config::{SqliteManager, SqliteOptions, SqliteOptionsBuilder};
pub use executor::SqliteDatabase;
pub use transaction::SqliteTx;
