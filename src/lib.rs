#![doc = "backup-fetch-core: core logic library for backup-fetch."]

//! This crate contains the data model and the fetch pipeline: list a bucket,
//! keep the objects that look like recent backups, and copy them to a local
//! directory. It holds no network code; the storage client is plugged in
//! through the [`contract::ObjectStore`] trait.
//!
//! # Usage
//! Construct a [`fetch::BackupFetcher`] with any `ObjectStore` implementation
//! and call [`fetch::BackupFetcher::run`].

pub mod config;
pub mod contract;
pub mod download;
pub mod fetch;
pub mod filter;
