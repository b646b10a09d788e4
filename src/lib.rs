//! Terminal browser for call detail records.
//!
//! Records are fetched from `GET {base}/records`, narrowed by per field
//! substring filters (a record is kept when any active filter matches) and
//! optionally sorted by `bytes_used`. Files can be posted to `{base}/upload`,
//! after which the collection is fetched again.

pub mod backend;
pub mod client;
pub mod config;
pub mod controller;
pub mod domain;
pub mod inputter;
pub mod model;
pub mod record;
pub mod ui;
pub mod view;
