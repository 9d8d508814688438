#![forbid(unsafe_code)]

//! Harvests the outbound links of a YouTube channel's video descriptions,
//! resolves their destination domains and publishes the result to a Google
//! Sheets range.
//!
//! The pipeline is split into four stages (`videos`, `links`, `domains`,
//! `publish`) that hand plain record values to each other and can be resumed
//! from the JSON snapshots written between stages.

pub mod config;
pub mod error;
pub mod http;
pub mod links;
pub mod models;
pub mod pipeline;
pub mod resolver;
pub mod sheets;
pub mod snapshot;
pub mod youtube;
