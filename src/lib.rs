pub mod error;
pub mod record;
pub mod taxonomy;
pub mod stats;
pub mod selector;
pub mod gain;
pub mod grouping;
pub mod store;
pub mod config;
pub mod pipeline;
pub mod report;
pub mod cli;
