#![forbid(unsafe_code)]

pub mod book;
pub mod classify;
pub mod cli;
pub mod config;
pub mod crawl;
pub mod elastic;
pub mod formats;
pub mod ingest;
pub mod inputs;
pub mod lexicon;
pub mod logging;
pub mod query;
pub mod session;
pub mod sink;
pub mod verses;
