//! Bazaar Crawl: discovery and fan-out collection against the upstream API.
//!
//! Every outbound request goes through one [`FetchClient`], whose gate caps
//! in-flight requests for the whole run. Collections add their own task
//! limit and a deadline; a failed or late request only costs its own item.

pub mod api;
pub mod client;
pub mod discovery;
pub mod fanout;
pub mod jobs;
pub mod types;

pub use client::{FetchClient, FetchError};
pub use discovery::{ProductIndex, Resolver};
pub use fanout::{collect, Collected, FanoutSettings};
pub use jobs::{CatalogJob, CrawlJob, Harvest, ReviewJob};
pub use types::{Brand, Category, CrawlStats, Parent, WorkUnit};
