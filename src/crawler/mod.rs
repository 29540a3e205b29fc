//! Crawling engine: fetching, parsing, scheduling, and run coordination
//!
//! The pieces compose bottom-up: [`PageFetcher`] issues single GETs over
//! the shared connection pool, [`parser`] turns listing HTML into filtered
//! records, [`links`] resolves a tag to its listing URLs, [`TaskScheduler`]
//! bounds the fan-out, and [`Coordinator`] drives one run per criteria.

pub mod coordinator;
pub mod fetcher;
pub mod links;
pub mod parser;
pub mod scheduler;

pub use coordinator::{Coordinator, RunReport};
pub use fetcher::{FetchError, PageFetcher};
pub use links::resolve_links;
pub use parser::{extract_candidates, page_count, RawEntry};
pub use scheduler::{
    await_all, BatchReport, SchedulerHandle, SubmitError, TaskHandle, TaskOutcome, TaskScheduler,
};
