//! Report cache and stale-while-revalidate build orchestration.

pub mod builder;
pub mod cache;
pub mod model;
pub mod service;

pub use builder::InsightReportBuilder;
pub use cache::{CacheStats, Fetched, ReportCache};
pub use model::{Report, ReportKey, ReportKind};
pub use service::{FetchedReport, ReportBuilder, ReportService};
