pub mod browser;
pub mod direct_fetch;
pub mod heuristic;
pub mod http;
pub mod page;
pub mod structured_api;

pub use browser::BrowserStrategy;
pub use direct_fetch::DirectFetchStrategy;
pub use heuristic::HeuristicStrategy;
pub use structured_api::StructuredApiStrategy;
