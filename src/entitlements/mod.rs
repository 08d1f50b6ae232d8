pub mod aggregator;
pub mod resolver;
pub mod service;

pub use aggregator::{MultiToolAccess, MultiToolAggregator};
pub use resolver::{effective_status, resolve, resolve_subscription};
pub use service::EntitlementService;
