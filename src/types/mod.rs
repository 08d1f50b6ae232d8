pub mod decision;
pub mod subscription;

pub use decision::{AccessDecision, DenialReason, ErrorCode};
pub use subscription::{CallerIdentity, Subscription, SubscriptionStatus, Tool};
