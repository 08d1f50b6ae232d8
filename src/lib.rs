pub mod backend;
pub mod cmd;
pub mod db;
pub mod entitlements;
pub mod feedback;
pub mod guard;
pub mod metrics;
pub mod store;
pub mod types;
pub mod utils;
pub mod validator;
