pub mod estimation;
pub mod idempotency;
pub mod orchestrator;
pub mod outbox;
pub mod parse;
pub mod payment;
pub mod questions;
pub mod region;
pub mod status;
pub mod sweeper;
pub mod window;
