pub mod config;
pub mod coords;
pub mod fetch;
pub mod normalize;
pub mod output;
pub mod parser;
pub mod poller;
pub mod registry;
pub mod subscriptions;
pub mod tracker;
pub mod types;

pub use coords::Position;
pub use poller::{PollHandle, Poller, SharedTracker};
pub use tracker::BusTracker;
pub use types::{BusRecord, LineKey};
