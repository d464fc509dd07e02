pub mod manager;
pub mod node;
pub mod storage;

pub use manager::{PlaceManager, PlaceNodeUpdate};
pub use node::{PlaceNode, PlaceNodeStatus};
pub use storage::PlaceStorage;

#[cfg(test)]
mod tests;
