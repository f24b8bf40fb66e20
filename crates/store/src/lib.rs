#![warn(clippy::unwrap_used)]

pub mod memory;
pub mod repository;
pub mod seed;

pub use memory::MemoryStore;
pub use repository::AdRepository;
pub use seed::seed_demo_data;
