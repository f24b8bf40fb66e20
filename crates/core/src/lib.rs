pub mod clock;
pub mod config;
pub mod error;
pub mod targeting;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use error::{AdServeError, AdServeResult};
pub use types::ViewerContext;
