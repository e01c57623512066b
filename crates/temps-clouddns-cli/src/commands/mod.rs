pub mod challenge;
pub mod timeout;

pub use challenge::{CleanupCommand, PresentCommand};
pub use timeout::TimeoutCommand;
