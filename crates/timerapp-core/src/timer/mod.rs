mod model;
mod scheduler;
mod store;

pub use model::{NewTimer, Tick, Timer, TimerId, TimerStatus};
pub use scheduler::CountdownScheduler;
pub use store::TimerStore;
