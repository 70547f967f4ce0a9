pub mod gate;
pub mod service;

pub use gate::{allowed_actions, compute_window, LifecycleAction, LifecycleWindow};
pub use service::{AutoDroppedAssignment, LifecycleError, LifecycleService, AUTO_DROP_NOTIFICATION};
