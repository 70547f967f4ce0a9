pub mod assignment;
pub mod audit;
pub mod bidding;
pub mod driver;
pub mod error;
pub mod health;
pub mod ids;
pub mod notification;
pub mod org;
pub mod route;
pub mod settings;

pub use error::{classify, DispatchError, ErrorClass};
pub use ids::*;
