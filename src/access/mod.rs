pub mod controller;
pub mod store;

pub use controller::{AccessController, AccessDecision, DenyReason};
pub use store::{InMemoryUserStore, UserAccount, UserStore};
