//! ChatQL core
//!
//! Users, channels identified by their member set, globally sequenced
//! messages, and an in-process bus that turns each persisted message into
//! a live, membership-checked notification.

pub mod bus;
pub mod channels;
pub mod config;
pub mod engine;
pub mod logging;
pub mod messaging;
pub mod model;
pub mod retry;
pub mod sequencer;
pub mod store;
pub mod users;

pub use engine::ChatEngine;
