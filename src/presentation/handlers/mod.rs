mod health;

pub use health::{health_handler, liveness_handler};
