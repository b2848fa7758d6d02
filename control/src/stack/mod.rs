//! Operations on the local media stack

pub mod containers;
pub mod services;

pub use containers::{health_snapshot, list_containers, Container, HealthSnapshot};
pub use services::{restart_stack, service_action, update_stack, ServiceAction};
