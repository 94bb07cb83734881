//! elb-manager — lifecycle management for classic load balancers
//!
//! Provisions a load balancer in front of a clustered control-plane API,
//! toggles its exposure by adding or removing the control-plane listener,
//! and keeps backend instance membership in sync. The provider control API is
//! reached through the [`LoadBalancerService`] trait; an HTTP client and an
//! in-memory provider are included.

pub mod backoff;
pub mod config;
pub mod error;
pub mod manager;
pub mod memory;
pub mod rpc;
pub mod service;
pub mod types;

pub use backoff::ExponentialBackoff;
pub use config::{ConfigError, ManagerConfig, ServiceConfig};
pub use error::{FaultKind, ManagerError, ServiceError};
pub use manager::LoadBalancerManager;
pub use memory::InMemoryLoadBalancerService;
pub use rpc::HttpLoadBalancerService;
pub use service::{LoadBalancerService, ServiceCall};
pub use types::{
    HealthCheckSpec, InstanceRef, ListenerSpec, LoadBalancerDescription, LoadBalancerName,
    Presence, Protocol, Visibility, CONTROL_PLANE_PORT,
};
