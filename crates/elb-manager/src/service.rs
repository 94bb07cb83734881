use crate::error::ServiceError;
use crate::types::{HealthCheckSpec, InstanceRef, ListenerSpec, LoadBalancerDescription, LoadBalancerName};
use async_trait::async_trait;
use std::fmt;

/// Calls exposed by the provider control API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceCall {
    CreateLoadBalancer,
    ConfigureHealthCheck,
    CreateListeners,
    DeleteListeners,
    RegisterInstances,
    DeregisterInstances,
    DescribeLoadBalancer,
}

impl ServiceCall {
    /// Action name used on the wire
    pub fn action(&self) -> &'static str {
        match self {
            ServiceCall::CreateLoadBalancer => "CreateLoadBalancer",
            ServiceCall::ConfigureHealthCheck => "ConfigureHealthCheck",
            ServiceCall::CreateListeners => "CreateLoadBalancerListeners",
            ServiceCall::DeleteListeners => "DeleteLoadBalancerListeners",
            ServiceCall::RegisterInstances => "RegisterInstancesWithLoadBalancer",
            ServiceCall::DeregisterInstances => "DeregisterInstancesFromLoadBalancer",
            ServiceCall::DescribeLoadBalancer => "DescribeLoadBalancers",
        }
    }
}

impl fmt::Display for ServiceCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.action())
    }
}

/// Remote load balancer control API.
///
/// Implementations own transport concerns (authentication, timeouts, retry).
/// Every method is one round-trip; faults come back as [`ServiceError`] with
/// the provider's code intact so callers can classify them.
#[async_trait]
pub trait LoadBalancerService: Send + Sync {
    /// Create a load balancer and return its DNS name
    async fn create_load_balancer(
        &self,
        name: &LoadBalancerName,
        subnets: &[String],
        listeners: &[ListenerSpec],
    ) -> Result<String, ServiceError>;

    /// Replace the health check configuration
    async fn configure_health_check(
        &self,
        name: &LoadBalancerName,
        health_check: &HealthCheckSpec,
    ) -> Result<(), ServiceError>;

    async fn create_listeners(
        &self,
        name: &LoadBalancerName,
        listeners: &[ListenerSpec],
    ) -> Result<(), ServiceError>;

    async fn delete_listeners(
        &self,
        name: &LoadBalancerName,
        frontend_ports: &[u16],
    ) -> Result<(), ServiceError>;

    async fn register_instances(
        &self,
        name: &LoadBalancerName,
        instances: &[InstanceRef],
    ) -> Result<(), ServiceError>;

    async fn deregister_instances(
        &self,
        name: &LoadBalancerName,
        instances: &[InstanceRef],
    ) -> Result<(), ServiceError>;

    async fn describe_load_balancer(
        &self,
        name: &LoadBalancerName,
    ) -> Result<LoadBalancerDescription, ServiceError>;
}
