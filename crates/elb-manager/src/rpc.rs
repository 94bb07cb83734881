/// HTTP client for the provider control endpoint
/// Each call POSTs `{"action", "region", "params"}` and expects either
/// `{"result": ...}` or `{"error": {"code", "message"}}` back.

use crate::backoff::{execute_with_backoff, ExponentialBackoff};
use crate::config::ServiceConfig;
use crate::error::ServiceError;
use crate::service::{LoadBalancerService, ServiceCall};
use crate::types::{
    HealthCheckSpec, InstanceRef, ListenerSpec, LoadBalancerDescription, LoadBalancerName,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error};

const INVALID_RESPONSE: &str = "InvalidResponse";

/// Reply envelope shared by every action
#[derive(Debug, Default, Deserialize)]
struct Envelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ServiceError>,
}

#[derive(Debug, Deserialize)]
struct CreateLoadBalancerResult {
    dns_name: String,
}

#[derive(Debug, Deserialize)]
struct DescribeLoadBalancersResult {
    #[serde(default)]
    load_balancer_descriptions: Vec<LoadBalancerDescription>,
}

/// Provider control API reached over HTTP
pub struct HttpLoadBalancerService {
    endpoint: String,
    region: String,
    client: reqwest::Client,
    max_retries: u32,
    backoff_base_ms: u64,
    backoff_max_ms: u64,
}

impl HttpLoadBalancerService {
    pub fn new(config: &ServiceConfig) -> Self {
        let client = reqwest::ClientBuilder::new()
            .timeout(config.request_timeout())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        HttpLoadBalancerService {
            endpoint: config.endpoint.clone(),
            region: config.region.clone(),
            client,
            max_retries: config.max_retries,
            backoff_base_ms: config.backoff_base_ms,
            backoff_max_ms: config.backoff_max_ms,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Issue one action, retrying transport failures
    async fn call<T: DeserializeOwned>(
        &self,
        call: ServiceCall,
        params: Value,
    ) -> Result<T, ServiceError> {
        let body = json!({
            "action": call.action(),
            "region": self.region,
            "params": params,
        });

        let backoff = ExponentialBackoff::new(self.backoff_base_ms, self.backoff_max_ms);
        execute_with_backoff(backoff, self.max_retries, || self.send_once(call, &body)).await
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        call: ServiceCall,
        body: &Value,
    ) -> Result<T, ServiceError> {
        debug!(action = %call, endpoint = %self.endpoint, "Sending provider request");

        let response = self
            .client
            .post(&self.endpoint)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ServiceError::transport(format!("{} timed out", call))
                } else {
                    ServiceError::transport(format!("{} request failed: {}", call, e))
                }
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            ServiceError::transport(format!("Failed to read {} response: {}", call, e))
        })?;

        let envelope = parse_envelope(&text);

        if let Some(fault) = envelope.as_ref().and_then(|e| e.error.clone()) {
            debug!(action = %call, code = %fault.code, "Provider reported fault");
            return Err(fault);
        }
        if status.is_server_error() {
            return Err(ServiceError::transport(format!("HTTP {}: {}", status, text)));
        }
        if !status.is_success() {
            return Err(ServiceError::new(
                format!("Http{}", status.as_u16()),
                format!("{} rejected with HTTP {}: {}", call, status, text),
            ));
        }

        let envelope = envelope.ok_or_else(|| {
            error!(action = %call, "Invalid JSON in provider response");
            ServiceError::new(INVALID_RESPONSE, format!("Invalid JSON in {} response", call))
        })?;

        serde_json::from_value(envelope.result.unwrap_or(Value::Null)).map_err(|e| {
            error!(action = %call, error = %e, "Unexpected provider response shape");
            ServiceError::new(
                INVALID_RESPONSE,
                format!("Failed to parse {} response: {}", call, e),
            )
        })
    }
}

/// An empty body carries no result
fn parse_envelope(text: &str) -> Option<Envelope> {
    if text.trim().is_empty() {
        return Some(Envelope::default());
    }
    serde_json::from_str(text).ok()
}

fn instance_params(instances: &[InstanceRef]) -> Value {
    instances
        .iter()
        .map(|i| json!({ "instance_id": i.as_str() }))
        .collect()
}

#[async_trait]
impl LoadBalancerService for HttpLoadBalancerService {
    async fn create_load_balancer(
        &self,
        name: &LoadBalancerName,
        subnets: &[String],
        listeners: &[ListenerSpec],
    ) -> Result<String, ServiceError> {
        let result: CreateLoadBalancerResult = self
            .call(
                ServiceCall::CreateLoadBalancer,
                json!({
                    "load_balancer_name": name,
                    "subnets": subnets,
                    "listeners": listeners,
                }),
            )
            .await?;
        Ok(result.dns_name)
    }

    async fn configure_health_check(
        &self,
        name: &LoadBalancerName,
        health_check: &HealthCheckSpec,
    ) -> Result<(), ServiceError> {
        self.call(
            ServiceCall::ConfigureHealthCheck,
            json!({
                "load_balancer_name": name,
                "target": health_check.target(),
                "health_check": health_check,
            }),
        )
        .await
    }

    async fn create_listeners(
        &self,
        name: &LoadBalancerName,
        listeners: &[ListenerSpec],
    ) -> Result<(), ServiceError> {
        self.call(
            ServiceCall::CreateListeners,
            json!({
                "load_balancer_name": name,
                "listeners": listeners,
            }),
        )
        .await
    }

    async fn delete_listeners(
        &self,
        name: &LoadBalancerName,
        frontend_ports: &[u16],
    ) -> Result<(), ServiceError> {
        self.call(
            ServiceCall::DeleteListeners,
            json!({
                "load_balancer_name": name,
                "load_balancer_ports": frontend_ports,
            }),
        )
        .await
    }

    async fn register_instances(
        &self,
        name: &LoadBalancerName,
        instances: &[InstanceRef],
    ) -> Result<(), ServiceError> {
        self.call(
            ServiceCall::RegisterInstances,
            json!({
                "load_balancer_name": name,
                "instances": instance_params(instances),
            }),
        )
        .await
    }

    async fn deregister_instances(
        &self,
        name: &LoadBalancerName,
        instances: &[InstanceRef],
    ) -> Result<(), ServiceError> {
        self.call(
            ServiceCall::DeregisterInstances,
            json!({
                "load_balancer_name": name,
                "instances": instance_params(instances),
            }),
        )
        .await
    }

    async fn describe_load_balancer(
        &self,
        name: &LoadBalancerName,
    ) -> Result<LoadBalancerDescription, ServiceError> {
        let result: DescribeLoadBalancersResult = self
            .call(
                ServiceCall::DescribeLoadBalancer,
                json!({ "load_balancer_names": [name] }),
            )
            .await?;

        result
            .load_balancer_descriptions
            .into_iter()
            .find(|d| &d.name == name)
            .ok_or_else(|| ServiceError::load_balancer_not_found(name.as_str()))
    }
}
