use crate::error::{codes, ServiceError};
use crate::service::{LoadBalancerService, ServiceCall};
use crate::types::{
    HealthCheckSpec, InstanceRef, ListenerSpec, LoadBalancerDescription, LoadBalancerName,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use tracing::debug;

/// Provider-side state of one load balancer
#[derive(Debug, Clone)]
struct LoadBalancerRecord {
    dns_name: String,
    subnets: Vec<String>,
    listeners: BTreeMap<u16, ListenerSpec>,
    instances: BTreeSet<InstanceRef>,
    health_check: Option<HealthCheckSpec>,
    created_at: DateTime<Utc>,
}

impl LoadBalancerRecord {
    fn describe(&self, name: &LoadBalancerName) -> LoadBalancerDescription {
        LoadBalancerDescription {
            name: name.clone(),
            dns_name: self.dns_name.clone(),
            subnets: self.subnets.clone(),
            listeners: self.listeners.values().copied().collect(),
            instances: self.instances.clone(),
            health_check: self.health_check.clone(),
            created_at: self.created_at,
        }
    }
}

/// Simulated provider control API.
///
/// Behaves like a strict classic provider: adding a listener on an occupied
/// frontend port reports `DuplicateListener` even when the rule is identical,
/// deleting an absent listener reports `ListenerNotFound`, and deregistering
/// a non-member removes the members it can and reports `InstanceNotRegistered`.
/// Faults can be queued per call with [`fail_next`](Self::fail_next).
pub struct InMemoryLoadBalancerService {
    region: String,
    load_balancers: DashMap<LoadBalancerName, LoadBalancerRecord>,
    faults: Mutex<HashMap<ServiceCall, VecDeque<ServiceError>>>,
    calls: Mutex<Vec<ServiceCall>>,
}

impl InMemoryLoadBalancerService {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            load_balancers: DashMap::new(),
            faults: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a fault returned by the next `call` instead of executing it
    pub fn fail_next(&self, call: ServiceCall, error: ServiceError) {
        self.faults.lock().entry(call).or_default().push_back(error);
    }

    /// Every call received so far, in order
    pub fn calls(&self) -> Vec<ServiceCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, call: ServiceCall) -> usize {
        self.calls.lock().iter().filter(|c| **c == call).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Drop a load balancer as if it was deleted outside this system
    pub fn remove(&self, name: &LoadBalancerName) -> bool {
        self.load_balancers.remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.load_balancers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.load_balancers.is_empty()
    }

    /// Record the call and pop a queued fault, if any
    fn begin(&self, call: ServiceCall, name: &LoadBalancerName) -> Result<(), ServiceError> {
        debug!(call = %call, load_balancer = %name, "In-memory provider call");
        self.calls.lock().push(call);

        let injected = self
            .faults
            .lock()
            .get_mut(&call)
            .and_then(|queue| queue.pop_front());

        match injected {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn with_record<T, F>(&self, name: &LoadBalancerName, f: F) -> Result<T, ServiceError>
    where
        F: FnOnce(&mut LoadBalancerRecord) -> Result<T, ServiceError>,
    {
        match self.load_balancers.get_mut(name) {
            Some(mut record) => f(record.value_mut()),
            None => Err(ServiceError::load_balancer_not_found(name.as_str())),
        }
    }

    fn generate_dns_name(&self, name: &LoadBalancerName) -> String {
        let suffix: u64 = rand::thread_rng().gen_range(1_000_000_000..10_000_000_000);
        format!(
            "{}-{}.{}.elb.amazonaws.com",
            name.as_str().to_ascii_lowercase(),
            suffix,
            self.region
        )
    }
}

fn listeners_by_port(
    listeners: &[ListenerSpec],
) -> Result<BTreeMap<u16, ListenerSpec>, ServiceError> {
    let mut by_port = BTreeMap::new();
    for listener in listeners {
        if by_port.insert(listener.frontend_port, *listener).is_some() {
            return Err(ServiceError::new(
                codes::INVALID_CONFIGURATION,
                format!(
                    "Request contains more than one listener on port {}",
                    listener.frontend_port
                ),
            ));
        }
    }
    Ok(by_port)
}

#[async_trait]
impl LoadBalancerService for InMemoryLoadBalancerService {
    async fn create_load_balancer(
        &self,
        name: &LoadBalancerName,
        subnets: &[String],
        listeners: &[ListenerSpec],
    ) -> Result<String, ServiceError> {
        self.begin(ServiceCall::CreateLoadBalancer, name)?;

        if subnets.is_empty() {
            return Err(ServiceError::new(
                codes::INVALID_CONFIGURATION,
                "At least one subnet is required",
            ));
        }
        let listeners = listeners_by_port(listeners)?;

        match self.load_balancers.entry(name.clone()) {
            // Re-creating with identical parameters returns the existing load balancer
            Entry::Occupied(existing) => {
                let record = existing.get();
                if record.subnets == subnets && record.listeners == listeners {
                    Ok(record.dns_name.clone())
                } else {
                    Err(ServiceError::new(
                        codes::DUPLICATE_LOAD_BALANCER_NAME,
                        format!("Load balancer name '{}' is already in use", name),
                    ))
                }
            }
            Entry::Vacant(slot) => {
                let dns_name = self.generate_dns_name(name);
                slot.insert(LoadBalancerRecord {
                    dns_name: dns_name.clone(),
                    subnets: subnets.to_vec(),
                    listeners,
                    instances: BTreeSet::new(),
                    health_check: None,
                    created_at: Utc::now(),
                });
                Ok(dns_name)
            }
        }
    }

    async fn configure_health_check(
        &self,
        name: &LoadBalancerName,
        health_check: &HealthCheckSpec,
    ) -> Result<(), ServiceError> {
        self.begin(ServiceCall::ConfigureHealthCheck, name)?;
        self.with_record(name, |record| {
            record.health_check = Some(health_check.clone());
            Ok(())
        })
    }

    async fn create_listeners(
        &self,
        name: &LoadBalancerName,
        listeners: &[ListenerSpec],
    ) -> Result<(), ServiceError> {
        self.begin(ServiceCall::CreateListeners, name)?;
        let requested = listeners_by_port(listeners)?;

        self.with_record(name, |record| {
            if let Some(port) = requested.keys().find(|p| record.listeners.contains_key(*p)) {
                return Err(ServiceError::new(
                    codes::DUPLICATE_LISTENER,
                    format!("A listener already exists for '{}' on port {}", name, port),
                ));
            }
            record.listeners.extend(requested);
            Ok(())
        })
    }

    async fn delete_listeners(
        &self,
        name: &LoadBalancerName,
        frontend_ports: &[u16],
    ) -> Result<(), ServiceError> {
        self.begin(ServiceCall::DeleteListeners, name)?;

        self.with_record(name, |record| {
            if let Some(port) = frontend_ports
                .iter()
                .find(|p| !record.listeners.contains_key(*p))
            {
                return Err(ServiceError::new(
                    codes::LISTENER_NOT_FOUND,
                    format!("No listener on port {} for '{}'", port, name),
                ));
            }
            for port in frontend_ports {
                record.listeners.remove(port);
            }
            Ok(())
        })
    }

    async fn register_instances(
        &self,
        name: &LoadBalancerName,
        instances: &[InstanceRef],
    ) -> Result<(), ServiceError> {
        self.begin(ServiceCall::RegisterInstances, name)?;
        self.with_record(name, |record| {
            record.instances.extend(instances.iter().cloned());
            Ok(())
        })
    }

    async fn deregister_instances(
        &self,
        name: &LoadBalancerName,
        instances: &[InstanceRef],
    ) -> Result<(), ServiceError> {
        self.begin(ServiceCall::DeregisterInstances, name)?;
        self.with_record(name, |record| {
            let missing: Vec<&str> = instances
                .iter()
                .filter(|i| !record.instances.remove(*i))
                .map(|i| i.as_str())
                .collect();

            if missing.is_empty() {
                Ok(())
            } else {
                Err(ServiceError::new(
                    codes::INSTANCE_NOT_REGISTERED,
                    format!(
                        "Instances not registered with '{}': {}",
                        name,
                        missing.join(", ")
                    ),
                ))
            }
        })
    }

    async fn describe_load_balancer(
        &self,
        name: &LoadBalancerName,
    ) -> Result<LoadBalancerDescription, ServiceError> {
        self.begin(ServiceCall::DescribeLoadBalancer, name)?;
        self.load_balancers
            .get(name)
            .map(|record| record.describe(name))
            .ok_or_else(|| ServiceError::load_balancer_not_found(name.as_str()))
    }
}
