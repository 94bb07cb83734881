use crate::config::ManagerConfig;
use crate::error::{FaultKind, ManagerError, ServiceError};
use crate::service::LoadBalancerService;
use crate::types::{
    HealthCheckSpec, InstanceRef, ListenerSpec, LoadBalancerDescription, LoadBalancerName,
    Presence, Visibility,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lifecycle manager for classic load balancers fronting a control-plane API.
///
/// Holds no state besides the service handle; the provider is the source of
/// truth for every query. Each operation is one round-trip (provision is two)
/// and returns as soon as the provider answers.
#[derive(Clone)]
pub struct LoadBalancerManager {
    service: Arc<dyn LoadBalancerService>,
    config: ManagerConfig,
}

impl LoadBalancerManager {
    /// Create a manager with the default control-plane settings
    pub fn new(service: Arc<dyn LoadBalancerService>) -> Self {
        Self::with_config(service, ManagerConfig::default())
    }

    pub fn with_config(service: Arc<dyn LoadBalancerService>, config: ManagerConfig) -> Self {
        Self { service, config }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Create a load balancer with a symmetric TCP listener on `port` and
    /// attach the configured health check. Returns the provider DNS name.
    ///
    /// A [`ManagerError::HealthCheck`] means the load balancer exists but is
    /// unmonitored; it is not rolled back. Retry with
    /// [`configure_health_check`](Self::configure_health_check).
    pub async fn provision(
        &self,
        name: &str,
        subnets: &[String],
        port: u16,
    ) -> Result<String, ManagerError> {
        let name = LoadBalancerName::new(name)?;
        if subnets.is_empty() {
            return Err(ManagerError::InvalidRequest(format!(
                "load balancer '{}' needs at least one subnet",
                name
            )));
        }
        if let Some(blank) = subnets.iter().position(|s| s.trim().is_empty()) {
            return Err(ManagerError::InvalidRequest(format!(
                "subnet #{} for load balancer '{}' is empty",
                blank, name
            )));
        }
        let listener = ListenerSpec::tcp(port)?;
        self.config.health_check.validate()?;

        info!(
            load_balancer = %name,
            subnets = ?subnets,
            port,
            "Creating load balancer"
        );

        let dns_name = self
            .service
            .create_load_balancer(&name, subnets, &[listener])
            .await
            .map_err(|source| ManagerError::Provision {
                name: name.to_string(),
                source,
            })?;

        info!(
            load_balancer = %name,
            health_check = %self.config.health_check.target(),
            "Adding health check"
        );

        if let Err(source) = self
            .service
            .configure_health_check(&name, &self.config.health_check)
            .await
        {
            warn!(
                load_balancer = %name,
                dns_name = %dns_name,
                error = %source,
                "Load balancer created without health check"
            );
            return Err(ManagerError::HealthCheck {
                name: name.to_string(),
                dns_name,
                source,
            });
        }

        info!(load_balancer = %name, dns_name = %dns_name, "Load balancer provisioned");
        Ok(dns_name)
    }

    /// Attach (or replace) the health check on an existing load balancer
    pub async fn configure_health_check(
        &self,
        name: &str,
        health_check: &HealthCheckSpec,
    ) -> Result<(), ManagerError> {
        let name = LoadBalancerName::new(name)?;
        health_check.validate()?;

        info!(
            load_balancer = %name,
            health_check = %health_check.target(),
            "Configuring health check"
        );

        self.service
            .configure_health_check(&name, health_check)
            .await
            .map_err(|e| require_existing(&name, e))
    }

    /// Re-apply the configured default health check, e.g. after a partial provision
    pub async fn restore_health_check(&self, name: &str) -> Result<(), ManagerError> {
        let health_check = self.config.health_check.clone();
        self.configure_health_check(name, &health_check).await
    }

    /// Remove the control-plane listener. Succeeds when it is already gone.
    pub async fn set_private(&self, name: &str) -> Result<(), ManagerError> {
        let name = LoadBalancerName::new(name)?;
        let port = self.config.control_plane_port;

        info!(load_balancer = %name, port, "Removing control-plane listener");

        match self.service.delete_listeners(&name, &[port]).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == FaultKind::ListenerNotFound => {
                debug!(load_balancer = %name, port, "Listener already absent");
                Ok(())
            }
            Err(e) => Err(require_existing(&name, e)),
        }
    }

    /// Add a symmetric TCP listener on `port`, restoring public exposure
    pub async fn set_public(&self, name: &str, port: u16) -> Result<(), ManagerError> {
        let listener = ListenerSpec::tcp(port)?;
        self.add_listener(name, listener).await
    }

    /// Add one listener. An identical listener already present is success; a
    /// different listener on the same frontend port is a conflict.
    pub async fn add_listener(
        &self,
        name: &str,
        listener: ListenerSpec,
    ) -> Result<(), ManagerError> {
        let name = LoadBalancerName::new(name)?;

        info!(load_balancer = %name, listener = %listener, "Adding listener");

        match self.service.create_listeners(&name, &[listener]).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == FaultKind::DuplicateListener => {
                self.resolve_duplicate_listener(&name, listener, e).await
            }
            Err(e) => Err(require_existing(&name, e)),
        }
    }

    /// Compare the listener already bound to the requested frontend port
    async fn resolve_duplicate_listener(
        &self,
        name: &LoadBalancerName,
        requested: ListenerSpec,
        duplicate: ServiceError,
    ) -> Result<(), ManagerError> {
        let description = self
            .service
            .describe_load_balancer(name)
            .await
            .map_err(|e| require_existing(name, e))?;

        match description.listener(requested.frontend_port) {
            Some(existing) if *existing == requested => {
                debug!(load_balancer = %name, listener = %requested, "Listener already present");
                Ok(())
            }
            Some(existing) => Err(ManagerError::ListenerConflict {
                name: name.to_string(),
                existing: *existing,
                requested,
            }),
            // The listener vanished between the two calls; report the original fault
            None => Err(ManagerError::Remote(duplicate)),
        }
    }

    /// Register instances. Existing members and an empty request are no-ops.
    pub async fn add_instances<I, S>(&self, name: &str, instance_ids: I) -> Result<(), ManagerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = LoadBalancerName::new(name)?;
        let instances = collect_instances(instance_ids)?;
        if instances.is_empty() {
            debug!(load_balancer = %name, "No instances to register");
            return Ok(());
        }

        info!(
            load_balancer = %name,
            instances = instances.len(),
            "Registering instances"
        );

        self.service
            .register_instances(&name, &instances)
            .await
            .map_err(|e| require_existing(&name, e))
    }

    /// Deregister instances. Absent members and an empty request are no-ops.
    pub async fn remove_instances<I, S>(
        &self,
        name: &str,
        instance_ids: I,
    ) -> Result<(), ManagerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = LoadBalancerName::new(name)?;
        let instances = collect_instances(instance_ids)?;
        if instances.is_empty() {
            debug!(load_balancer = %name, "No instances to deregister");
            return Ok(());
        }

        info!(
            load_balancer = %name,
            instances = instances.len(),
            "Deregistering instances"
        );

        match self.service.deregister_instances(&name, &instances).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == FaultKind::InstanceNotRegistered => {
                self.deregister_remaining_members(&name, &instances).await
            }
            Err(e) => Err(require_existing(&name, e)),
        }
    }

    /// The provider may reject a request naming any non-member without
    /// removing anything, so retry with the requested ids that are still members
    async fn deregister_remaining_members(
        &self,
        name: &LoadBalancerName,
        requested: &[InstanceRef],
    ) -> Result<(), ManagerError> {
        let description = self
            .service
            .describe_load_balancer(name)
            .await
            .map_err(|e| require_existing(name, e))?;

        let members: Vec<InstanceRef> = requested
            .iter()
            .filter(|i| description.instances.contains(*i))
            .cloned()
            .collect();
        if members.is_empty() {
            debug!(load_balancer = %name, "Instances already deregistered");
            return Ok(());
        }

        warn!(
            load_balancer = %name,
            instances = members.len(),
            "Deregistration rejected for non-members; retrying with current members"
        );

        match self.service.deregister_instances(name, &members).await {
            Ok(()) => Ok(()),
            // Removed concurrently since the describe
            Err(e) if e.kind() == FaultKind::InstanceNotRegistered => Ok(()),
            Err(e) => Err(require_existing(name, e)),
        }
    }

    /// Look a load balancer up by name. Provider not-found is
    /// [`Presence::Absent`]; every other fault is an error.
    pub async fn exists(&self, name: &str) -> Result<Presence, ManagerError> {
        Ok(match self.describe(name).await? {
            Some(description) => Presence::Found {
                dns_name: description.dns_name,
            },
            None => Presence::Absent,
        })
    }

    /// Full provider description, `None` when the provider reports not-found
    pub async fn describe(
        &self,
        name: &str,
    ) -> Result<Option<LoadBalancerDescription>, ManagerError> {
        let name = LoadBalancerName::new(name)?;
        debug!(load_balancer = %name, "Describing load balancer");

        match self.service.describe_load_balancer(&name).await {
            Ok(description) => Ok(Some(description)),
            Err(e) if e.kind() == FaultKind::LoadBalancerNotFound => Ok(None),
            Err(e) => Err(ManagerError::Remote(e)),
        }
    }

    /// Whether the control-plane listener is currently present
    pub async fn visibility(&self, name: &str) -> Result<Visibility, ManagerError> {
        let description = self.require(name).await?;
        Ok(description.visibility(self.config.control_plane_port))
    }

    /// Current membership set
    pub async fn instances(&self, name: &str) -> Result<BTreeSet<InstanceRef>, ManagerError> {
        Ok(self.require(name).await?.instances)
    }

    async fn require(&self, name: &str) -> Result<LoadBalancerDescription, ManagerError> {
        self.describe(name).await?.ok_or_else(|| ManagerError::NotFound {
            name: name.to_string(),
        })
    }
}

/// Surface provider not-found as [`ManagerError::NotFound`] for operations
/// that need the load balancer to exist
fn require_existing(name: &LoadBalancerName, error: ServiceError) -> ManagerError {
    if error.kind() == FaultKind::LoadBalancerNotFound {
        ManagerError::NotFound {
            name: name.to_string(),
        }
    } else {
        ManagerError::Remote(error)
    }
}

/// Validate ids and collapse duplicates, keeping a stable order
fn collect_instances<I, S>(instance_ids: I) -> Result<Vec<InstanceRef>, ManagerError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let set = instance_ids
        .into_iter()
        .map(InstanceRef::new)
        .collect::<Result<BTreeSet<_>, _>>()?;
    Ok(set.into_iter().collect())
}
