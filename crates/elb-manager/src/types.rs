use crate::error::ManagerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Port the clustered control-plane API listens on
pub const CONTROL_PLANE_PORT: u16 = 6443;

/// Listener and health check protocols understood by a classic load balancer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Tcp,
    Ssl,
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Ssl => "SSL",
            Protocol::Http => "HTTP",
            Protocol::Https => "HTTPS",
        }
    }

    /// Whether a health check target for this protocol carries a request path
    pub fn takes_path(&self) -> bool {
        matches!(self, Protocol::Http | Protocol::Https)
    }
}

impl Default for Protocol {
    fn default() -> Self {
        Self::Tcp
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ManagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TCP" => Ok(Protocol::Tcp),
            "SSL" => Ok(Protocol::Ssl),
            "HTTP" => Ok(Protocol::Http),
            "HTTPS" => Ok(Protocol::Https),
            other => Err(ManagerError::InvalidRequest(format!(
                "unsupported protocol '{}'",
                other
            ))),
        }
    }
}

/// Name of a load balancer, unique within the provider account
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoadBalancerName(String);

impl LoadBalancerName {
    pub const MAX_LEN: usize = 32;

    /// Validate a caller-supplied name against the classic naming rules:
    /// 1-32 ASCII alphanumerics or hyphens, not starting or ending with a hyphen.
    pub fn new(name: impl Into<String>) -> Result<Self, ManagerError> {
        let name = name.into();

        if name.is_empty() {
            return Err(ManagerError::InvalidRequest(
                "load balancer name must not be empty".to_string(),
            ));
        }
        if name.len() > Self::MAX_LEN {
            return Err(ManagerError::InvalidRequest(format!(
                "load balancer name '{}' exceeds {} characters",
                name,
                Self::MAX_LEN
            )));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(ManagerError::InvalidRequest(format!(
                "load balancer name '{}' may only contain alphanumerics and hyphens",
                name
            )));
        }
        if name.starts_with('-') || name.ends_with('-') {
            return Err(ManagerError::InvalidRequest(format!(
                "load balancer name '{}' must not begin or end with a hyphen",
                name
            )));
        }

        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LoadBalancerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LoadBalancerName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Opaque backend instance identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceRef(String);

impl InstanceRef {
    pub fn new(id: impl Into<String>) -> Result<Self, ManagerError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ManagerError::InvalidRequest(
                "instance id must not be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One traffic-forwarding rule: frontend port/protocol to backend port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListenerSpec {
    pub frontend_port: u16,
    pub backend_port: u16,
    pub protocol: Protocol,
}

impl ListenerSpec {
    pub fn new(
        frontend_port: u16,
        backend_port: u16,
        protocol: Protocol,
    ) -> Result<Self, ManagerError> {
        if frontend_port == 0 || backend_port == 0 {
            return Err(ManagerError::InvalidRequest(format!(
                "listener ports must be between 1 and 65535 (got {} -> {})",
                frontend_port, backend_port
            )));
        }

        Ok(Self {
            frontend_port,
            backend_port,
            protocol,
        })
    }

    /// Symmetric `port -> port` TCP rule
    pub fn tcp(port: u16) -> Result<Self, ManagerError> {
        Self::new(port, port, Protocol::Tcp)
    }
}

impl fmt::Display for ListenerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} -> {}/{}",
            self.frontend_port, self.protocol, self.backend_port, self.protocol
        )
    }
}

/// Health probe configuration attached to a load balancer (last write wins)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckSpec {
    pub protocol: Protocol,
    pub path: String,
    pub port: u16,
    pub interval_secs: u32,
    pub timeout_secs: u32,
    pub healthy_threshold: u32,
    pub unhealthy_threshold: u32,
}

impl HealthCheckSpec {
    /// Provider target string, e.g. `HTTP:6443/` or `TCP:22`
    pub fn target(&self) -> String {
        if self.protocol.takes_path() {
            format!("{}:{}{}", self.protocol, self.port, self.path)
        } else {
            format!("{}:{}", self.protocol, self.port)
        }
    }

    pub fn validate(&self) -> Result<(), ManagerError> {
        if self.port == 0 {
            return Err(ManagerError::InvalidRequest(
                "health check port must be between 1 and 65535".to_string(),
            ));
        }
        if !(5..=300).contains(&self.interval_secs) {
            return Err(ManagerError::InvalidRequest(format!(
                "health check interval must be 5-300 seconds (got {})",
                self.interval_secs
            )));
        }
        if !(2..=60).contains(&self.timeout_secs) || self.timeout_secs >= self.interval_secs {
            return Err(ManagerError::InvalidRequest(format!(
                "health check timeout must be 2-60 seconds and below the interval (got {})",
                self.timeout_secs
            )));
        }
        for (label, value) in [
            ("healthy", self.healthy_threshold),
            ("unhealthy", self.unhealthy_threshold),
        ] {
            if !(2..=10).contains(&value) {
                return Err(ManagerError::InvalidRequest(format!(
                    "{} threshold must be 2-10 (got {})",
                    label, value
                )));
            }
        }
        if self.protocol.takes_path() && !self.path.starts_with('/') {
            return Err(ManagerError::InvalidRequest(format!(
                "health check path '{}' must start with '/'",
                self.path
            )));
        }
        Ok(())
    }
}

impl Default for HealthCheckSpec {
    fn default() -> Self {
        Self {
            protocol: Protocol::Http,
            path: "/".to_string(),
            port: CONTROL_PLANE_PORT,
            interval_secs: 30,
            timeout_secs: 3,
            healthy_threshold: 2,
            unhealthy_threshold: 2,
        }
    }
}

/// Exposure of the control-plane API through a load balancer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Public => f.write_str("public"),
            Visibility::Private => f.write_str("private"),
        }
    }
}

/// Provider view of a single load balancer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadBalancerDescription {
    pub name: LoadBalancerName,
    pub dns_name: String,
    pub subnets: Vec<String>,
    /// Sorted by frontend port
    pub listeners: Vec<ListenerSpec>,
    #[serde(default)]
    pub instances: BTreeSet<InstanceRef>,
    #[serde(default)]
    pub health_check: Option<HealthCheckSpec>,
    pub created_at: DateTime<Utc>,
}

impl LoadBalancerDescription {
    /// Listener bound to a frontend port, if any
    pub fn listener(&self, frontend_port: u16) -> Option<&ListenerSpec> {
        self.listeners
            .iter()
            .find(|l| l.frontend_port == frontend_port)
    }

    pub fn visibility(&self, control_plane_port: u16) -> Visibility {
        if self.listener(control_plane_port).is_some() {
            Visibility::Public
        } else {
            Visibility::Private
        }
    }
}

/// Outcome of an existence lookup. Absence is a result, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Presence {
    Found { dns_name: String },
    Absent,
}

impl Presence {
    pub fn is_found(&self) -> bool {
        matches!(self, Presence::Found { .. })
    }

    /// DNS name of the load balancer, empty when absent
    pub fn dns_name(&self) -> &str {
        match self {
            Presence::Found { dns_name } => dns_name,
            Presence::Absent => "",
        }
    }
}
