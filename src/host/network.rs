//! Service address resolution.

use crate::config::HydraConfig;
use crate::error::{HydraError, Result};

use async_trait::async_trait;
use if_addrs::{IfAddr, get_if_addrs};
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use tokio::net::lookup_host;
use tracing::{debug, warn};

/// Decides the address an instance advertises in its presence record.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    async fn resolve(&self, config: &HydraConfig) -> Result<String>;
}

/// One IPv4 address bound to a named host interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceRecord {
    pub name: String,
    pub address: Ipv4Addr,
    pub netmask: Ipv4Addr,
}

impl InterfaceRecord {
    pub fn new(name: impl Into<String>, address: Ipv4Addr, netmask: Ipv4Addr) -> Self {
        Self {
            name: name.into(),
            address,
            netmask,
        }
    }
}

/// A `name/netmask` interface selector such as `eth0/255.255.255.0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceSpec {
    pub name: String,
    pub netmask: Ipv4Addr,
}

impl InterfaceSpec {
    pub fn matches(&self, record: &InterfaceRecord) -> bool {
        record.name == self.name && record.netmask == self.netmask
    }
}

impl FromStr for InterfaceSpec {
    type Err = HydraError;

    fn from_str(raw: &str) -> Result<Self> {
        let invalid =
            || HydraError::Config(format!("serviceInterface {} is not a valid format", raw));

        let segments: Vec<&str> = raw.split('/').collect();
        if segments.len() != 2 || segments[0].is_empty() {
            return Err(invalid());
        }
        let netmask = segments[1].parse::<Ipv4Addr>().map_err(|_| invalid())?;

        Ok(Self {
            name: segments[0].to_string(),
            netmask,
        })
    }
}

/// Resolves the advertised address from configuration, then host interfaces.
///
/// Precedence: `serviceDNS` as-is, then `serviceIP` (a literal is kept, a hostname is looked
/// up), then the `serviceInterface` selector, then the first non-loopback IPv4 interface.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    interfaces: Vec<InterfaceRecord>,
}

impl ConfigResolver {
    /// A resolver over the IPv4 interfaces of this host.
    pub fn new() -> Self {
        Self::with_interfaces(host_interfaces())
    }

    pub fn with_interfaces(interfaces: Vec<InterfaceRecord>) -> Self {
        Self { interfaces }
    }

    pub fn interfaces(&self) -> &[InterfaceRecord] {
        &self.interfaces
    }

    async fn lookup(host: &str) -> Result<String> {
        let mut addrs = lookup_host((host, 0)).await?;
        let found = addrs
            .find(|addr| addr.is_ipv4())
            .ok_or_else(|| HydraError::Config(format!("no IPv4 address found for {}", host)))?;
        Ok(found.ip().to_string())
    }

    fn first_non_loopback(&self) -> Option<Ipv4Addr> {
        self.interfaces
            .iter()
            .map(|record| record.address)
            .find(|address| !address.is_loopback())
    }
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// IPv4 addresses of the host's interfaces, in enumeration order.
pub fn host_interfaces() -> Vec<InterfaceRecord> {
    match get_if_addrs() {
        Ok(interfaces) => interfaces
            .into_iter()
            .filter_map(|iface| match iface.addr {
                IfAddr::V4(v4) => Some(InterfaceRecord::new(iface.name, v4.ip, v4.netmask)),
                IfAddr::V6(_) => None,
            })
            .collect(),
        Err(e) => {
            warn!("Failed to enumerate network interfaces: {}", e);
            Vec::new()
        }
    }
}

#[async_trait]
impl AddressResolver for ConfigResolver {
    async fn resolve(&self, config: &HydraConfig) -> Result<String> {
        if !config.service_dns.is_empty() {
            return Ok(config.service_dns.clone());
        }

        if !config.service_ip.is_empty() {
            if config.service_ip.parse::<IpAddr>().is_ok() {
                return Ok(config.service_ip.clone());
            }
            debug!("Looking up serviceIP host {}", config.service_ip);
            return Self::lookup(&config.service_ip).await;
        }

        if !config.service_interface.is_empty() {
            let spec: InterfaceSpec = config.service_interface.parse()?;
            return self
                .interfaces
                .iter()
                .find(|record| spec.matches(record))
                .map(|record| record.address.to_string())
                .ok_or_else(|| {
                    HydraError::Config(format!(
                        "no IPv4 interface matches {}",
                        config.service_interface
                    ))
                });
        }

        self.first_non_loopback()
            .map(|address| address.to_string())
            .ok_or_else(|| HydraError::Config("no non-loopback IPv4 interface found".to_string()))
    }
}
