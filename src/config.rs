//! Configuration schema (§6 "External interfaces"). Plain `serde` records,
//! deriving `Serialize`/`Deserialize` on wire/config types rather than
//! hand-rolling parsers.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// `{address, port}` or `{fd}`; `address = "*"` binds all interfaces (§6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct InterfaceAddress {
    pub address: Option<String>,
    pub port: Option<u16>,
    pub fd: Option<i32>,
}

impl InterfaceAddress {
    pub fn for_address(address: impl Into<String>, port: u16) -> Self {
        Self { address: Some(address.into()), port: Some(port), fd: None }
    }

    pub fn for_fd(fd: i32) -> Self {
        Self { address: None, port: None, fd: Some(fd) }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let has_addr = self.address.is_some() && self.port.is_some();
        let has_fd = self.fd.is_some();
        if has_addr == has_fd {
            // Either both present (ambiguous) or neither (underspecified).
            return Err(ConfigError::InterfaceAmbiguous);
        }
        Ok(())
    }

    pub fn binds_all_interfaces(&self) -> bool {
        self.address.as_deref() == Some("*")
    }

    /// Interface equality per §9's open question: `{fd:N}` is equal only to
    /// itself, never to an address-form interface with the same bits.
    pub fn same_interface(&self, other: &InterfaceAddress) -> bool {
        match (self.fd, other.fd) {
            (Some(a), Some(b)) => a == b,
            (Some(_), None) | (None, Some(_)) => false,
            (None, None) => self.address == other.address && self.port == other.port,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
    Http2,
}

impl Protocol {
    pub fn is_tls(&self) -> bool {
        matches!(self, Protocol::Https | Protocol::Http2)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointServices {
    #[serde(rename = "accessLog")]
    pub access_log: Option<String>,
    #[serde(rename = "connectionRateLimiter")]
    pub connection_rate_limiter: Option<String>,
    #[serde(rename = "dataRateLimiter")]
    pub data_rate_limiter: Option<String>,
}

/// Frozen per-endpoint configuration record (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub interface: InterfaceAddress,
    pub protocol: Protocol,
    #[serde(default)]
    pub hostnames: Vec<String>,
    pub application: String,
    #[serde(default)]
    pub services: EndpointServices,
}

impl EndpointConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.interface.validate()?;
        if self.protocol.is_tls() && self.hostnames.is_empty() {
            return Err(ConfigError::MissingHostnames(format!("{:?}", self.protocol)));
        }
        Ok(())
    }
}

/// `{hostnames, certificate?, privateKey?, selfSigned?}` (§6 "Host record").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostRecord {
    pub hostnames: Vec<String>,
    pub certificate: Option<String>,
    #[serde(rename = "privateKey")]
    pub private_key: Option<String>,
    #[serde(rename = "selfSigned", default)]
    pub self_signed: bool,
}

impl HostRecord {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.self_signed && (self.certificate.is_some() || self.private_key.is_some()) {
            return Err(ConfigError::HostRecordConflict);
        }
        Ok(())
    }
}

/// Identified by `class` (type tag) and `name`; remaining fields are
/// class-specific and left to the concrete application/service (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassedRecord {
    pub class: String,
    pub name: String,
    #[serde(flatten)]
    pub fields: serde_json::Value,
}
