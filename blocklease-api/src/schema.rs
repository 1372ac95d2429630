//! Request and response types of the IPAM driver protocol.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Option key naming the kind of address requested.
pub const REQUEST_ADDRESS_TYPE: &str = "RequestAddressType";

/// Value of [`REQUEST_ADDRESS_TYPE`] for a network gateway.
pub const GATEWAY_ADDRESS_TYPE: &str = "com.docker.network.gateway";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CapabilitiesResponse {
    #[serde(rename = "RequiresMACAddress")]
    pub requires_mac_address: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AddressSpacesResponse {
    #[serde(default)]
    pub local_default_address_space: String,
    #[serde(default)]
    pub global_default_address_space: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestPoolRequest {
    #[serde(default)]
    pub address_space: String,
    #[serde(default)]
    pub pool: String,
    #[serde(default)]
    pub sub_pool: String,
    #[serde(default)]
    pub options: HashMap<String, String>,
    #[serde(rename = "V6", default)]
    pub v6: bool,
}

impl RequestPoolRequest {
    pub fn family_version(&self) -> u8 {
        if self.v6 {
            6
        } else {
            4
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestPoolResponse {
    #[serde(rename = "PoolID")]
    pub pool_id: String,
    /// Leased block in CIDR notation.
    pub pool: String,
    #[serde(default)]
    pub data: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleasePoolRequest {
    #[serde(rename = "PoolID")]
    pub pool_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestAddressRequest {
    #[serde(rename = "PoolID")]
    pub pool_id: String,
    /// Preferred address. Ignored; the block decides.
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl RequestAddressRequest {
    pub fn is_gateway(&self) -> bool {
        self.options
            .get(REQUEST_ADDRESS_TYPE)
            .is_some_and(|t| t == GATEWAY_ADDRESS_TYPE)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestAddressResponse {
    /// Address with prefix length, e.g. `10.0.0.1/24`.
    pub address: String,
    #[serde(default)]
    pub data: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReleaseAddressRequest {
    #[serde(rename = "PoolID")]
    pub pool_id: String,
    pub address: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_protocol_field_names() {
        let req: RequestPoolRequest =
            serde_yaml::from_str("{AddressSpace: local, V6: true}").unwrap();
        assert!(req.v6);
        assert_eq!(req.family_version(), 6);

        let req: ReleaseAddressRequest =
            serde_yaml::from_str("{PoolID: abc, Address: 10.0.0.7}").unwrap();
        assert_eq!(req.pool_id, "abc");
        assert_eq!(req.address, "10.0.0.7");
    }

    #[test]
    fn recognises_gateway_requests() {
        let mut req = RequestAddressRequest {
            pool_id: "abc".into(),
            ..Default::default()
        };
        assert!(!req.is_gateway());
        req.options
            .insert(REQUEST_ADDRESS_TYPE.into(), GATEWAY_ADDRESS_TYPE.into());
        assert!(req.is_gateway());
    }
}
