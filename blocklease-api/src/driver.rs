//! ## blocklease-api::driver
//! **IPAM driver contract and its allocator-backed implementation**

use std::collections::HashMap;
use std::sync::Arc;

use blocklease_core::{BlockAllocator, Family, LeaseError};
use blocklease_telemetry::MetricsRecorder;
use tracing::{debug, instrument, warn};

use crate::schema::*;

/// Operations a protocol adapter forwards to the lease engine.
///
/// Every call completes synchronously; errors go straight back to the adapter.
pub trait IpamDriver: Send + Sync {
    fn capabilities(&self) -> CapabilitiesResponse {
        CapabilitiesResponse {
            requires_mac_address: true,
        }
    }

    fn default_address_spaces(&self) -> AddressSpacesResponse {
        AddressSpacesResponse::default()
    }

    fn request_pool(&self, request: &RequestPoolRequest) -> Result<RequestPoolResponse, LeaseError>;

    fn release_pool(&self, request: &ReleasePoolRequest) -> Result<(), LeaseError>;

    fn request_address(
        &self,
        request: &RequestAddressRequest,
    ) -> Result<RequestAddressResponse, LeaseError>;

    fn release_address(&self, request: &ReleaseAddressRequest) -> Result<(), LeaseError>;
}

/// [`IpamDriver`] over a shared [`BlockAllocator`].
#[derive(Debug, Clone)]
pub struct LeaseDriver {
    allocator: Arc<BlockAllocator>,
    metrics: Option<MetricsRecorder>,
}

impl LeaseDriver {
    pub fn new(allocator: Arc<BlockAllocator>) -> Self {
        Self {
            allocator,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsRecorder) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn allocator(&self) -> &Arc<BlockAllocator> {
        &self.allocator
    }

    fn observe<T>(
        &self,
        operation: &str,
        result: Result<T, LeaseError>,
        on_success: impl FnOnce(&MetricsRecorder, &T),
    ) -> Result<T, LeaseError> {
        match &result {
            Ok(value) => {
                if let Some(m) = &self.metrics {
                    on_success(m, value);
                }
            }
            Err(e) => {
                warn!(operation, "Request rejected: {e}");
                if let Some(m) = &self.metrics {
                    m.inc_failures(operation);
                }
            }
        }
        result
    }
}

impl IpamDriver for LeaseDriver {
    #[instrument(skip(self), level = "debug")]
    fn request_pool(&self, request: &RequestPoolRequest) -> Result<RequestPoolResponse, LeaseError> {
        let result = self.allocator.get_block(request.family_version());
        let lease = self.observe("request_pool", result, |m, lease| {
            m.inc_block_leases(Family::of(&lease.cidr.ip()))
        })?;
        debug!(pool_id = %lease.id, pool = %lease.cidr, "RequestPool served");
        Ok(RequestPoolResponse {
            pool_id: lease.id.to_string(),
            pool: lease.cidr.to_string(),
            data: HashMap::new(),
        })
    }

    #[instrument(skip(self), level = "debug")]
    fn release_pool(&self, request: &ReleasePoolRequest) -> Result<(), LeaseError> {
        let result = self.allocator.return_block(&request.pool_id);
        self.observe("release_pool", result, |m, _| m.inc_block_returns())
    }

    #[instrument(skip(self), level = "debug")]
    fn request_address(
        &self,
        request: &RequestAddressRequest,
    ) -> Result<RequestAddressResponse, LeaseError> {
        if request.is_gateway() {
            debug!(pool_id = %request.pool_id, "Gateway address requested");
        }
        let result = self.allocator.get_address(&request.pool_id);
        let lease = self.observe("request_address", result, |m, _| m.inc_address_leases())?;
        Ok(RequestAddressResponse {
            address: lease.to_string(),
            data: HashMap::new(),
        })
    }

    #[instrument(skip(self), level = "debug")]
    fn release_address(&self, request: &ReleaseAddressRequest) -> Result<(), LeaseError> {
        let result = self
            .allocator
            .return_address(&request.pool_id, &request.address);
        self.observe("release_address", result, |m, _| m.inc_address_returns())
    }
}
