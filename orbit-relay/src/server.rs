//! Main OrbitRelay service.
//!
//! OrbitRelay owns the shared state every connection task works against:
//! the connection directory, the device registry, the presence channels and
//! the bandwidth limiter, plus the identity and plan collaborators.

use crate::config::Config;
use crate::directory::ConnectionDirectory;
use crate::identity::{HeaderIdentity, IdentityProvider};
use crate::limits::BandwidthLimiter;
use crate::plans::{ConfigPlans, PlanLookup};
use crate::presence::PresenceHub;
use crate::registry::DeviceRegistry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Operational metrics for monitoring relay activity.
///
/// Counters are monotonically increasing (reset only on restart), except
/// `connections_active` which is a gauge.
/// Thread-safe via `AtomicU64`, no locks needed for incrementing.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Total connections accepted.
    pub connections_total: AtomicU64,
    /// Connections currently open.
    pub connections_active: AtomicU64,
    /// Total successful REGISTER messages.
    pub registrations_total: AtomicU64,
    /// Total handshake messages forwarded to a target.
    pub control_forwarded_total: AtomicU64,
    /// Total handshake messages answered with "Target device offline".
    pub target_offline_total: AtomicU64,
    /// Total unparsable or incomplete control messages.
    pub malformed_total: AtomicU64,
    /// Total control messages of an unrecognised type.
    pub unknown_total: AtomicU64,
    /// Total binary frames delivered to a target queue.
    pub frames_forwarded_total: AtomicU64,
    /// Total payload bytes delivered to a target queue.
    pub bytes_relayed: AtomicU64,
    /// Total binary frames dropped (no route, target offline).
    pub frames_dropped_total: AtomicU64,
    /// Total binary frames that went through a rate bucket.
    pub frames_throttled_total: AtomicU64,
}

impl RelayMetrics {
    /// Increment a counter by one.
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Main relay service.
pub struct OrbitRelay {
    config: Config,
    directory: ConnectionDirectory,
    registry: DeviceRegistry,
    presence: Arc<PresenceHub>,
    limiter: BandwidthLimiter,
    plans: Arc<dyn PlanLookup>,
    identity: Arc<dyn IdentityProvider>,
    metrics: RelayMetrics,
}

impl std::fmt::Debug for OrbitRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrbitRelay")
            .field("config", &self.config)
            .field("directory", &self.directory.len())
            .field("registry", &self.registry)
            .field("limiter", &self.limiter)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl OrbitRelay {
    /// Create a relay whose plans and identity come from the config file.
    pub fn new(config: Config) -> Self {
        let plans = Arc::new(ConfigPlans::new(&config.plans));
        let identity = Arc::new(HeaderIdentity::new(&config.auth));
        Self::with_collaborators(config, plans, identity)
    }

    /// Create a relay with externally supplied plan lookup and identity provider.
    pub fn with_collaborators(
        config: Config,
        plans: Arc<dyn PlanLookup>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let presence = Arc::new(PresenceHub::new());
        Self {
            config,
            directory: ConnectionDirectory::new(),
            registry: DeviceRegistry::new(presence.clone()),
            presence,
            limiter: BandwidthLimiter::new(),
            plans,
            identity,
            metrics: RelayMetrics::default(),
        }
    }

    /// Get the relay configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Device id → connection routing table.
    pub fn directory(&self) -> &ConnectionDirectory {
        &self.directory
    }

    /// Online devices per account.
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Per-account presence channels.
    pub fn presence(&self) -> &PresenceHub {
        &self.presence
    }

    /// Per-account bandwidth buckets.
    pub fn limiter(&self) -> &BandwidthLimiter {
        &self.limiter
    }

    /// Plan lookup collaborator.
    pub fn plans(&self) -> &dyn PlanLookup {
        self.plans.as_ref()
    }

    /// Identity collaborator.
    pub fn identity(&self) -> &dyn IdentityProvider {
        self.identity.as_ref()
    }

    /// Get access to the operational metrics.
    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// Connections currently open.
    pub fn active_connections(&self) -> u64 {
        self.metrics.connections_active.load(Ordering::Relaxed)
    }
}
