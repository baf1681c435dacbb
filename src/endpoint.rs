//! Endpoint profile snapshots and the targeting provider seam.
//!
//! Every submitted batch carries exactly one [`EndpointProfile`], taken
//! fresh from a [`TargetingProvider`] at the start of the submission cycle.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

/// Opt-out value meaning the endpoint receives nothing.
pub const OPT_OUT_ALL: &str = "ALL";

/// Opt-out value meaning the endpoint receives everything.
pub const OPT_OUT_NONE: &str = "NONE";

/// Device and application demographics of an endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointDemographic {
    pub app_version: Option<String>,
    pub locale: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub model_version: Option<String>,
    pub platform: Option<String>,
    pub platform_version: Option<String>,
    pub timezone: Option<String>,
}

/// Coarse location of an endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointLocation {
    pub city: Option<String>,
    pub country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub postal_code: Option<String>,
    pub region: Option<String>,
}

/// User associated with an endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointUser {
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_attributes: HashMap<String, Vec<String>>,
}

/// Point-in-time description of the destination a batch is bound to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointProfile {
    /// Endpoint identifier the batch is submitted under
    pub endpoint_id: String,
    /// Delivery channel, e.g. `GCM` or `APNS`
    pub channel_type: Option<String>,
    /// Channel address, e.g. a push token
    pub address: Option<String>,
    #[serde(default)]
    pub demographic: EndpointDemographic,
    #[serde(default)]
    pub location: EndpointLocation,
    /// Multi-valued custom attributes
    #[serde(default)]
    pub attributes: HashMap<String, Vec<String>>,
    /// Custom metrics
    #[serde(default)]
    pub metrics: HashMap<String, f64>,
    #[serde(default)]
    pub user: EndpointUser,
    /// `ALL` or `NONE`
    pub opt_out: String,
    /// When this profile took effect, milliseconds since the Unix epoch
    pub effective_date: i64,
}

impl EndpointProfile {
    /// Creates a profile for `endpoint_id`, opted in, effective now.
    pub fn new(endpoint_id: impl Into<String>) -> Self {
        Self {
            endpoint_id: endpoint_id.into(),
            channel_type: None,
            address: None,
            demographic: EndpointDemographic::default(),
            location: EndpointLocation::default(),
            attributes: HashMap::new(),
            metrics: HashMap::new(),
            user: EndpointUser::default(),
            opt_out: OPT_OUT_NONE.to_string(),
            effective_date: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Sets the channel type and address.
    pub fn with_channel(mut self, channel_type: impl Into<String>, address: impl Into<String>) -> Self {
        self.channel_type = Some(channel_type.into());
        self.address = Some(address.into());
        self
    }

    /// Sets the user id.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user.user_id = Some(user_id.into());
        self
    }

    /// Returns true if the endpoint opted out of everything.
    pub fn is_opted_out(&self) -> bool {
        self.opt_out.eq_ignore_ascii_case(OPT_OUT_ALL)
    }
}

/// Supplies the current endpoint profile.
///
/// Consulted once per submission cycle and never cached across cycles.
pub trait TargetingProvider: Send + Sync {
    /// Returns the current endpoint snapshot, if one is available.
    fn current_endpoint(&self) -> Option<EndpointProfile>;
}

/// Shared targeting provider type.
pub type SharedTargetingProvider = Arc<dyn TargetingProvider>;

/// A thread-safe endpoint holder the application updates in place.
///
/// ```rust
/// use aws_pinpoint_analytics::{EndpointProfile, SharedTargeting, TargetingProvider};
///
/// let targeting = SharedTargeting::new(Some(EndpointProfile::new("endpoint-1")));
/// targeting.update(|profile| profile.opt_out = "ALL".to_string());
/// assert!(targeting.current_endpoint().unwrap().is_opted_out());
/// ```
#[derive(Debug, Default)]
pub struct SharedTargeting {
    profile: RwLock<Option<EndpointProfile>>,
}

impl SharedTargeting {
    /// Creates a holder with an initial profile.
    pub fn new(profile: Option<EndpointProfile>) -> Self {
        Self {
            profile: RwLock::new(profile),
        }
    }

    /// Replaces the profile.
    pub fn set(&self, profile: Option<EndpointProfile>) {
        match self.profile.write() {
            Ok(mut guard) => *guard = profile,
            Err(poisoned) => *poisoned.into_inner() = profile,
        }
    }

    /// Mutates the profile in place if one is present.
    pub fn update(&self, f: impl FnOnce(&mut EndpointProfile)) {
        let mut guard = match self.profile.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(profile) = guard.as_mut() {
            f(profile);
        }
    }
}

impl TargetingProvider for SharedTargeting {
    fn current_endpoint(&self) -> Option<EndpointProfile> {
        match self.profile.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
