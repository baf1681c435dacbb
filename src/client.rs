//! Service client for the Pinpoint events API.
//!
//! This module defines the [`EventsServiceClient`] trait and provides an
//! HTTP implementation that calls the `PutEvents` REST API, signing each
//! request with SigV4.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_sigv4::http_request::{sign, SignableBody, SignableRequest, SigningSettings};
use aws_sigv4::sign::v4;
use aws_smithy_runtime_api::client::identity::Identity;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use crate::endpoint::EndpointProfile;
use crate::error::{AnalyticsError, AwsError};
use crate::event::AnalyticsEvent;

/// Signing name of the Pinpoint service.
const SIGNING_NAME: &str = "mobiletargeting";

/// Trait for communicating with the events service.
///
/// This trait abstracts the communication layer, allowing for different
/// implementations (e.g., HTTP client, mock client for testing).
#[async_trait]
pub trait EventsServiceClient: Send + Sync {
    /// Submits one batch of events bound to one endpoint.
    ///
    /// Returns per-endpoint and per-event results on success. A whole-call
    /// rejection is reported as [`AnalyticsError::Service`]; anything else
    /// (network, unreadable response) as [`AnalyticsError::Transport`].
    async fn put_events(&self, request: PutEventsRequest) -> Result<EventsResponse, AnalyticsError>;
}

/// Shared events client type.
pub type SharedEventsServiceClient = Arc<dyn EventsServiceClient>;

/// One `PutEvents` call: a batch of events plus the endpoint they belong to.
#[derive(Debug, Clone, PartialEq)]
pub struct PutEventsRequest {
    /// Pinpoint application id
    pub application_id: String,
    /// Endpoint id the batch is submitted under
    pub endpoint_id: String,
    /// Endpoint snapshot taken for this batch
    pub endpoint: PublicEndpoint,
    /// Events keyed by their application-defined event id
    pub events: HashMap<String, Event>,
}

impl PutEventsRequest {
    /// Builds a request from an endpoint snapshot and the batch's events.
    ///
    /// Events sharing an event id are sent once, as the first occurrence;
    /// the service reports a single result for that id.
    pub fn new<'a>(
        application_id: impl Into<String>,
        endpoint: &EndpointProfile,
        events: impl IntoIterator<Item = &'a AnalyticsEvent>,
    ) -> Self {
        let mut wire_events = HashMap::new();
        for event in events {
            match wire_events.entry(event.event_id.clone()) {
                Entry::Occupied(_) => tracing::warn!(
                    event_id = %event.event_id,
                    "Event recorded more than once in a batch, sending it once"
                ),
                Entry::Vacant(slot) => {
                    slot.insert(Event::from(event));
                }
            }
        }
        Self {
            application_id: application_id.into(),
            endpoint_id: endpoint.endpoint_id.clone(),
            endpoint: PublicEndpoint::from(endpoint),
            events: wire_events,
        }
    }

    /// Returns the request body sent on the wire.
    pub fn body(&self) -> EventsRequest {
        let mut batch_item = HashMap::with_capacity(1);
        batch_item.insert(
            self.endpoint_id.clone(),
            EventsBatch {
                endpoint: self.endpoint.clone(),
                events: self.events.clone(),
            },
        );
        EventsRequest { batch_item }
    }
}

/// Request body of `PutEvents`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsRequest {
    #[serde(rename = "BatchItem")]
    pub batch_item: HashMap<String, EventsBatch>,
}

/// Events for one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsBatch {
    #[serde(rename = "Endpoint")]
    pub endpoint: PublicEndpoint,
    #[serde(rename = "Events")]
    pub events: HashMap<String, Event>,
}

/// Wire shape of an endpoint snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PublicEndpoint {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub attributes: HashMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub channel_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub demographic: Option<EndpointDemographicWire>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub effective_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub location: Option<EndpointLocationWire>,
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub metrics: HashMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub opt_out: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user: Option<EndpointUserWire>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EndpointDemographicWire {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub app_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub locale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub make: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub model_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub platform_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EndpointLocationWire {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub region: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EndpointUserWire {
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub user_attributes: HashMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user_id: Option<String>,
}

impl From<&EndpointProfile> for PublicEndpoint {
    fn from(profile: &EndpointProfile) -> Self {
        let d = &profile.demographic;
        let l = &profile.location;
        Self {
            address: profile.address.clone(),
            attributes: profile.attributes.clone(),
            channel_type: profile.channel_type.clone(),
            demographic: Some(EndpointDemographicWire {
                app_version: d.app_version.clone(),
                locale: d.locale.clone(),
                make: d.make.clone(),
                model: d.model.clone(),
                model_version: d.model_version.clone(),
                platform: d.platform.clone(),
                platform_version: d.platform_version.clone(),
                timezone: d.timezone.clone(),
            }),
            effective_date: Some(iso8601(profile.effective_date)),
            location: Some(EndpointLocationWire {
                city: l.city.clone(),
                country: l.country.clone(),
                latitude: l.latitude,
                longitude: l.longitude,
                postal_code: l.postal_code.clone(),
                region: l.region.clone(),
            }),
            metrics: profile.metrics.clone(),
            opt_out: Some(profile.opt_out.clone()),
            user: Some(EndpointUserWire {
                user_attributes: profile.user.user_attributes.clone(),
                user_id: profile.user.user_id.clone(),
            }),
        }
    }
}

/// Wire shape of one event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Event {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub app_package_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub app_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub app_version_code: Option<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub attributes: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub client_sdk_version: Option<String>,
    pub event_type: String,
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub metrics: HashMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sdk_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub session: Option<SessionWire>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SessionWire {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub duration: Option<i64>,
    pub id: String,
    pub start_timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub stop_timestamp: Option<String>,
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

impl From<&AnalyticsEvent> for Event {
    fn from(event: &AnalyticsEvent) -> Self {
        Self {
            app_package_name: non_empty(&event.app.package_name),
            app_title: non_empty(&event.app.title),
            app_version_code: non_empty(&event.app.version_code),
            attributes: event.attributes.clone(),
            client_sdk_version: non_empty(&event.sdk.version),
            event_type: event.event_type.clone(),
            metrics: event.metrics.clone(),
            sdk_name: non_empty(&event.sdk.name),
            session: event.session.as_ref().map(|s| SessionWire {
                duration: s.duration,
                id: s.id.clone(),
                start_timestamp: iso8601(s.start_timestamp),
                stop_timestamp: s.stop_timestamp.map(iso8601),
            }),
            timestamp: iso8601(event.timestamp),
        }
    }
}

/// Formats epoch milliseconds as ISO-8601 with millisecond precision.
pub(crate) fn iso8601(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

/// Response of `PutEvents`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventsResponse {
    /// Results keyed by endpoint id
    #[serde(rename = "Results", default)]
    pub results: HashMap<String, ItemResponse>,
}

impl EventsResponse {
    /// Returns the results for one endpoint.
    pub fn for_endpoint(&self, endpoint_id: &str) -> Option<&ItemResponse> {
        self.results.get(endpoint_id)
    }
}

/// Results for one endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemResponse {
    #[serde(rename = "EndpointItemResponse", skip_serializing_if = "Option::is_none", default)]
    pub endpoint_item_response: Option<EndpointItemResponse>,
    #[serde(rename = "EventsItemResponse", default)]
    pub events_item_response: HashMap<String, EventItemResponse>,
}

/// Endpoint-level outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EndpointItemResponse {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status_code: i32,
}

/// Event-level outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EventItemResponse {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status_code: i32,
}

impl EventItemResponse {
    /// Creates an event-level outcome.
    pub fn new(status_code: i32, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code,
        }
    }

    /// Creates an `Accepted` outcome.
    pub fn accepted() -> Self {
        Self::new(202, "Accepted")
    }
}

/// Configuration for the HTTP events client.
#[derive(Debug, Clone)]
pub struct PinpointClientConfig {
    /// AWS region of the Pinpoint service
    pub region: String,
    /// Optional custom endpoint URL (for testing)
    pub endpoint_url: Option<String>,
}

impl Default for PinpointClientConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            endpoint_url: None,
        }
    }
}

impl PinpointClientConfig {
    /// Creates a new PinpointClientConfig with the specified region.
    pub fn with_region(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            endpoint_url: None,
        }
    }

    /// Creates a new PinpointClientConfig from AWS SDK config.
    pub fn from_aws_config(config: &aws_config::SdkConfig) -> Self {
        Self {
            region: config
                .region()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "us-east-1".to_string()),
            endpoint_url: None,
        }
    }
}

/// HTTP implementation of [`EventsServiceClient`].
pub struct PinpointEventsClient {
    /// HTTP client for making requests
    http_client: reqwest::Client,
    /// AWS credentials provider
    credentials_provider: SharedCredentialsProvider,
    /// Configuration for the client
    config: PinpointClientConfig,
}

impl PinpointEventsClient {
    /// Creates a client from the default AWS configuration chain.
    pub async fn from_env() -> Result<Self, AnalyticsError> {
        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;
        Self::from_aws_config(&aws_config)
    }

    /// Creates a client from AWS SDK config.
    pub fn from_aws_config(aws_config: &aws_config::SdkConfig) -> Result<Self, AnalyticsError> {
        let credentials_provider = aws_config
            .credentials_provider()
            .ok_or_else(|| AnalyticsError::validation("No credentials provider configured"))?;

        Ok(Self {
            http_client: reqwest::Client::new(),
            credentials_provider,
            config: PinpointClientConfig::from_aws_config(aws_config),
        })
    }

    /// Creates a client with custom configuration.
    pub fn with_config(
        credentials_provider: SharedCredentialsProvider,
        config: PinpointClientConfig,
    ) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            credentials_provider,
            config,
        }
    }

    /// Returns the Pinpoint service endpoint URL.
    fn endpoint_url(&self) -> String {
        self.config
            .endpoint_url
            .clone()
            .unwrap_or_else(|| format!("https://pinpoint.{}.amazonaws.com", self.config.region))
    }

    /// Signs an HTTP request using AWS SigV4 and returns the signed headers.
    async fn sign_request(
        &self,
        method: &str,
        uri: &str,
        body: &[u8],
    ) -> Result<Vec<(String, String)>, AnalyticsError> {
        let credentials = self
            .credentials_provider
            .provide_credentials()
            .await
            .map_err(|e| AnalyticsError::transport(format!("Failed to get AWS credentials: {}", e)))?;

        let identity: Identity = credentials.into();
        let signing_params = v4::SigningParams::builder()
            .identity(&identity)
            .region(&self.config.region)
            .name(SIGNING_NAME)
            .time(SystemTime::now())
            .settings(SigningSettings::default())
            .build()
            .map_err(|e| AnalyticsError::validation(format!("Failed to build signing params: {}", e)))?;

        let signable_request = SignableRequest::new(
            method,
            uri,
            std::iter::empty::<(&str, &str)>(),
            SignableBody::Bytes(body),
        )
        .map_err(|e| AnalyticsError::validation(format!("Failed to create signable request: {}", e)))?;

        let (signing_instructions, _signature) = sign(signable_request, &signing_params.into())
            .map_err(|e| AnalyticsError::validation(format!("Failed to sign request: {}", e)))?
            .into_parts();

        // Apply the instructions to a throwaway request to read the headers back.
        let mut temp_request = http::Request::builder()
            .method(method)
            .uri(uri)
            .body(())
            .map_err(|e| AnalyticsError::validation(format!("Failed to build temp request: {}", e)))?;

        signing_instructions.apply_to_request_http1x(&mut temp_request);

        Ok(temp_request
            .headers()
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_str().unwrap_or("").to_string()))
            .collect())
    }
}

#[async_trait]
impl EventsServiceClient for PinpointEventsClient {
    async fn put_events(&self, request: PutEventsRequest) -> Result<EventsResponse, AnalyticsError> {
        let body = serde_json::to_vec(&request.body()).map_err(|e| {
            AnalyticsError::serdes(format!("Failed to serialize events request: {}", e))
        })?;

        let uri = format!(
            "{}/v1/apps/{}/events",
            self.endpoint_url(),
            urlencoding::encode(&request.application_id)
        );

        let signed_headers = self.sign_request("POST", &uri, &body).await?;

        let mut http_request = self
            .http_client
            .post(&uri)
            .header("Content-Type", "application/json")
            .body(body);

        for (name, value) in signed_headers {
            http_request = http_request.header(&name, &value);
        }

        let response = http_request
            .send()
            .await
            .map_err(|e| AnalyticsError::transport(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let error_type = header_str(response.headers(), "x-amzn-ErrorType");
        let request_id = header_str(response.headers(), "x-amzn-RequestId");

        let response_body = response
            .bytes()
            .await
            .map_err(|e| AnalyticsError::transport(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(parse_service_error(
                status.as_u16(),
                error_type.as_deref(),
                request_id,
                &response_body,
            ));
        }

        serde_json::from_slice(&response_body).map_err(|e| {
            AnalyticsError::transport(format!("Failed to deserialize events response: {}", e))
        })
    }
}

fn header_str(headers: &reqwest::header::HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(rename = "__type", default)]
    error_type: Option<String>,
    #[serde(rename = "Message", alias = "message", default)]
    message: Option<String>,
    #[serde(rename = "RequestID", alias = "RequestId", default)]
    request_id: Option<String>,
}

/// Builds a classified service error from a non-2xx response.
///
/// The error code comes from the `x-amzn-ErrorType` header, then the body's
/// `__type`, then the HTTP status.
pub(crate) fn parse_service_error(
    status: u16,
    error_type_header: Option<&str>,
    request_id: Option<String>,
    body: &[u8],
) -> AnalyticsError {
    let parsed: ErrorBody = serde_json::from_slice(body).unwrap_or_default();

    let code = error_type_header
        .map(strip_error_type)
        .filter(|c| !c.is_empty())
        .or_else(|| parsed.error_type.as_deref().map(strip_error_type))
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| code_for_status(status).to_string());

    let message = parsed
        .message
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned());

    AnalyticsError::Service {
        message: format!("PutEvents returned {} {}: {}", status, code, message),
        status_code: status,
        aws_error: AwsError {
            code,
            message,
            request_id: request_id.or(parsed.request_id),
        },
    }
}

/// `BadRequestException:http://...` and `aws.protocol#BadRequestException` both yield the bare code.
fn strip_error_type(raw: &str) -> &str {
    let raw = raw.split(':').next().unwrap_or(raw);
    raw.rsplit('#').next().unwrap_or(raw).trim()
}

fn code_for_status(status: u16) -> &'static str {
    match status {
        400 => "BadRequestException",
        403 => "ForbiddenException",
        404 => "NotFoundException",
        429 => "TooManyRequestsException",
        500..=599 => "InternalServerErrorException",
        _ => "UnknownServiceError",
    }
}
