use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU64;

/// Remote-service credentials for one tracked account
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Body returned by both `initClient` and `refreshClient`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocateResponse {
    pub server_context: ServerContext,
    #[serde(default)]
    pub content: Vec<Device>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContext {
    #[serde(default)]
    pub auth_token: String,
    #[serde(default)]
    pub prs_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub device_display_name: String,
    pub battery_level: Option<f32>,
    pub battery_status: Option<String>,
    pub location: Option<Location>,
}

/// Missing fields decode as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f32,
    pub horizontal_accuracy: f32,
    pub vertical_accuracy: f32,
}

/// The rotating (session id, auth token) pair.
///
/// Both halves come from the same response and are only ever replaced
/// together. A session id of 0 means "no session yet" and cannot be
/// represented here, so a refresh can never be addressed with it.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionContext {
    person_id: NonZeroU64,
    auth_token: String,
}

impl SessionContext {
    pub fn new(person_id: u64, auth_token: impl Into<String>) -> Result<Self> {
        let person_id = NonZeroU64::new(person_id)
            .ok_or_else(|| Error::InvalidSession("server returned session id 0".to_string()))?;
        let auth_token = auth_token.into();
        if auth_token.is_empty() {
            return Err(Error::InvalidSession(
                "server returned an empty auth token".to_string(),
            ));
        }

        Ok(Self {
            person_id,
            auth_token,
        })
    }

    pub fn person_id(&self) -> u64 {
        self.person_id.get()
    }

    pub fn auth_token(&self) -> &str {
        &self.auth_token
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("person_id", &self.person_id)
            .field("auth_token", &"***")
            .finish()
    }
}

/// Point-in-time location and battery reading of one device
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSnapshot {
    pub name: String,
    pub display_name: String,
    pub battery_level: f32,
    pub battery_status: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f32,
    pub horizontal_accuracy: f32,
    pub vertical_accuracy: f32,
}

impl DeviceSnapshot {
    /// A device without a location fix reports a zeroed position.
    pub fn from_device(device: Device) -> Self {
        let location = device.location.unwrap_or_default();
        Self {
            name: device.name,
            display_name: device.device_display_name,
            battery_level: device.battery_level.unwrap_or_default(),
            battery_status: device.battery_status.unwrap_or_default(),
            latitude: location.latitude,
            longitude: location.longitude,
            altitude: location.altitude,
            horizontal_accuracy: location.horizontal_accuracy,
            vertical_accuracy: location.vertical_accuracy,
        }
    }
}

/// Decoded result of an authenticate or refresh call
#[derive(Debug, Clone)]
pub struct SessionResponse {
    pub context: SessionContext,
    pub devices: Vec<DeviceSnapshot>,
}

impl TryFrom<LocateResponse> for SessionResponse {
    type Error = Error;

    fn try_from(response: LocateResponse) -> Result<Self> {
        let context = SessionContext::new(
            response.server_context.prs_id,
            response.server_context.auth_token,
        )?;
        let devices = response
            .content
            .into_iter()
            .map(DeviceSnapshot::from_device)
            .collect();

        Ok(Self { context, devices })
    }
}
