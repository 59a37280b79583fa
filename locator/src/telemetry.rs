use crate::errors::Result;
use crate::model::DeviceSnapshot;
use crate::mqtt::Publisher;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

pub const LOCATION_TYPE: &str = "location";

/// Broker payload for one device position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationMessage {
    #[serde(rename = "_type")]
    pub kind: String,
    /// Unix seconds
    pub tst: i64,
    pub name: String,
    pub vac: f32,
    pub acc: f32,
    pub lat: f64,
    pub lon: f64,
    pub alt: f32,
    /// Battery percentage, 0 to 100
    pub batt: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    pub topic: String,
    pub battery_status: String,
    pub message: LocationMessage,
}

impl TelemetryRecord {
    pub fn from_snapshot(prefix: &str, account: &str, snapshot: &DeviceSnapshot, tst: i64) -> Self {
        Self {
            topic: destination_key(prefix, account, &snapshot.display_name),
            battery_status: snapshot.battery_status.clone(),
            message: LocationMessage {
                kind: LOCATION_TYPE.to_string(),
                tst,
                name: snapshot.name.clone(),
                vac: snapshot.vertical_accuracy,
                acc: snapshot.horizontal_accuracy,
                lat: snapshot.latitude,
                lon: snapshot.longitude,
                alt: snapshot.altitude,
                batt: snapshot.battery_level * 100.0,
            },
        }
    }

    pub fn payload(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.message)?)
    }
}

/// `{prefix}/{account}/{display name}` with `-` removed from the display
/// name. MQTT wildcards and level separators are removed too, so a device
/// name can never address more than one topic level.
pub fn destination_key(prefix: &str, account: &str, display_name: &str) -> String {
    let device: String = display_name
        .chars()
        .filter(|c| !matches!(c, '-' | '/' | '+' | '#'))
        .collect();
    format!("{}/{}/{}", prefix, account, device)
}

/// Publishes one record per snapshot and returns how many were handed over.
pub async fn track(
    publisher: &dyn Publisher,
    prefix: &str,
    account: &str,
    devices: &[DeviceSnapshot],
) -> usize {
    let tst = Utc::now().timestamp();
    let mut published = 0;

    for snapshot in devices {
        let record = TelemetryRecord::from_snapshot(prefix, account, snapshot, tst);
        let payload = match record.payload() {
            Ok(p) => p,
            Err(e) => {
                error!("Failed to serialize location for {}: {}", record.topic, e);
                continue;
            }
        };

        debug!(
            topic = %record.topic,
            battery_status = %record.battery_status,
            "Publishing location"
        );
        publisher.publish(&record.topic, payload).await;
        published += 1;
    }

    published
}
