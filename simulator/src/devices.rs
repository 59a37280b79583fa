use rand::Rng;
use serde::Serialize;

/// A simulated device that wanders around a starting point
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    pub name: String,
    pub device_display_name: String,
    pub battery_level: f32,
    pub battery_status: String,
    pub location: Option<Location>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f32,
    pub horizontal_accuracy: f32,
    pub vertical_accuracy: f32,
    pub time_stamp: i64,
}

const MODELS: &[&str] = &["iPhone-12", "iPhone-15-Pro", "iPad-Air", "MacBook-Pro", "Watch-S9"];

impl Device {
    pub fn random(rng: &mut impl Rng, account: &str, index: usize) -> Self {
        let model = MODELS[index % MODELS.len()];
        Self {
            id: format!("{}-{}", account, index),
            name: format!("{}'s {}", account, model.replace('-', " ")),
            device_display_name: model.to_string(),
            battery_level: rng.gen_range(0.2..1.0),
            battery_status: "NotCharging".to_string(),
            location: Some(Location {
                latitude: rng.gen_range(48.0..51.0),
                longitude: rng.gen_range(12.0..19.0),
                altitude: rng.gen_range(150.0..600.0),
                horizontal_accuracy: 10.0,
                vertical_accuracy: 5.0,
                time_stamp: 0,
            }),
        }
    }

    /// Moves the device a little and drains or charges the battery.
    pub fn step(&mut self, rng: &mut impl Rng, now_ms: i64) {
        if self.battery_status == "Charging" {
            self.battery_level = (self.battery_level + rng.gen_range(0.01f32..0.05)).min(1.0);
            if self.battery_level >= 1.0 {
                self.battery_status = "Charged".to_string();
            }
        } else {
            self.battery_level = (self.battery_level - rng.gen_range(0.0f32..0.02)).max(0.0);
            if self.battery_level < 0.2 && rng.gen_bool(0.5) {
                self.battery_status = "Charging".to_string();
            } else if self.battery_status == "Charged" {
                self.battery_status = "NotCharging".to_string();
            }
        }

        let Some(location) = &mut self.location else {
            return;
        };
        location.latitude = (location.latitude + rng.gen_range(-0.001f64..0.001)).clamp(-90.0, 90.0);
        location.longitude = (location.longitude + rng.gen_range(-0.001f64..0.001)).clamp(-180.0, 180.0);
        location.altitude += rng.gen_range(-2.0f32..2.0);
        location.horizontal_accuracy = rng.gen_range(5.0..65.0);
        location.vertical_accuracy = rng.gen_range(3.0..15.0);
        location.time_stamp = now_ms;
    }

    /// What the service reports for this device; 5% of readings carry no fix.
    pub fn reading(&self, rng: &mut impl Rng) -> Device {
        let mut reading = self.clone();
        if rng.gen_bool(0.05) {
            reading.location = None;
        }
        reading
    }
}
