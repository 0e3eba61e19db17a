use serde::Serialize;

use crate::models::Reading;
use crate::mqtt::PublishData;

pub const PAYLOAD_AVAILABLE: &str = "Online";
pub const PAYLOAD_NOT_AVAILABLE: &str = "Offline";

const DISCOVERY_PREFIX: &str = "homeassistant";
const MANUFACTURER: &str = "amr2mqtt";

/// Device block embedded in every discovery payload of a meter. Identical
/// across the meter's sensors so the consumer groups them as one device.
#[derive(Serialize)]
pub struct HaDevice {
    identifiers: Vec<String>,
    name: String,
    manufacturer: String,
    model: String,
}

impl HaDevice {
    fn new(reading: &Reading) -> Self {
        return HaDevice {
            identifiers: vec![format!("amr2mqtt_{}", reading.meter_id)],
            name: format!("Meter {}", reading.meter_id),
            manufacturer: MANUFACTURER.to_string(),
            model: reading.meter_type.model(),
        };
    }
}

fn is_none_str(value: &Option<String>) -> bool {
    return value.is_none();
}

/// One discovery config payload, for sensor and binary_sensor entities alike
#[derive(Serialize)]
pub struct HaEntityConfig {
    pub name: String,
    pub state_topic: String,
    #[serde(skip_serializing_if = "is_none_str")]
    pub unit_of_measurement: Option<String>,
    #[serde(skip_serializing_if = "is_none_str")]
    pub device_class: Option<String>,
    #[serde(skip_serializing_if = "is_none_str")]
    pub state_class: Option<String>,
    #[serde(skip_serializing_if = "is_none_str")]
    pub value_template: Option<String>,
    pub unique_id: String,
    pub availability_topic: String,
    pub payload_available: String,
    pub payload_not_available: String,
    pub device: HaDevice,
}

fn config_topic(kind: &str, meter_id: &str, suffix: &str) -> String {
    return format!("{DISCOVERY_PREFIX}/{kind}/{meter_id}/{suffix}/config");
}

fn state_topic(kind: &str, meter_id: &str, suffix: &str) -> String {
    return format!("{DISCOVERY_PREFIX}/{kind}/{meter_id}/{suffix}/state");
}

fn discovery(topic: String, config: &HaEntityConfig) -> PublishData {
    return PublishData {
        topic,
        payload: serde_json::to_string(config).unwrap(),
        qos: 1,
        retain: true,
    };
}

fn consumption_sensor(reading: &Reading, suffix: &str, status_topic: &str) -> HaEntityConfig {
    let type_name = reading.meter_type.as_str();
    return HaEntityConfig {
        name: format!("{} {} consumption", reading.meter_id, type_name),
        state_topic: state_topic("sensor", &reading.meter_id, suffix),
        unit_of_measurement: reading.unit.label().map(str::to_string),
        device_class: reading.meter_type.device_class().map(str::to_string),
        state_class: Some("total_increasing".to_string()),
        value_template: None,
        unique_id: format!("{}_{}", reading.meter_id, suffix),
        availability_topic: status_topic.to_string(),
        payload_available: PAYLOAD_AVAILABLE.to_string(),
        payload_not_available: PAYLOAD_NOT_AVAILABLE.to_string(),
        device: HaDevice::new(reading),
    };
}

fn leak_sensor(reading: &Reading, status_topic: &str) -> HaEntityConfig {
    return HaEntityConfig {
        name: format!("{} leak", reading.meter_id),
        state_topic: state_topic("binary_sensor", &reading.meter_id, "leak"),
        unit_of_measurement: None,
        device_class: Some("moisture".to_string()),
        state_class: None,
        value_template: Some(
            "{% if value_json.leak_now == 'None' %}OFF{% else %}ON{% endif %}".to_string(),
        ),
        unique_id: format!("{}_leak", reading.meter_id),
        availability_topic: status_topic.to_string(),
        payload_available: PAYLOAD_AVAILABLE.to_string(),
        payload_not_available: PAYLOAD_NOT_AVAILABLE.to_string(),
        device: HaDevice::new(reading),
    };
}

fn config_check_sensor(reading: &Reading, suffix: &str, status_topic: &str) -> HaEntityConfig {
    let type_name = reading.meter_type.as_str();
    return HaEntityConfig {
        name: format!("{} {} config", reading.meter_id, type_name),
        state_topic: state_topic("binary_sensor", &reading.meter_id, suffix),
        unit_of_measurement: None,
        device_class: Some("connectivity".to_string()),
        state_class: None,
        value_template: None,
        unique_id: format!("{}_{}", reading.meter_id, suffix),
        availability_topic: status_topic.to_string(),
        payload_available: PAYLOAD_AVAILABLE.to_string(),
        payload_not_available: PAYLOAD_NOT_AVAILABLE.to_string(),
        device: HaDevice::new(reading),
    };
}

/// Turn one valid reading into its outbound message set. Pure, the network
/// dispatch happens in the MQTT manager.
///
/// A first sighting prepends the three retained discovery configs plus the
/// config-check "ON" marker; every reading appends the unretained consumption
/// and leak state messages.
pub fn emit(reading: &Reading, first_sighting: bool, prefix: &str) -> Vec<PublishData> {
    let mut messages = Vec::new();
    let type_name = reading.meter_type.as_str();
    let consumption_suffix = format!("{type_name}_consumption");
    let config_check_suffix = format!("{type_name}_consumption_config");
    let status_topic = format!("{prefix}/status");

    if first_sighting {
        messages.push(discovery(
            config_topic("sensor", &reading.meter_id, &consumption_suffix),
            &consumption_sensor(reading, &consumption_suffix, &status_topic),
        ));
        messages.push(discovery(
            config_topic("binary_sensor", &reading.meter_id, "leak"),
            &leak_sensor(reading, &status_topic),
        ));
        messages.push(discovery(
            config_topic("binary_sensor", &reading.meter_id, &config_check_suffix),
            &config_check_sensor(reading, &config_check_suffix, &status_topic),
        ));
        messages.push(PublishData {
            topic: state_topic("binary_sensor", &reading.meter_id, &config_check_suffix),
            payload: "ON".to_string(),
            qos: 1,
            retain: true,
        });
    }

    messages.push(PublishData {
        topic: state_topic("sensor", &reading.meter_id, &consumption_suffix),
        payload: reading.consumption.to_string(),
        qos: 0,
        retain: false,
    });

    let leak_now = reading.leak_now.map(|l| l.as_str()).unwrap_or("None");
    messages.push(PublishData {
        topic: state_topic("binary_sensor", &reading.meter_id, "leak"),
        payload: serde_json::json!({
            "consumption": reading.consumption,
            "leak_now": leak_now,
        })
        .to_string(),
        qos: 0,
        retain: false,
    });

    return messages;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LeakIntensity, MeterProtocol, MeterType, Reading};
    use serde_json::Value;

    fn electric_reading() -> Reading {
        return Reading::new(MeterProtocol::Scm, "123".to_string(), MeterType::Electric, 50.0);
    }

    #[test]
    fn test_first_sighting_message_set() {
        let messages = emit(&electric_reading(), true, "amr2mqtt");
        assert_eq!(messages.len(), 6);

        assert_eq!(messages[0].topic, "homeassistant/sensor/123/electric_consumption/config");
        assert_eq!(messages[1].topic, "homeassistant/binary_sensor/123/leak/config");
        assert_eq!(
            messages[2].topic,
            "homeassistant/binary_sensor/123/electric_consumption_config/config"
        );
        assert_eq!(
            messages[3].topic,
            "homeassistant/binary_sensor/123/electric_consumption_config/state"
        );
        assert_eq!(messages[3].payload, "ON");

        for message in &messages[..4] {
            assert_eq!(message.qos, 1);
            assert!(message.retain);
        }
    }

    #[test]
    fn test_repeat_sighting_only_emits_state() {
        let messages = emit(&electric_reading(), false, "amr2mqtt");
        assert_eq!(messages.len(), 2);

        assert_eq!(messages[0].topic, "homeassistant/sensor/123/electric_consumption/state");
        assert_eq!(messages[0].payload, "50");
        assert_eq!(messages[1].topic, "homeassistant/binary_sensor/123/leak/state");
        for message in &messages {
            assert_eq!(message.qos, 0);
            assert!(!message.retain);
        }
    }

    #[test]
    fn test_discovery_payload_contents() {
        let messages = emit(&electric_reading(), true, "meters");
        let config: Value = serde_json::from_str(&messages[0].payload).unwrap();

        assert_eq!(config["state_topic"], "homeassistant/sensor/123/electric_consumption/state");
        assert_eq!(config["unit_of_measurement"], "kWh");
        assert_eq!(config["device_class"], "energy");
        assert_eq!(config["state_class"], "total_increasing");
        assert_eq!(config["unique_id"], "123_electric_consumption");
        assert_eq!(config["availability_topic"], "meters/status");
        assert_eq!(config["payload_available"], "Online");
        assert_eq!(config["payload_not_available"], "Offline");
        assert_eq!(config["device"]["identifiers"][0], "amr2mqtt_123");
        assert_eq!(config["device"]["model"], "Electric meter");
    }

    #[test]
    fn test_device_block_is_shared_across_entities() {
        let messages = emit(&electric_reading(), true, "amr2mqtt");
        let consumption: Value = serde_json::from_str(&messages[0].payload).unwrap();
        let leak: Value = serde_json::from_str(&messages[1].payload).unwrap();
        let config_check: Value = serde_json::from_str(&messages[2].payload).unwrap();

        assert_eq!(consumption["device"], leak["device"]);
        assert_eq!(leak["device"], config_check["device"]);
    }

    #[test]
    fn test_leak_state_defaults_to_none() {
        let messages = emit(&electric_reading(), false, "amr2mqtt");
        let payload: Value = serde_json::from_str(&messages[1].payload).unwrap();
        assert_eq!(payload["consumption"], 50.0);
        assert_eq!(payload["leak_now"], "None");
    }

    #[test]
    fn test_leak_state_carries_intensity() {
        let mut reading = Reading::new(MeterProtocol::R900, "77".to_string(), MeterType::Water, 20.0);
        reading.leak_now = Some(LeakIntensity::Low);

        let messages = emit(&reading, false, "amr2mqtt");
        let payload: Value = serde_json::from_str(&messages[1].payload).unwrap();
        assert_eq!(payload["leak_now"], "Low");
        assert_eq!(payload["consumption"], 20.0);
    }

    #[test]
    fn test_unknown_meter_omits_unit_and_class() {
        let reading = Reading::new(MeterProtocol::Unknown, "unknown".to_string(), MeterType::Unknown, 0.0);
        let messages = emit(&reading, true, "amr2mqtt");
        let config: Value = serde_json::from_str(&messages[0].payload).unwrap();

        assert!(config.get("unit_of_measurement").is_none());
        assert!(config.get("device_class").is_none());
    }
}
