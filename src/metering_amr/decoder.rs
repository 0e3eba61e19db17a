use chrono::{DateTime, Utc};
use log::warn;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::codes;
use crate::models::{LeakIntensity, MeterProtocol, MeterType, Reading};

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("line is not valid JSON: {0}")]
    InvalidJson(serde_json::Error),
    #[error("record is missing an expected field: {0}")]
    MissingField(serde_json::Error),
}

/// Raw-counter scale factors, configuration inputs
#[derive(Debug, Clone, Copy)]
pub struct Scaling {
    pub electric_divisor: f64,
    pub water_divisor: f64,
}

impl Default for Scaling {
    fn default() -> Self {
        return Scaling {
            electric_divisor: 100.0,
            water_divisor: 10.0,
        };
    }
}

/* One variant per protocol the radio decoder emits, discriminated by the
 * envelope Type field. Each variant carries only its own required fields. */
#[derive(Debug, Deserialize)]
#[serde(tag = "Type")]
enum RawRecord {
    #[serde(rename = "SCM")]
    Scm {
        #[serde(rename = "Message")]
        message: ScmMessage,
    },
    #[serde(rename = "SCM+")]
    ScmPlus {
        #[serde(rename = "Message")]
        message: ScmPlusMessage,
    },
    #[serde(rename = "IDM")]
    Idm {
        #[serde(rename = "Message")]
        message: IdmMessage,
    },
    #[serde(rename = "NetIDM")]
    NetIdm {
        #[serde(rename = "Message")]
        message: NetIdmMessage,
    },
    #[serde(rename = "R900")]
    R900 {
        #[serde(rename = "Message")]
        message: R900Message,
    },
    #[serde(rename = "R900BCD")]
    R900Bcd {
        #[serde(rename = "Message")]
        message: R900BcdMessage,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct ScmMessage {
    #[serde(rename = "ID")]
    id: u64,
    #[serde(rename = "Type")]
    endpoint_type: u8,
    #[serde(rename = "Consumption")]
    consumption: i64,
}

#[derive(Debug, Deserialize)]
struct ScmPlusMessage {
    #[serde(rename = "EndpointID")]
    endpoint_id: u64,
    #[serde(rename = "EndpointType")]
    endpoint_type: u8,
    #[serde(rename = "Consumption")]
    consumption: i64,
    #[serde(rename = "Leak", default)]
    leak: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct IdmMessage {
    #[serde(rename = "ERTSerialNumber")]
    serial: u64,
    #[serde(rename = "LastConsumptionCount")]
    consumption: i64,
}

#[derive(Debug, Deserialize)]
struct NetIdmMessage {
    #[serde(rename = "ERTSerialNumber")]
    serial: u64,
    #[serde(rename = "LastConsumptionNet")]
    consumption: i64,
}

#[derive(Debug, Deserialize)]
struct R900Message {
    #[serde(rename = "ID")]
    id: u64,
    #[serde(rename = "Consumption")]
    consumption: i64,
    #[serde(rename = "Leak", default)]
    leak: Option<u8>,
    #[serde(rename = "NoUse", default)]
    no_use: Option<u8>,
    #[serde(rename = "BackFlow", default)]
    back_flow: Option<u8>,
    #[serde(rename = "LeakNow", default)]
    leak_now: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct R900BcdMessage {
    #[serde(rename = "ID")]
    id: u64,
    #[serde(rename = "Consumption")]
    consumption: i64,
}

/// Commodity code sets from the SCM Type field
fn scm_meter_type(code: u8) -> MeterType {
    match code {
        4 | 5 | 7 | 8 => MeterType::Electric,
        2 | 9 | 12 => MeterType::Gas,
        3 | 11 | 13 => MeterType::Water,
        _ => MeterType::Unknown,
    }
}

/// SCM+ uses the SCM code sets plus its own extended endpoint types
fn scm_plus_meter_type(code: u8) -> MeterType {
    match code {
        4 | 5 | 7 | 8 | 110 => MeterType::Electric,
        2 | 9 | 12 | 156 | 188 | 220 => MeterType::Gas,
        3 | 11 | 13 | 27 | 171 => MeterType::Water,
        _ => MeterType::Unknown,
    }
}

fn scale(raw: i64, meter_type: MeterType, scaling: &Scaling) -> f64 {
    match meter_type {
        MeterType::Electric => raw as f64 / scaling.electric_divisor,
        MeterType::Water => raw as f64 / scaling.water_divisor,
        /* Gas counters are already in cubic feet */
        MeterType::Gas | MeterType::Unknown => raw as f64,
    }
}

fn history_label(field: &str, code: Option<u8>) -> Option<String> {
    let code = code?;
    match codes::get_history_label(code) {
        Some(label) => Some(label.to_string()),
        None => {
            warn!("R900 {field} code {code} not in the history table, attribute omitted");
            None
        }
    }
}

fn intensity(field: &str, code: Option<u8>) -> Option<LeakIntensity> {
    let code = code?;
    match codes::get_intensity(code) {
        Some(value) => Some(value),
        None => {
            warn!("R900 {field} code {code} not in the intensity table, attribute omitted");
            None
        }
    }
}

/// Decode one line of radio-decoder output into a canonical [`Reading`].
///
/// Pure apart from warning logs on lookup-table misses: the same line always
/// yields the same reading.
pub fn decode(line: &str, scaling: &Scaling) -> Result<Reading, DecodeError> {
    let value: Value = serde_json::from_str(line).map_err(DecodeError::InvalidJson)?;

    let time: Option<DateTime<Utc>> = value
        .get("Time")
        .and_then(Value::as_str)
        .and_then(|t| t.parse::<DateTime<Utc>>().ok());

    let record: RawRecord = serde_json::from_value(value).map_err(DecodeError::MissingField)?;

    let mut reading = match record {
        RawRecord::Scm { message } => {
            let meter_type = scm_meter_type(message.endpoint_type);
            Reading::new(
                MeterProtocol::Scm,
                message.id.to_string(),
                meter_type,
                scale(message.consumption, meter_type, scaling),
            )
        }
        RawRecord::ScmPlus { message } => {
            let meter_type = scm_plus_meter_type(message.endpoint_type);
            let mut reading = Reading::new(
                MeterProtocol::ScmPlus,
                message.endpoint_id.to_string(),
                meter_type,
                scale(message.consumption, meter_type, scaling),
            );
            reading.leak_now = Some(if message.leak.is_some() {
                LeakIntensity::Leak
            } else {
                LeakIntensity::None
            });
            reading
        }
        RawRecord::Idm { message } => Reading::new(
            MeterProtocol::Idm,
            message.serial.to_string(),
            MeterType::Electric,
            message.consumption as f64 / scaling.electric_divisor,
        ),
        RawRecord::NetIdm { message } => Reading::new(
            MeterProtocol::NetIdm,
            message.serial.to_string(),
            MeterType::Electric,
            message.consumption as f64 / scaling.electric_divisor,
        ),
        RawRecord::R900 { message } => {
            let mut reading = Reading::new(
                MeterProtocol::R900,
                message.id.to_string(),
                MeterType::Water,
                message.consumption as f64 / scaling.water_divisor,
            );
            reading.leak = history_label("Leak", message.leak);
            reading.no_use = history_label("NoUse", message.no_use);
            reading.back_flow = intensity("BackFlow", message.back_flow);
            reading.leak_now = intensity("LeakNow", message.leak_now);
            reading
        }
        RawRecord::R900Bcd { message } => Reading::new(
            MeterProtocol::R900Bcd,
            message.id.to_string(),
            MeterType::Water,
            message.consumption as f64 / scaling.water_divisor,
        ),
        RawRecord::Unknown => Reading::new(
            MeterProtocol::Unknown,
            "unknown".to_string(),
            MeterType::Unknown,
            0.0,
        ),
    };

    reading.time = time;
    return Ok(reading);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MeterUnit;

    fn scaling() -> Scaling {
        Scaling::default()
    }

    #[test]
    fn test_decode_scm_electric() {
        let line = r#"{"Type":"SCM","Time":"2026-01-01T00:00:00Z","Message":{"ID":123,"Type":4,"Consumption":5000}}"#;
        let reading = decode(line, &scaling()).unwrap();
        assert_eq!(reading.protocol, MeterProtocol::Scm);
        assert_eq!(reading.meter_id, "123");
        assert_eq!(reading.meter_type, MeterType::Electric);
        assert_eq!(reading.consumption, 50.0);
        assert_eq!(reading.unit, MeterUnit::KilowattHours);
        assert!(reading.time.is_some());
    }

    #[test]
    fn test_decode_scm_gas_is_unscaled() {
        let line = r#"{"Type":"SCM","Time":"t","Message":{"ID":55,"Type":12,"Consumption":731}}"#;
        let reading = decode(line, &scaling()).unwrap();
        assert_eq!(reading.meter_type, MeterType::Gas);
        assert_eq!(reading.consumption, 731.0);
        assert_eq!(reading.unit, MeterUnit::CubicFeet);
    }

    #[test]
    fn test_decode_scm_water() {
        let line = r#"{"Type":"SCM","Message":{"ID":77,"Type":13,"Consumption":200}}"#;
        let reading = decode(line, &scaling()).unwrap();
        assert_eq!(reading.meter_type, MeterType::Water);
        assert_eq!(reading.consumption, 20.0);
        assert_eq!(reading.unit, MeterUnit::Gallons);
    }

    #[test]
    fn test_decode_scm_unmapped_type_code() {
        let line = r#"{"Type":"SCM","Message":{"ID":77,"Type":42,"Consumption":200}}"#;
        let reading = decode(line, &scaling()).unwrap();
        assert_eq!(reading.protocol, MeterProtocol::Scm);
        assert_eq!(reading.meter_type, MeterType::Unknown);
        assert_eq!(reading.consumption, 200.0);
    }

    #[test]
    fn test_decode_scm_plus_leak_flag() {
        let line = r#"{"Type":"SCM+","Message":{"EndpointID":901,"EndpointType":171,"Consumption":40,"Leak":1}}"#;
        let reading = decode(line, &scaling()).unwrap();
        assert_eq!(reading.protocol, MeterProtocol::ScmPlus);
        assert_eq!(reading.meter_type, MeterType::Water);
        assert_eq!(reading.consumption, 4.0);
        assert_eq!(reading.leak_now, Some(LeakIntensity::Leak));
    }

    #[test]
    fn test_decode_scm_plus_without_leak_flag() {
        let line = r#"{"Type":"SCM+","Message":{"EndpointID":901,"EndpointType":110,"Consumption":40}}"#;
        let reading = decode(line, &scaling()).unwrap();
        assert_eq!(reading.meter_type, MeterType::Electric);
        assert_eq!(reading.leak_now, Some(LeakIntensity::None));
    }

    #[test]
    fn test_decode_idm() {
        let line = r#"{"Type":"IDM","Message":{"ERTSerialNumber":4242,"LastConsumptionCount":12345}}"#;
        let reading = decode(line, &scaling()).unwrap();
        assert_eq!(reading.protocol, MeterProtocol::Idm);
        assert_eq!(reading.meter_id, "4242");
        assert_eq!(reading.meter_type, MeterType::Electric);
        assert_eq!(reading.consumption, 123.45);
    }

    #[test]
    fn test_decode_net_idm_negative_is_invalid() {
        let line = r#"{"Type":"NetIDM","Message":{"ERTSerialNumber":4242,"LastConsumptionNet":-500}}"#;
        let reading = decode(line, &scaling()).unwrap();
        assert_eq!(reading.protocol, MeterProtocol::NetIdm);
        assert_eq!(reading.consumption, -5.0);
        assert!(!reading.is_valid());
    }

    #[test]
    fn test_decode_r900() {
        let line = r#"{"Type":"R900","Message":{"ID":77,"Consumption":200,"LeakNow":1,"BackFlow":2,"Leak":3,"NoUse":0}}"#;
        let reading = decode(line, &scaling()).unwrap();
        assert_eq!(reading.protocol, MeterProtocol::R900);
        assert_eq!(reading.meter_type, MeterType::Water);
        assert_eq!(reading.consumption, 20.0);
        assert_eq!(reading.leak_now, Some(LeakIntensity::Low));
        assert_eq!(reading.back_flow, Some(LeakIntensity::High));
        assert_eq!(reading.leak, Some("8-14 days".to_string()));
        assert_eq!(reading.no_use, Some("None".to_string()));
    }

    #[test]
    fn test_decode_r900_unmapped_code_keeps_reading() {
        let line = r#"{"Type":"R900","Message":{"ID":77,"Consumption":200,"LeakNow":9}}"#;
        let reading = decode(line, &scaling()).unwrap();
        assert_eq!(reading.consumption, 20.0);
        assert_eq!(reading.leak_now, None);
        assert!(reading.is_valid());
    }

    #[test]
    fn test_decode_r900bcd() {
        let line = r#"{"Type":"R900BCD","Message":{"ID":88,"Consumption":150}}"#;
        let reading = decode(line, &scaling()).unwrap();
        assert_eq!(reading.protocol, MeterProtocol::R900Bcd);
        assert_eq!(reading.consumption, 15.0);
        assert_eq!(reading.leak_now, None);
    }

    #[test]
    fn test_decode_unknown_protocol() {
        let line = r#"{"Type":"TLC","Message":{"ID":1,"Consumption":9}}"#;
        let reading = decode(line, &scaling()).unwrap();
        assert_eq!(reading.protocol, MeterProtocol::Unknown);
        assert_eq!(reading.meter_type, MeterType::Unknown);
        assert_eq!(reading.consumption, 0.0);
        assert_eq!(reading.unit, MeterUnit::Unknown);
    }

    #[test]
    fn test_decode_invalid_json() {
        let result = decode("not json at all", &scaling());
        assert!(matches!(result, Err(DecodeError::InvalidJson(_))));
    }

    #[test]
    fn test_decode_missing_field() {
        let line = r#"{"Type":"SCM","Message":{"ID":123,"Type":4}}"#;
        let result = decode(line, &scaling());
        assert!(matches!(result, Err(DecodeError::MissingField(_))));
    }

    #[test]
    fn test_decode_is_idempotent() {
        let line = r#"{"Type":"R900","Time":"2026-02-03T04:05:06Z","Message":{"ID":77,"Consumption":200,"LeakNow":1}}"#;
        let first = decode(line, &scaling()).unwrap();
        let second = decode(line, &scaling()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_decode_custom_divisors() {
        let scaling = Scaling {
            electric_divisor: 1000.0,
            water_divisor: 100.0,
        };
        let line = r#"{"Type":"SCM","Message":{"ID":1,"Type":4,"Consumption":5000}}"#;
        assert_eq!(decode(line, &scaling).unwrap().consumption, 5.0);
        let line = r#"{"Type":"R900","Message":{"ID":2,"Consumption":5000}}"#;
        assert_eq!(decode(line, &scaling).unwrap().consumption, 50.0);
    }
}
