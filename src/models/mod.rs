use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Radio protocol a reading was received over
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MeterProtocol {
    #[serde(rename = "SCM")]
    Scm,
    #[serde(rename = "SCM+")]
    ScmPlus,
    #[serde(rename = "IDM")]
    Idm,
    #[serde(rename = "NetIDM")]
    NetIdm,
    #[serde(rename = "R900")]
    R900,
    #[serde(rename = "R900BCD")]
    R900Bcd,
    Unknown,
}

impl MeterProtocol {
    pub fn to_string(&self) -> String {
        match self {
            MeterProtocol::Scm => "SCM".to_string(),
            MeterProtocol::ScmPlus => "SCM+".to_string(),
            MeterProtocol::Idm => "IDM".to_string(),
            MeterProtocol::NetIdm => "NetIDM".to_string(),
            MeterProtocol::R900 => "R900".to_string(),
            MeterProtocol::R900Bcd => "R900BCD".to_string(),
            MeterProtocol::Unknown => "Unknown".to_string(),
        }
    }
}

/// Commodity a meter measures, resolved from the protocol-specific type codes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MeterType {
    #[serde(rename = "electric")]
    Electric,
    #[serde(rename = "water")]
    Water,
    #[serde(rename = "gas")]
    Gas,
    #[serde(rename = "unknown")]
    Unknown,
}

impl MeterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeterType::Electric => "electric",
            MeterType::Water => "water",
            MeterType::Gas => "gas",
            MeterType::Unknown => "unknown",
        }
    }

    pub fn unit(&self) -> MeterUnit {
        match self {
            MeterType::Electric => MeterUnit::KilowattHours,
            MeterType::Water => MeterUnit::Gallons,
            MeterType::Gas => MeterUnit::CubicFeet,
            MeterType::Unknown => MeterUnit::Unknown,
        }
    }

    /// Home Assistant device_class for the consumption sensor
    pub fn device_class(&self) -> Option<&'static str> {
        match self {
            MeterType::Electric => Some("energy"),
            MeterType::Water => Some("water"),
            MeterType::Gas => Some("gas"),
            MeterType::Unknown => None,
        }
    }

    pub fn model(&self) -> String {
        match self {
            MeterType::Electric => "Electric meter".to_string(),
            MeterType::Water => "Water meter".to_string(),
            MeterType::Gas => "Gas meter".to_string(),
            MeterType::Unknown => "Unknown meter".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MeterUnit {
    #[serde(rename = "kWh")]
    KilowattHours,
    #[serde(rename = "gal")]
    Gallons,
    #[serde(rename = "ft³")]
    CubicFeet,
    Unknown,
}

impl MeterUnit {
    /// Unit label as shown to the discovery consumer, None when not applicable
    pub fn label(&self) -> Option<&'static str> {
        match self {
            MeterUnit::KilowattHours => Some("kWh"),
            MeterUnit::Gallons => Some("gal"),
            MeterUnit::CubicFeet => Some("ft³"),
            MeterUnit::Unknown => None,
        }
    }
}

/// Leak severity from the water protocols. `Leak` is the SCM+ flag, which
/// carries no severity information.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LeakIntensity {
    None,
    Low,
    High,
    Leak,
}

impl LeakIntensity {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(LeakIntensity::None),
            1 => Some(LeakIntensity::Low),
            2 => Some(LeakIntensity::High),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LeakIntensity::None => "None",
            LeakIntensity::Low => "Low",
            LeakIntensity::High => "High",
            LeakIntensity::Leak => "Leak",
        }
    }
}

/// Canonical meter reading, one per decoded radio line
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Reading {
    pub protocol: MeterProtocol,
    pub meter_id: String,
    pub meter_type: MeterType,
    pub consumption: f64,
    pub unit: MeterUnit,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leak_now: Option<LeakIntensity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub back_flow: Option<LeakIntensity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leak: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_use: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
}

impl Reading {
    pub fn new(protocol: MeterProtocol, meter_id: String, meter_type: MeterType, consumption: f64) -> Self {
        return Reading {
            protocol,
            meter_id,
            meter_type,
            consumption,
            unit: meter_type.unit(),
            leak_now: None,
            back_flow: None,
            leak: None,
            no_use: None,
            time: None,
        };
    }

    /// Negative counters are a known decoder artifact, never meaningful
    pub fn is_valid(&self) -> bool {
        return self.consumption >= 0.0;
    }

    /// Registry key. The meter type participates so an id reused across
    /// protocols with the same resolved type collapses to one meter.
    pub fn key(&self) -> String {
        return format!("{}_{}", self.meter_id, self.meter_type.as_str());
    }
}
