use std::env;
use std::error::Error;
use std::fs::File;
use std::io::prelude::*;
use std::str::FromStr;

use lazy_static::lazy_static;
use log::warn;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use uuid::Uuid;

fn mqtt_host_default() -> String { return "".to_string() }
fn mqtt_port_default() -> u16 { return 1883 }
fn mqtt_user_default() -> String { return "".to_string() }
fn mqtt_pass_default() -> String { return "".to_string() }
fn mqtt_client_name_default() -> String { return format!("amr2mqtt-{}", Uuid::new_v4().simple()) }
fn mqtt_topic_prefix_default() -> String { return "amr2mqtt".to_string() }

#[derive(Deserialize, Serialize, Clone)]
pub struct MqttConfig {
    #[serde(default="mqtt_host_default")]
    pub host: String,
    #[serde(default="mqtt_port_default")]
    pub port: u16,
    #[serde(default="mqtt_user_default")]
    pub user: String,
    #[serde(default="mqtt_pass_default")]
    pub pass: String,
    #[serde(default="mqtt_client_name_default")]
    pub client_name: String,
    #[serde(default="mqtt_topic_prefix_default")]
    pub topic_prefix: String,
}

fn amr_rtlamr_path_default() -> String { return "rtlamr".to_string() }
fn amr_server_default() -> String { return "127.0.0.1:1234".to_string() }
fn amr_msgtype_default() -> String { return "all".to_string() }
fn amr_filterid_default() -> String { return "".to_string() }
fn amr_unique_default() -> bool { return true }
fn amr_electric_divisor_default() -> f64 { return 100.0 }
fn amr_water_divisor_default() -> f64 { return 10.0 }
fn amr_forward_unknown_default() -> bool { return false }
fn amr_idle_timeout_default() -> u64 { return 300 }
fn amr_restart_delay_default() -> u64 { return 5 }

#[derive(Deserialize, Serialize, Clone)]
pub struct AmrConfig {
    #[serde(default="amr_rtlamr_path_default")]
    pub rtlamr_path: String,
    /// rtl_tcp address the radio decoder connects to
    #[serde(default="amr_server_default")]
    pub server: String,
    #[serde(default="amr_msgtype_default")]
    pub msgtype: String,
    /// Comma separated meter ids, empty means no filter
    #[serde(default="amr_filterid_default")]
    pub filterid: String,
    #[serde(default="amr_unique_default")]
    pub unique: bool,
    #[serde(default="amr_electric_divisor_default")]
    pub electric_divisor: f64,
    #[serde(default="amr_water_divisor_default")]
    pub water_divisor: f64,
    /// Forward unrecognized protocols as zero-consumption readings
    #[serde(default="amr_forward_unknown_default")]
    pub forward_unknown: bool,
    /// Seconds without a line before the radio decoder is restarted
    #[serde(default="amr_idle_timeout_default")]
    pub idle_timeout: u64,
    #[serde(default="amr_restart_delay_default")]
    pub restart_delay: u64,
}

fn mqtt_default() -> MqttConfig {
    return MqttConfig {
        host: mqtt_host_default(),
        port: mqtt_port_default(),
        user: mqtt_user_default(),
        pass: mqtt_pass_default(),
        client_name: mqtt_client_name_default(),
        topic_prefix: mqtt_topic_prefix_default(),
    };
}

fn amr_default() -> AmrConfig {
    return AmrConfig {
        rtlamr_path: amr_rtlamr_path_default(),
        server: amr_server_default(),
        msgtype: amr_msgtype_default(),
        filterid: amr_filterid_default(),
        unique: amr_unique_default(),
        electric_divisor: amr_electric_divisor_default(),
        water_divisor: amr_water_divisor_default(),
        forward_unknown: amr_forward_unknown_default(),
        idle_timeout: amr_idle_timeout_default(),
        restart_delay: amr_restart_delay_default(),
    };
}

#[derive(Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default="mqtt_default")]
    pub mqtt: MqttConfig,
    #[serde(default="amr_default")]
    pub amr: AmrConfig,
}

pub enum ConfigBases {
    Mqtt(MqttConfig),
    Amr(AmrConfig),
}

pub struct ConfigHolder {
    pub config: Config,
}

impl ConfigHolder {
    pub fn load() -> Self {
        let mut config = read_config_file();
        apply_env_overrides(&mut config);
        validate(&mut config);
        return ConfigHolder { config };
    }

    pub fn get_copy(&self, base: &str) -> Result<ConfigBases, Box<dyn Error>> {
        match base {
            "mqtt" => { return Ok(ConfigBases::Mqtt(self.config.mqtt.clone())) },
            "amr" => { return Ok(ConfigBases::Amr(self.config.amr.clone())) },
            _ => { Err("Type not known")? }
        }
    }
}

fn read_config_file() -> Config {
    /* Check the override path first, then the two default locations */
    let mut paths = vec!["config/amr2mqtt.yaml".to_string(), "amr2mqtt.yaml".to_string()];
    if let Ok(path) = env::var("AMR2MQTT_CONFIG") {
        paths.insert(0, path);
    }

    for path in paths {
        if let Ok(mut file) = File::open(&path) {
            let mut contents = String::new();
            file.read_to_string(&mut contents).expect("Unable to read config file");
            return serde_yml::from_str(&contents).expect("Unable to parse config file");
        }
    }

    /* No file anywhere, run on defaults plus environment */
    return serde_yml::from_str("{}").expect("Unable to build default config");
}

fn env_override_string(key: &str, target: &mut String) {
    if let Ok(value) = env::var(key) {
        *target = value;
    }
}

fn env_override_parse<T: FromStr>(key: &str, target: &mut T) {
    if let Ok(value) = env::var(key) {
        match value.parse::<T>() {
            Ok(parsed) => { *target = parsed; }
            Err(_) => { warn!("Ignoring {key}: unable to parse {value:?}"); }
        }
    }
}

fn apply_env_overrides(config: &mut Config) {
    env_override_string("AMR2MQTT_MQTT_HOST", &mut config.mqtt.host);
    env_override_parse("AMR2MQTT_MQTT_PORT", &mut config.mqtt.port);
    env_override_string("AMR2MQTT_MQTT_USER", &mut config.mqtt.user);
    env_override_string("AMR2MQTT_MQTT_PASS", &mut config.mqtt.pass);
    env_override_string("AMR2MQTT_MQTT_CLIENT_NAME", &mut config.mqtt.client_name);
    env_override_string("AMR2MQTT_MQTT_TOPIC_PREFIX", &mut config.mqtt.topic_prefix);

    env_override_string("AMR2MQTT_RTLAMR_PATH", &mut config.amr.rtlamr_path);
    env_override_string("AMR2MQTT_SERVER", &mut config.amr.server);
    env_override_string("AMR2MQTT_MSGTYPE", &mut config.amr.msgtype);
    env_override_string("AMR2MQTT_FILTERID", &mut config.amr.filterid);
    env_override_parse("AMR2MQTT_UNIQUE", &mut config.amr.unique);
    env_override_parse("AMR2MQTT_ELECTRIC_DIVISOR", &mut config.amr.electric_divisor);
    env_override_parse("AMR2MQTT_WATER_DIVISOR", &mut config.amr.water_divisor);
    env_override_parse("AMR2MQTT_FORWARD_UNKNOWN", &mut config.amr.forward_unknown);
    env_override_parse("AMR2MQTT_IDLE_TIMEOUT", &mut config.amr.idle_timeout);
    env_override_parse("AMR2MQTT_RESTART_DELAY", &mut config.amr.restart_delay);
}

pub fn is_valid_filterid(filterid: &str) -> bool {
    let filter_re = Regex::new(r"^[0-9]+(,[0-9]+)*$").unwrap();
    return filter_re.is_match(filterid);
}

fn validate(config: &mut Config) {
    if config.mqtt.host.is_empty() {
        eprintln!("No MQTT broker host configured, set AMR2MQTT_MQTT_HOST or the mqtt.host config key");
        std::process::exit(1);
    }

    if !config.amr.filterid.is_empty() && !is_valid_filterid(&config.amr.filterid) {
        warn!("Ignoring filterid {:?}: expected comma separated meter ids", config.amr.filterid);
        config.amr.filterid.clear();
    }
}

lazy_static! {
    pub static ref CONFIG: RwLock<ConfigHolder> = RwLock::new(ConfigHolder::load());
}

#[macro_export]
macro_rules! get_config_or_panic {
    ($base: expr, $pat: path) => {
        {
            let c = CONFIG.read().unwrap().get_copy($base).unwrap();
            if let $pat(a) = c { // #1
                a
            } else {
                panic!(
                    "mismatch variant when cast to {}",
                    stringify!($pat)); // #2
            }
        }
    };
}
