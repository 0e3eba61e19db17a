pub mod ha_interface;

use std::io::Error;
use std::time::{Duration, Instant};

use lazy_static::lazy_static;
use log::{debug, error, info};
use rumqttc::{AsyncClient, Event, LastWill, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::sync::RwLock;

use crate::config::ConfigBases;
use crate::models::Reading;
use crate::mqtt::ha_interface::{PAYLOAD_AVAILABLE, PAYLOAD_NOT_AVAILABLE};
use crate::{get_config_or_panic, CONFIG};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MqttConnectionStatus {
    Connected,
    Disconnected,
    Error(String),
}

#[derive(Clone)]
pub struct MqttHealthStatus {
    pub status: MqttConnectionStatus,
    pub last_connected: Option<Instant>,
    pub connection_attempts: u64,
}

impl MqttHealthStatus {
    pub fn new() -> Self {
        Self {
            status: MqttConnectionStatus::Disconnected,
            last_connected: None,
            connection_attempts: 0,
        }
    }
}

#[derive(Clone)]
pub struct AppStatus {
    pub start_time: Instant,
    pub mqtt_health: MqttHealthStatus,
}

impl AppStatus {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            mqtt_health: MqttHealthStatus::new(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

lazy_static! {
    pub static ref APP_STATUS: RwLock<AppStatus> = RwLock::new(AppStatus::new());
}

pub struct PublishData {
    pub topic: String,
    pub payload: String,
    pub qos: u8,
    pub retain: bool,
}

pub enum Transmission {
    Reading(Reading),
    Publish(PublishData),
}

pub struct MqttManager {
    rx: Receiver<Transmission>,
    exit_thread: bool,
    client: AsyncClient,
    prefix: String,
}

impl MqttManager {
    pub fn new() -> Result<(Self, Sender<Transmission>), Error> {
        let (mtx, mrx) = tokio::sync::mpsc::channel(100);

        info!("MQTT connection starting up");
        let config = get_config_or_panic!("mqtt", ConfigBases::Mqtt);
        let status_topic = format!("{}/status", config.topic_prefix);

        let mut mqttoptions = MqttOptions::new(config.client_name.clone(), config.host.clone(), config.port);
        mqttoptions.set_keep_alive(Duration::from_secs(5));
        mqttoptions.set_last_will(LastWill::new(
            status_topic.clone(),
            PAYLOAD_NOT_AVAILABLE,
            QoS::AtLeastOnce,
            true,
        ));
        if !config.user.is_empty() {
            mqttoptions.set_credentials(config.user.clone(), config.pass.clone());
        }

        let (client, mut eventloop) = AsyncClient::new(mqttoptions, 10);

        // The eventloop drives delivery and reconnects on its own; the
        // pipeline never blocks on it
        let availability_c = client.clone();
        tokio::spawn(async move {
            info!("MQTT eventloop started");
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("Connected, announcing availability");
                        {
                            let mut app_status = APP_STATUS.write().await;
                            app_status.mqtt_health.status = MqttConnectionStatus::Connected;
                            app_status.mqtt_health.last_connected = Some(Instant::now());
                            app_status.mqtt_health.connection_attempts += 1;
                        }

                        let client_clone = availability_c.clone();
                        let topic = status_topic.clone();
                        tokio::spawn(async move {
                            if let Err(e) = client_clone
                                .publish(topic, QoS::AtLeastOnce, true, PAYLOAD_AVAILABLE)
                                .await
                            {
                                error!("Error announcing availability: {e}");
                            }
                        });
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("Error in MQTT {:?}, reconnecting ", e);
                        let mut app_status = APP_STATUS.write().await;
                        app_status.mqtt_health.status = MqttConnectionStatus::Error(e.to_string());
                    }
                }
            }
        });

        return Ok((
            MqttManager {
                rx: mrx,
                exit_thread: false,
                client,
                prefix: config.topic_prefix.clone(),
            },
            mtx,
        ));
    }

    pub async fn start_thread(&mut self) {
        // Handle everything the pipeline sends, in channel order
        while !self.exit_thread {
            let option = self.rx.recv().await;

            if option.is_none() {
                debug!("Reading returned none, we exit now");
                self.exit_thread = true;
                continue;
            }

            match option.unwrap() {
                Transmission::Reading(reading) => {
                    debug!("Reading received from meter {}", reading.meter_id);
                    match self
                        .client
                        .publish(
                            format!("{}/raw", self.prefix),
                            QoS::AtMostOnce,
                            false,
                            serde_json::to_string(&reading).unwrap(),
                        )
                        .await
                    {
                        Err(e) => {
                            error!("Error sending: {}", e);
                        }
                        Ok(_) => {
                            debug!("Send successfully");
                        }
                    }
                }
                Transmission::Publish(publish_data) => {
                    match self
                        .client
                        .publish(
                            publish_data.topic,
                            match publish_data.qos {
                                0 => QoS::AtMostOnce,
                                1 => QoS::AtLeastOnce,
                                _ => QoS::AtMostOnce,
                            },
                            publish_data.retain,
                            publish_data.payload,
                        )
                        .await
                    {
                        Err(e) => {
                            error!("Error publishing: {}", e);
                        }
                        Ok(_) => {
                            debug!("Published successfully");
                        }
                    }
                }
            };
        }

        if self.exit_thread == true {
            info!("Thread exit, waiting");
        } else {
            error!("Exited without need to do so ... spookie");
        }
    }
}

pub async fn get_app_status() -> AppStatus {
    APP_STATUS.read().await.clone()
}

pub async fn publish_uptime(mqtt_sender: &Sender<Transmission>, prefix: &str) {
    let app_status = get_app_status().await;

    let uptime_publish = PublishData {
        topic: format!("{}/mgt/uptime", prefix),
        payload: app_status.uptime_seconds().to_string(),
        qos: 1,
        retain: true,
    };
    let _ = mqtt_sender.send(Transmission::Publish(uptime_publish)).await;
}

pub async fn publish_meter_count(mqtt_sender: &Sender<Transmission>, prefix: &str, count: usize) {
    let count_publish = PublishData {
        topic: format!("{}/mgt/meters", prefix),
        payload: count.to_string(),
        qos: 1,
        retain: true,
    };
    let _ = mqtt_sender.send(Transmission::Publish(count_publish)).await;
}
