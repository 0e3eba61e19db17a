use std::process::Stdio;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::Sender;
use tokio::time::{sleep, timeout};

pub mod codes;
pub mod decoder;
pub mod registry;

use crate::config::{AmrConfig, ConfigBases};
use crate::models::{MeterProtocol, Reading};
use crate::mqtt::{ha_interface, publish_meter_count, PublishData, Transmission};
use crate::{get_config_or_panic, CONFIG};
use self::decoder::{decode, Scaling};
use self::registry::MeterRegistry;

/// Decode -> registry -> publisher, one line fully processed at a time. The
/// single owner of the registry, so announce decisions never interleave.
pub struct Pipeline {
    registry: MeterRegistry,
    scaling: Scaling,
    forward_unknown: bool,
    prefix: String,
}

/// Everything one input line produced
pub struct LinePlan {
    pub reading: Reading,
    pub messages: Vec<PublishData>,
    pub announce: bool,
}

impl Pipeline {
    pub fn new(scaling: Scaling, forward_unknown: bool, prefix: String) -> Self {
        return Pipeline {
            registry: MeterRegistry::new(),
            scaling,
            forward_unknown,
            prefix,
        };
    }

    /// Returns None when the line carries nothing to publish
    pub fn plan(&mut self, line: &str) -> Option<LinePlan> {
        let reading = match decode(line, &self.scaling) {
            Ok(reading) => reading,
            Err(e) => {
                error!("Dropping line: {e}");
                return None;
            }
        };

        debug!(
            "Decoded {} reading from meter {}",
            reading.protocol.to_string(),
            reading.meter_id
        );

        if !reading.is_valid() {
            debug!("Dropping negative consumption from meter {}", reading.meter_id);
            return None;
        }

        if reading.protocol == MeterProtocol::Unknown && !self.forward_unknown {
            debug!("Dropping reading with unrecognized protocol");
            return None;
        }

        let announce = self.registry.observe(&reading);
        let messages = ha_interface::emit(&reading, announce, &self.prefix);
        return Some(LinePlan { reading, messages, announce });
    }

    pub fn mark_announced(&mut self, reading: &Reading) {
        self.registry.mark_announced(reading);
    }

    pub fn meter_count(&self) -> usize {
        return self.registry.len();
    }
}

pub struct AmrManager {
    sender: Sender<Transmission>,
    pipeline: Pipeline,
    config: AmrConfig,
    prefix: String,
}

impl AmrManager {
    pub fn new(sender: Sender<Transmission>) -> Self {
        let config = get_config_or_panic!("amr", ConfigBases::Amr);
        let mqtt_config = get_config_or_panic!("mqtt", ConfigBases::Mqtt);
        let scaling = Scaling {
            electric_divisor: config.electric_divisor,
            water_divisor: config.water_divisor,
        };

        return AmrManager {
            sender,
            pipeline: Pipeline::new(scaling, config.forward_unknown, mqtt_config.topic_prefix.clone()),
            prefix: mqtt_config.topic_prefix,
            config,
        };
    }

    fn build_command(&self) -> Command {
        let mut command = Command::new(&self.config.rtlamr_path);
        command.arg("-format=json");
        command.arg(format!("-server={}", self.config.server));
        command.arg(format!("-msgtype={}", self.config.msgtype));
        if !self.config.filterid.is_empty() {
            command.arg(format!("-filterid={}", self.config.filterid));
        }
        command.arg(format!("-unique={}", self.config.unique));
        command.stdout(Stdio::piped());
        command.stdin(Stdio::null());
        return command;
    }

    pub async fn start_thread(&mut self) {
        info!("Starting AMR ingest thread");
        loop {
            match self.run_decoder().await {
                Ok(_) => {
                    warn!("Radio decoder exited, restarting in {}s", self.config.restart_delay);
                }
                Err(e) => {
                    error!("Radio decoder failed: {e}, restarting in {}s", self.config.restart_delay);
                }
            }
            sleep(Duration::from_secs(self.config.restart_delay)).await;
        }
    }

    /// Run one radio decoder process until it exits or goes idle
    async fn run_decoder(&mut self) -> Result<(), std::io::Error> {
        let mut child = self.build_command().spawn()?;
        let stdout = child.stdout.take().expect("child stdout was requested piped");
        let mut lines = BufReader::new(stdout).lines();
        let idle = Duration::from_secs(self.config.idle_timeout);

        info!("Radio decoder started, waiting for readings");
        loop {
            match timeout(idle, lines.next_line()).await {
                Err(_) => {
                    warn!(
                        "No readings for {}s, restarting the radio decoder",
                        self.config.idle_timeout
                    );
                    let _ = child.kill().await;
                    return Ok(());
                }
                Ok(Err(e)) => {
                    let _ = child.kill().await;
                    return Err(e);
                }
                Ok(Ok(None)) => {
                    /* stream closed, reap before the restart policy kicks in */
                    let _ = child.wait().await;
                    return Ok(());
                }
                Ok(Ok(Some(line))) => {
                    self.process_line(&line).await;
                }
            }
        }
    }

    async fn process_line(&mut self, line: &str) {
        let plan = match self.pipeline.plan(line) {
            Some(plan) => plan,
            None => {
                return;
            }
        };

        let mut dispatched = self
            .sender
            .send(Transmission::Reading(plan.reading.clone()))
            .await
            .is_ok();
        for message in plan.messages {
            if !dispatched {
                break;
            }
            dispatched = self.sender.send(Transmission::Publish(message)).await.is_ok();
        }

        if plan.announce {
            if dispatched {
                self.pipeline.mark_announced(&plan.reading);
                publish_meter_count(&self.sender, &self.prefix, self.pipeline.meter_count()).await;
            } else {
                warn!(
                    "Dispatch failed, discovery for meter {} will be retried",
                    plan.reading.meter_id
                );
            }
        }
    }
}
