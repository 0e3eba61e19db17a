use amr2mqtt::{get_config_or_panic, mqtt::publish_uptime, AmrManager, ConfigBases, MqttManager, CONFIG};
use log::info;
use std::time::Duration;
use tokio::task::JoinHandle;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Initialize logging
    let default_filter = std::env::var("AMR2MQTT_LOG_LEVEL").unwrap_or("info".to_string());
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(default_filter));

    let (mut mqtt, tx) = MqttManager::new().unwrap();

    let mut threads: Vec<JoinHandle<()>> = Vec::new();

    threads.push(tokio::spawn(async move {
        mqtt.start_thread().await;
    }));

    // Start the radio ingest loop
    let mut amr = AmrManager::new(tx.clone());
    threads.push(tokio::spawn(async move {
        amr.start_thread().await;
    }));

    /* Periodic uptime publishing */
    let prefix = {
        let config = get_config_or_panic!("mqtt", ConfigBases::Mqtt);
        config.topic_prefix
    };
    let uptime_sender = tx.clone();
    threads.push(tokio::spawn(async move {
        // Publish immediately on startup
        publish_uptime(&uptime_sender, &prefix).await;

        // Then publish every minute
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        interval.tick().await; // Skip first immediate tick since we already published

        loop {
            interval.tick().await;
            publish_uptime(&uptime_sender, &prefix).await;
        }
    }));

    info!("All modules started, now waiting for a signal to exit");
    loop {
        tokio::time::sleep(Duration::from_secs(10)).await;
        let mut kill_all_tasks = false;
        for task in threads.iter() {
            if task.is_finished() {
                kill_all_tasks = true;
            }
        }

        if kill_all_tasks == true {
            for task in threads.iter_mut() {
                task.abort();
            }
            break;
        }
    }
    Ok(())
}
