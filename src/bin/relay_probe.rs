//! Relay probe
//!
//! Publishes one message on the relay's input route and prints everything
//! that shows up on its output route (samples and the relayed copy) until
//! the wait time runs out.

use clap::Parser;
use edge_temp_relay::domain::RelayedMessage;
use edge_temp_relay::infra::Config;
use edge_temp_relay::io::mqtt::{inbound_message, input_topic, outbound_properties, output_topic};
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{AsyncClient, Event, MqttOptions};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "relay-probe", about = "Send a message through the relay and watch its output")]
struct Args {
    /// Path to the relay's JSON configuration file
    #[arg(short, long, default_value = "config/appsettings.json")]
    config: String,

    /// Payload to publish on the input route
    #[arg(long, default_value = "hello")]
    payload: String,

    /// Metadata to attach, as key=value (repeatable)
    #[arg(long = "property", value_parser = parse_property)]
    properties: Vec<(String, String)>,

    /// Seconds to watch the output route
    #[arg(long, default_value = "12")]
    wait_secs: u64,
}

fn parse_property(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got {:?}", raw))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(&args.config)?;

    let input = input_topic(config.topic_prefix(), config.input_name());
    let output = output_topic(config.topic_prefix(), config.output_name());

    let mut options = MqttOptions::new(
        format!("relay-probe-{}", std::process::id()),
        config.mqtt_host(),
        config.mqtt_port(),
    );
    options.set_keep_alive(Duration::from_secs(10));
    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        options.set_credentials(username.to_string(), password.to_string());
    }

    let (client, mut eventloop) = AsyncClient::new(options, 10);
    client.subscribe(output.clone(), QoS::AtLeastOnce).await?;

    let mut message = RelayedMessage::new(args.payload.clone());
    message.properties = args.properties;
    client
        .publish_with_properties(
            input.clone(),
            QoS::AtLeastOnce,
            false,
            message.payload.clone(),
            outbound_properties(&message),
        )
        .await?;

    println!("published on {}: [{}] {:?}", input, message.body_lossy(), message.properties);
    println!("watching {} for {}s", output, args.wait_secs);

    let deadline = Instant::now() + Duration::from_secs(args.wait_secs);
    let mut relayed = false;
    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => break,
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let received = inbound_message(&publish);
                    let is_copy = received == message;
                    relayed |= is_copy;
                    println!(
                        "{} [{}] {:?}",
                        if is_copy { "relayed" } else { "output " },
                        received.body_lossy(),
                        received.properties
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    eprintln!("mqtt error: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            },
        }
    }

    if relayed {
        println!("relay OK");
        Ok(())
    } else {
        anyhow::bail!("relayed copy not seen on {}", output)
    }
}
