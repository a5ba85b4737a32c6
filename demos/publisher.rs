//! Publish a synthetic stream
//!
//! Run with: cargo run --example publisher [RTMP_URL] [STREAM_NAME]
//!
//! Examples:
//!   cargo run --example publisher                                   # rtmp://localhost/live, "test"
//!   cargo run --example publisher rtmp://localhost:1936/live cam1
//!
//! Sends one fake H.264 keyframe and one AAC frame every 40 ms. The payloads
//! are not decodable; the point is to watch the session come up, publish and
//! survive reconnects. Set RUST_LOG=rtmp_netstream=debug for protocol detail.

use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing_subscriber::EnvFilter;

use rtmp_netstream::media::{AudioCapabilities, MediaCapabilities, VideoCapabilities};
use rtmp_netstream::{ClientConfig, ClientEvent, HowToPublish, MediaPipeline, RtmpClient};

/// Pipeline that only advertises its encoder settings
struct FakeEncoder;

impl MediaPipeline for FakeEncoder {
    fn capabilities(&self) -> MediaCapabilities {
        MediaCapabilities {
            audio: Some(AudioCapabilities::default()),
            video: Some(VideoCapabilities {
                width: 640,
                height: 360,
                ..Default::default()
            }),
        }
    }

    fn start_encoding(&mut self) {
        tracing::info!("Encoder started");
    }

    fn stop_encoding(&mut self) {
        tracing::info!("Encoder stopped");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("rtmp_netstream=info".parse()?))
        .init();

    let mut args = std::env::args().skip(1);
    let url = args.next().unwrap_or_else(|| "rtmp://localhost/live".to_string());
    let name = args.next().unwrap_or_else(|| "test".to_string());

    let (client, mut events) = RtmpClient::connect(ClientConfig::new(url.as_str()))?;
    let stream = client.create_stream(FakeEncoder).await?;
    stream.publish(Some(name.as_str()), HowToPublish::Live).await?;

    let keyframe = Bytes::from_static(&[0x17, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01]);
    let audio = Bytes::from_static(&[0xAF, 0x01, 0x21, 0x00]);
    let started = Instant::now();
    let mut frames = tokio::time::interval(Duration::from_millis(40));
    let mut report = tokio::time::interval(Duration::from_secs(5));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Stopping");
                stream.close().await?;
                client.shutdown();
                break;
            }
            _ = frames.tick() => {
                let time = started.elapsed().as_secs_f64();
                stream.append_video(keyframe.clone(), time).await?;
                stream.append_audio(audio.clone(), time).await?;
            }
            _ = report.tick() => {
                let stats = stream.stats();
                tracing::info!(
                    state = ?stats.ready_state,
                    bytes = stats.byte_count,
                    fps = stats.current_fps,
                    "Stats"
                );
            }
            event = events.recv() => match event {
                Some(ClientEvent::Status { status, .. }) => tracing::info!(%status, "Status"),
                Some(ClientEvent::Reconnecting { attempt, delay }) => {
                    tracing::warn!(attempt, ?delay, "Reconnecting");
                }
                Some(ClientEvent::Fatal(reason)) => {
                    tracing::error!(%reason, "Giving up");
                    break;
                }
                Some(_) => {}
                None => break,
            },
        }
    }

    Ok(())
}
