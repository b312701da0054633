use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lab_mocap::config::Config;
use lab_mocap::gait::GaitReport;
use lab_mocap::processor::FrameProcessor;
use lab_mocap::protocol::{self, ClientMessage, ServerMessage};

#[derive(Parser, Debug)]
#[command(name = "lab-mocap", about = "Joint-angle, squat and gait analysis server")]
struct Args {
    /// TOML config file (defaults are used when missing)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Listen address, overrides [server].addr
    #[arg(long)]
    addr: Option<String>,
}

/// Applies one client message. Recording stop also queues the analysis
/// on a blocking worker; its report arrives on `report_tx`.
fn handle_message(
    processor: &mut FrameProcessor,
    msg: ClientMessage,
    report_tx: &mpsc::Sender<GaitReport>,
) -> Option<ServerMessage> {
    let reply = match msg {
        ClientMessage::Frame(frame) => ServerMessage::FrameResult(processor.process_frame(&frame)),
        ClientMessage::StartRecording { name } => match processor.start_recording(name.clone()) {
            Ok(()) => ServerMessage::RecordingStarted { name },
            Err(e) => ServerMessage::Rejected { reason: e.to_string() },
        },
        ClientMessage::StopRecording => match processor.stop_recording() {
            Ok(session) => {
                let reply = ServerMessage::RecordingStopped {
                    name: session.name().to_string(),
                    rows: session.rows(),
                };
                let analyzer = processor.analyzer().clone();
                let tx = report_tx.clone();
                tokio::task::spawn_blocking(move || {
                    let report = analyzer.analyze(&session);
                    if tx.blocking_send(report).is_err() {
                        warn!("client gone before analysis of '{}' finished", session.name());
                    }
                });
                reply
            }
            Err(e) => ServerMessage::Rejected { reason: e.to_string() },
        },
        ClientMessage::Bind { role, policy } => {
            processor.bind(role, policy);
            return None;
        }
    };
    Some(reply)
}

/// 復号できないメッセージは接続を切らずに拒否する
fn handle_bytes(
    processor: &mut FrameProcessor,
    bytes: &[u8],
    report_tx: &mpsc::Sender<GaitReport>,
) -> Option<ServerMessage> {
    match protocol::decode::<ClientMessage>(bytes) {
        Ok(msg) => handle_message(processor, msg, report_tx),
        Err(e) => {
            warn!("undecodable message ({} bytes): {:#}", bytes.len(), e);
            Some(ServerMessage::Rejected {
                reason: format!("undecodable message: {e}"),
            })
        }
    }
}

async fn handle_client(stream: TcpStream, config: &Config) -> Result<()> {
    let mut processor = FrameProcessor::new(config)?;
    let (mut sink, mut reader) = protocol::message_stream(stream).split();
    let (report_tx, mut report_rx) = mpsc::channel::<GaitReport>(4);

    loop {
        tokio::select! {
            result = reader.next() => {
                let bytes = match result {
                    Some(Ok(b)) => b,
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok(()),
                };
                if let Some(reply) = handle_bytes(&mut processor, &bytes, &report_tx) {
                    protocol::send_to_sink(&mut sink, &reply).await?;
                }
            }
            Some(report) = report_rx.recv() => {
                info!(
                    "analysis of '{}' ready: {} strides",
                    report.session_name,
                    report.strides.len()
                );
                protocol::send_to_sink(&mut sink, &ServerMessage::Analysis(report)).await?;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load_or_default(&args.config);
    config.validate().context("invalid configuration")?;
    let addr = args.addr.unwrap_or_else(|| config.server.addr.clone());

    info!("lab-mocap ({})", env!("GIT_VERSION"));
    info!(
        "window {:.1}s, validation {} frames, cutoff {:.1} Hz, {} points",
        config.display.window_secs,
        config.squat.validation_frames,
        config.gait.cutoff_hz,
        config.gait.resample_points
    );

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("listening on {}", addr);

    loop {
        let (stream, peer) = listener.accept().await?;
        stream.set_nodelay(true)?;
        info!("client connected: {}", peer);

        let config = config.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, &config).await {
                warn!("client {}: {:#}", peer, e);
            }
            info!("client disconnected: {}", peer);
        });
    }
}
