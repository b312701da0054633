//! Streams a synthetic walking subject to a running `lab-mocap` server,
//! records it and prints the gait report.

use std::f64::consts::PI;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::net::TcpStream;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lab_mocap::gait::{AnalysisStatus, GaitSignal};
use lab_mocap::pose::{FrameRecord, FrameRef, Keypoint, KeypointIndex, Pose, TrackId};
use lab_mocap::protocol::{self, ClientMessage, MessageStream, ServerMessage};

#[derive(Parser, Debug)]
#[command(name = "synthetic_client")]
struct Args {
    #[arg(long, default_value = "127.0.0.1:9500")]
    addr: String,
    /// Recording length in seconds
    #[arg(long, default_value_t = 6.0)]
    seconds: f64,
    #[arg(long, default_value_t = 30.0)]
    fps: f64,
    /// Stride period in seconds
    #[arg(long, default_value_t = 1.1)]
    period: f64,
    /// Pixel noise amplitude on every keypoint
    #[arg(long, default_value_t = 1.5)]
    noise: f64,
    /// Extra bystander tracks with higher IDs
    #[arg(long, default_value_t = 1)]
    bystanders: u64,
    /// Pace frames in real time
    #[arg(long)]
    realtime: bool,
    #[arg(long, default_value_t = 7)]
    seed: u64,
}

impl Args {
    fn validate(&self) -> Result<()> {
        if !(self.noise.is_finite() && self.noise >= 0.0) {
            bail!("--noise must be a non-negative number, got {}", self.noise);
        }
        if !(self.fps.is_finite() && self.fps > 0.0) {
            bail!("--fps must be positive, got {}", self.fps);
        }
        if !(self.period.is_finite() && self.period > 0.0) {
            bail!("--period must be positive, got {}", self.period);
        }
        Ok(())
    }
}

/// 側方から見た歩行者（左脚）。足首xは周期的に前後し、接地で極小になる
fn walker_pose(t: f64, period: f64, origin_x: f64, rng: &mut StdRng, noise: f64) -> Pose {
    let phase = 2.0 * PI * t / period;
    let hip = (origin_x, 300.0);
    let thigh = 0.35 * phase.sin();
    let knee_flex = 0.45 + 0.4 * (phase + 0.8).sin();
    let knee = (hip.0 - 110.0 * thigh.sin(), hip.1 + 110.0 * thigh.cos());
    let shank = thigh - knee_flex;
    let ankle = (knee.0 - 105.0 * shank.sin(), knee.1 + 105.0 * shank.cos());

    let mut kps = [Keypoint::new(0.0, 0.0, 0.2); KeypointIndex::COUNT];
    let mut set = |idx: KeypointIndex, (x, y): (f64, f64)| {
        kps[idx as usize] = Keypoint::new(
            (x + rng.gen_range(-noise..=noise)) as f32,
            (y + rng.gen_range(-noise..=noise)) as f32,
            0.9,
        );
    };
    set(KeypointIndex::LeftShoulder, (hip.0 + 5.0, hip.1 - 160.0));
    set(KeypointIndex::LeftElbow, (hip.0 + 5.0 - 30.0 * phase.sin(), hip.1 - 85.0));
    set(KeypointIndex::LeftWrist, (hip.0 + 10.0 - 45.0 * phase.sin(), hip.1 - 15.0));
    set(KeypointIndex::LeftHip, hip);
    set(KeypointIndex::LeftKnee, knee);
    set(KeypointIndex::LeftAnkle, ankle);
    Pose::new(kps)
}

async fn expect_reply(stream: &mut MessageStream) -> Result<ServerMessage> {
    let msg: ServerMessage = protocol::recv_message(stream).await?;
    if let ServerMessage::Rejected { reason } = &msg {
        bail!("server rejected request: {}", reason);
    }
    Ok(msg)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();
    args.validate()?;

    let stream = TcpStream::connect(&args.addr)
        .await
        .with_context(|| format!("failed to connect to {}", args.addr))?;
    stream.set_nodelay(true)?;
    let mut stream = protocol::message_stream(stream);
    info!("connected to {}", args.addr);

    let start = ClientMessage::StartRecording {
        name: "synthetic-walk".into(),
    };
    protocol::send_message(&mut stream, &start).await?;
    expect_reply(&mut stream).await?;

    let mut rng = StdRng::seed_from_u64(args.seed);
    let frames = (args.seconds * args.fps).round() as u64;
    let mut validated = 0;
    for i in 0..frames {
        let t = i as f64 / args.fps;
        let mut frame = FrameRecord::new(i, t)
            .with_frame_ref(FrameRef(i))
            .with_pose(TrackId(1), walker_pose(t, args.period, 320.0, &mut rng, args.noise));
        for b in 0..args.bystanders {
            let t_b = t + 0.3 * b as f64;
            let pose = walker_pose(t_b, args.period * 0.9, 900.0, &mut rng, args.noise);
            frame = frame.with_pose(TrackId(100 + b), pose);
        }

        protocol::send_message(&mut stream, &ClientMessage::Frame(frame)).await?;
        match expect_reply(&mut stream).await? {
            ServerMessage::FrameResult(out) => validated += out.events.len(),
            other => warn!("unexpected reply: {:?}", other),
        }
        if args.realtime {
            tokio::time::sleep(Duration::from_secs_f64(1.0 / args.fps)).await;
        }
    }
    info!("sent {} frames ({} movement events)", frames, validated);

    protocol::send_message(&mut stream, &ClientMessage::StopRecording).await?;
    let report = loop {
        match expect_reply(&mut stream).await? {
            ServerMessage::RecordingStopped { name, rows } => {
                println!("Recording '{}' stopped: {} frames", name, rows.len());
            }
            ServerMessage::Analysis(report) => break report,
            other => warn!("unexpected reply: {:?}", other),
        }
    };

    println!("Sample rate: {:.2} Hz", report.sample_rate_hz);
    match report.status {
        AnalysisStatus::Complete => {}
        AnalysisStatus::InsufficientData(reason) => {
            println!("No gait metrics available: {:?}", reason);
            return Ok(());
        }
    }
    println!("Footstrikes: {:?}", report.footstrike_frames());
    println!("Strides: {}", report.strides.len());
    if let Some(timing) = &report.timing {
        println!(
            "Stride time: {:.3} ± {:.3} s ({:.1} strides/min)",
            timing.mean_secs, timing.std_secs, timing.strides_per_minute
        );
    }
    for signal in [GaitSignal::Hip, GaitSignal::Knee] {
        if let Some(band) = report.band(signal) {
            let (lo, hi) = band
                .mean
                .iter()
                .fold((f64::MAX, f64::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
            let sd = band.std.iter().sum::<f64>() / band.std.len() as f64;
            println!("{:?}: mean range {:.1}..{:.1} deg, mean SD {:.2} deg", signal, lo, hi, sd);
        }
    }
    Ok(())
}
