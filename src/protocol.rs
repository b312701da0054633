//! TCP protocol between the pose-estimation client and the analysis server.
//!
//! Length-delimited frames, each one bincode-encoded message.

use bytes::Bytes;
use futures::{Sink, SinkExt, StreamExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::gait::GaitReport;
use crate::pose::FrameRecord;
use crate::processor::FrameOutput;
use crate::session::SessionRow;
use crate::tracker::{BindingPolicy, Role};

// --- Message types ---

/// Client → Server
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum ClientMessage {
    /// One frame of tracker output; answered with `FrameResult`
    Frame(FrameRecord),
    StartRecording { name: String },
    /// Answered with `RecordingStopped`, later followed by `Analysis`
    StopRecording,
    /// No reply
    Bind { role: Role, policy: BindingPolicy },
}

/// Server → Client
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum ServerMessage {
    FrameResult(FrameOutput),
    RecordingStarted { name: String },
    RecordingStopped { name: String, rows: Vec<SessionRow> },
    Analysis(GaitReport),
    Rejected { reason: String },
}

// --- TCP codec helpers ---

pub type MessageStream = Framed<TcpStream, LengthDelimitedCodec>;

/// Create a framed message stream with length-delimited framing.
pub fn message_stream(stream: TcpStream) -> MessageStream {
    let codec = LengthDelimitedCodec::builder()
        .max_frame_length(16 * 1024 * 1024) // 16MB
        .new_codec();
    Framed::new(stream, codec)
}

pub fn encode<T: Serialize>(msg: &T) -> anyhow::Result<Bytes> {
    Ok(Bytes::from(bincode::serialize(msg)?))
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> anyhow::Result<T> {
    Ok(bincode::deserialize(bytes)?)
}

/// Send a serializable message (bincode + length prefix).
pub async fn send_message<T: Serialize>(
    stream: &mut MessageStream,
    msg: &T,
) -> anyhow::Result<()> {
    stream.send(encode(msg)?).await?;
    Ok(())
}

/// Send through the write half of a split stream.
pub async fn send_to_sink<S, T>(sink: &mut S, msg: &T) -> anyhow::Result<()>
where
    S: Sink<Bytes, Error = std::io::Error> + Unpin,
    T: Serialize,
{
    sink.send(encode(msg)?).await?;
    Ok(())
}

/// Receive and deserialize a message.
pub async fn recv_message<T: DeserializeOwned>(
    stream: &mut MessageStream,
) -> anyhow::Result<T> {
    match stream.next().await {
        Some(Ok(bytes)) => decode(&bytes),
        Some(Err(e)) => Err(e.into()),
        None => Err(anyhow::anyhow!("connection closed")),
    }
}
