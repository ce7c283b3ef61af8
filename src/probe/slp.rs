//! Server List Ping probe implementation.
//!
//! Speaks the Minecraft status protocol over TCP: handshake, status
//! request, JSON status response, then a ping/pong to measure latency.
//! Packets are framed as `varint length | varint id | payload`.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use unsigned_varint::{decode as varint_decode, encode as varint_encode};

use super::{ProbeError, ServerStatus, StatusProbe};

/// Protocol version sent in the handshake; -1 asks the server for its own.
const HANDSHAKE_PROTOCOL: i32 = -1;

/// Next-state value requesting status.
const NEXT_STATE_STATUS: u32 = 1;

/// Upper bound on a status packet (favicons make these large).
const MAX_PACKET_LEN: usize = 2 * 1024 * 1024;

const PACKET_STATUS: u32 = 0x00;
const PACKET_PING: u32 = 0x01;

/// Status probe using the Server List Ping protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlpProbe;

#[async_trait]
impl StatusProbe for SlpProbe {
    async fn query(&self, host: &str, port: u16, timeout: Duration) -> Result<ServerStatus, ProbeError> {
        tokio::time::timeout(timeout, run_slp_probe(host, port))
            .await
            .map_err(|_| ProbeError::Timeout(timeout))?
    }
}

/// Run a status query against `host:port`.
pub async fn run_slp_probe(host: &str, port: u16) -> Result<ServerStatus, ProbeError> {
    let mut stream = TcpStream::connect((host, port))
        .await
        .map_err(|e| ProbeError::Network(format!("failed to connect: {}", e)))?;
    stream.set_nodelay(true).ok();

    exchange(&mut stream, host, port).await
}

/// Run the handshake/status/ping exchange on an established stream.
async fn exchange<S>(stream: &mut S, host: &str, port: u16) -> Result<ServerStatus, ProbeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let start = Instant::now();

    write_packet(stream, &build_handshake(host, port)).await?;
    write_packet(stream, &build_packet(PACKET_STATUS, &[])).await?;

    let (id, body) = read_packet(stream).await?;
    if id != PACKET_STATUS {
        return Err(ProbeError::Protocol(format!("unexpected packet id {:#04x}", id)));
    }
    let json = read_string(&body)?;
    let status_rtt = start.elapsed();

    let response: StatusResponse = serde_json::from_str(json)
        .map_err(|e| ProbeError::Protocol(format!("malformed status JSON: {}", e)))?;

    // Some servers close the connection instead of answering the ping.
    let latency = match ping(stream).await {
        Ok(latency) => latency,
        Err(e) => {
            tracing::debug!("Ping to {}:{} failed, using status round trip: {}", host, port, e);
            status_rtt
        }
    };

    Ok(response.into_status(latency))
}

async fn ping<S>(stream: &mut S) -> Result<Duration, ProbeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let token: i64 = rand::random();
    let start = Instant::now();

    write_packet(stream, &build_packet(PACKET_PING, &token.to_be_bytes())).await?;
    let (id, body) = read_packet(stream).await?;
    let elapsed = start.elapsed();

    if id != PACKET_PING || body.len() != 8 || body[..] != token.to_be_bytes() {
        return Err(ProbeError::Protocol("pong does not match ping".to_string()));
    }

    Ok(elapsed)
}

/// Build the handshake packet for a status request.
fn build_handshake(host: &str, port: u16) -> Vec<u8> {
    let mut data = Vec::with_capacity(host.len() + 16);
    push_varint(&mut data, HANDSHAKE_PROTOCOL as u32);
    push_varint(&mut data, host.len() as u32);
    data.extend_from_slice(host.as_bytes());
    data.extend_from_slice(&port.to_be_bytes());
    push_varint(&mut data, NEXT_STATE_STATUS);

    build_packet(0x00, &data)
}

/// Frame a packet: varint length, varint id, payload.
fn build_packet(id: u32, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(payload.len() + 5);
    push_varint(&mut body, id);
    body.extend_from_slice(payload);

    let mut packet = Vec::with_capacity(body.len() + 5);
    push_varint(&mut packet, body.len() as u32);
    packet.extend_from_slice(&body);
    packet
}

fn push_varint(out: &mut Vec<u8>, value: u32) {
    let mut buf = varint_encode::u32_buffer();
    out.extend_from_slice(varint_encode::u32(value, &mut buf));
}

async fn write_packet<W: AsyncWrite + Unpin>(w: &mut W, packet: &[u8]) -> Result<(), ProbeError> {
    w.write_all(packet)
        .await
        .map_err(|e| ProbeError::Network(format!("failed to send: {}", e)))?;
    w.flush()
        .await
        .map_err(|e| ProbeError::Network(format!("failed to send: {}", e)))
}

/// Read one framed packet and return its id and payload.
async fn read_packet<R: AsyncRead + Unpin>(r: &mut R) -> Result<(u32, Vec<u8>), ProbeError> {
    let len = read_varint(r).await? as usize;
    if len == 0 || len > MAX_PACKET_LEN {
        return Err(ProbeError::Protocol(format!("invalid packet length: {}", len)));
    }

    let mut data = vec![0u8; len];
    r.read_exact(&mut data)
        .await
        .map_err(|e| ProbeError::Network(format!("failed to recv: {}", e)))?;

    let (id, rest) = varint_decode::u32(&data)
        .map_err(|e| ProbeError::Protocol(format!("bad packet id: {}", e)))?;
    Ok((id, rest.to_vec()))
}

async fn read_varint<R: AsyncRead + Unpin>(r: &mut R) -> Result<u32, ProbeError> {
    let mut buf = [0u8; 5];
    for i in 0..buf.len() {
        buf[i] = r
            .read_u8()
            .await
            .map_err(|e| ProbeError::Network(format!("failed to recv: {}", e)))?;
        if buf[i] & 0x80 == 0 {
            let (value, _) = varint_decode::u32(&buf[..=i])
                .map_err(|e| ProbeError::Protocol(format!("bad varint: {}", e)))?;
            return Ok(value);
        }
    }
    Err(ProbeError::Protocol("varint longer than 5 bytes".to_string()))
}

/// Decode a varint-prefixed UTF-8 string.
fn read_string(data: &[u8]) -> Result<&str, ProbeError> {
    let (len, rest) = varint_decode::u32(data)
        .map_err(|e| ProbeError::Protocol(format!("bad string length: {}", e)))?;
    let bytes = rest
        .get(..len as usize)
        .ok_or_else(|| ProbeError::Protocol("string runs past end of packet".to_string()))?;
    std::str::from_utf8(bytes).map_err(|e| ProbeError::Protocol(format!("invalid UTF-8: {}", e)))
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    version: Option<VersionInfo>,
    #[serde(default)]
    players: Option<PlayersInfo>,
    #[serde(default)]
    description: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct VersionInfo {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct PlayersInfo {
    #[serde(default)]
    online: u32,
    #[serde(default)]
    max: u32,
}

impl StatusResponse {
    fn into_status(self, latency: Duration) -> ServerStatus {
        let players = self.players.unwrap_or(PlayersInfo { online: 0, max: 0 });
        let mut text = String::new();
        flatten_text(&self.description, &mut text);

        ServerStatus {
            players: players.online,
            max_players: players.max,
            version: self.version.map(|v| strip_formatting(&v.name)).unwrap_or_default(),
            motd: clean_motd(&text),
            latency_ms: latency.as_millis() as u64,
        }
    }
}

/// Flatten a chat component (string, object with `text`/`extra`, or array).
fn flatten_text(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::String(s) => out.push_str(s),
        serde_json::Value::Array(items) => items.iter().for_each(|v| flatten_text(v, out)),
        serde_json::Value::Object(map) => {
            if let Some(text) = map.get("text") {
                flatten_text(text, out);
            }
            if let Some(extra) = map.get("extra") {
                flatten_text(extra, out);
            }
        }
        _ => {}
    }
}

fn formatting_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)§[0-9a-fk-orx]").expect("valid formatting regex"))
}

fn strip_formatting(s: &str) -> String {
    formatting_regex().replace_all(s, "").into_owned()
}

/// Remove formatting codes and trim each line.
fn clean_motd(s: &str) -> String {
    strip_formatting(s)
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
