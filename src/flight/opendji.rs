//! TCP link to the OpenDJI bridge app running on the controller's phone.
//!
//! Wire format: one ASCII command per line (`\r\n` terminated), answered by
//! exactly one line. `success` acknowledges; any other reply is a refusal.
//!
//! ```text
//! takeoff                      -> success
//! enable                       -> success
//! rc <yaw> <ascent> <roll> <pitch>
//! disable                      -> success
//! ```

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::transport::{Ack, VehicleTransport};

const REPLY_SUCCESS: &str = "success";

/// Network settings for the bridge app.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub control_port: u16,
    pub video_port: u16,
    pub connect_timeout_ms: u64,
    /// Upper bound on a single request/ack round trip.
    pub ack_timeout_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            control_port: 9998,
            video_port: 9999,
            connect_timeout_ms: 5000,
            ack_timeout_ms: 1000,
        }
    }
}

impl LinkConfig {
    /// URL of the raw video stream served by the bridge app.
    pub fn video_url(&self, host: &str) -> String {
        format!("tcp://{}:{}", host, self.video_port)
    }
}

/// Vehicle transport over the OpenDJI control socket.
pub struct OpenDjiLink {
    writer: TcpStream,
    reader: BufReader<TcpStream>,
    peer: SocketAddr,
    /// Bytes of a reply line received before a read timed out.
    partial: String,
    /// Replies still owed for requests that timed out.
    stale_replies: usize,
}

impl OpenDjiLink {
    pub fn connect(host: &str, config: &LinkConfig) -> Result<Self> {
        let peer = (host, config.control_port)
            .to_socket_addrs()
            .with_context(|| format!("Failed to resolve {}:{}", host, config.control_port))?
            .next()
            .with_context(|| format!("No address for {}:{}", host, config.control_port))?;

        let writer =
            TcpStream::connect_timeout(&peer, Duration::from_millis(config.connect_timeout_ms))
                .with_context(|| format!("Failed to connect to vehicle bridge at {}", peer))?;

        let ack_timeout = Duration::from_millis(config.ack_timeout_ms.max(1));
        writer.set_read_timeout(Some(ack_timeout))?;
        writer.set_write_timeout(Some(ack_timeout))?;
        writer.set_nodelay(true)?;
        let reader = BufReader::new(writer.try_clone()?);

        info!("Connected to vehicle bridge at {}", peer);

        Ok(Self {
            writer,
            reader,
            peer,
            partial: String::new(),
            stale_replies: 0,
        })
    }

    fn request(&mut self, command: &str) -> Result<Ack> {
        self.writer
            .write_all(format!("{}\r\n", command).as_bytes())
            .with_context(|| format!("Failed to send '{}' to {}", command, self.peer))?;

        // Late answers to timed-out requests arrive first; skip them.
        while self.stale_replies > 0 {
            let late = self.read_reply(command)?;
            debug!("Discarding late reply '{}'", late);
            self.stale_replies -= 1;
        }

        let reply = self.read_reply(command)?;
        debug!("{} -> {}", command, reply);
        Ok(parse_ack(&reply))
    }

    fn read_reply(&mut self, command: &str) -> Result<String> {
        match self.reader.read_line(&mut self.partial) {
            Ok(0) => bail!("Vehicle bridge {} closed the connection", self.peer),
            Ok(_) => {
                let line = self.partial.trim().to_string();
                self.partial.clear();
                Ok(line)
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                self.stale_replies += 1;
                warn!("No acknowledgment for '{}' from {}", command, self.peer);
                Err(e).context("acknowledgment timed out")
            }
            Err(e) => Err(e).with_context(|| format!("Failed to read reply from {}", self.peer)),
        }
    }
}

/// `rc` command with yaw rate fixed at zero.
pub fn velocity_command(ascent: f64, roll: f64, pitch: f64) -> String {
    format!("rc 0 {} {} {}", ascent, roll, pitch)
}

fn parse_ack(reply: &str) -> Ack {
    if reply.eq_ignore_ascii_case(REPLY_SUCCESS) {
        Ack::Success
    } else {
        Ack::Rejected(reply.to_string())
    }
}

impl VehicleTransport for OpenDjiLink {
    fn takeoff(&mut self) -> Result<Ack> {
        self.request("takeoff")
    }

    fn enable_control(&mut self) -> Result<Ack> {
        self.request("enable")
    }

    fn send_velocity(&mut self, ascent: f64, roll: f64, pitch: f64) -> Result<Ack> {
        self.request(&velocity_command(ascent, roll, pitch))
    }

    fn disable_control(&mut self) -> Result<Ack> {
        self.request("disable")
    }
}
