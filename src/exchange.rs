//! Remote `getSchemaChecksums` operation.
//!
//! The server answers every `GetChecksums` frame with the complete registry
//! as a JSON object of name to hex checksum. Nothing is filtered or paged.
//! Large payloads are zstd compressed and flagged.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::checksum::Checksum;
use crate::compress::{zstd_compress, zstd_decompress};
use crate::config::ExchangeConfig;
use crate::error::{is_timeout, FrameError, TransportError};
use crate::registry::Registry;
use crate::{Flags, Frame, MsgType};

pub type ChecksumMap = BTreeMap<String, Checksum>;

/// Anything that can answer `getSchemaChecksums`.
///
/// Implemented by [`Registry`] for collocated calls and by
/// [`RemoteChecksums`] for calls over TCP.
pub trait ChecksumSource {
    fn get_schema_checksums(&self) -> Result<ChecksumMap, TransportError>;
}

impl ChecksumSource for Registry {
    fn get_schema_checksums(&self) -> Result<ChecksumMap, TransportError> {
        Ok(self.get().clone())
    }
}

impl<T: ChecksumSource + ?Sized> ChecksumSource for Arc<T> {
    fn get_schema_checksums(&self) -> Result<ChecksumMap, TransportError> {
        (**self).get_schema_checksums()
    }
}

impl<T: ChecksumSource + ?Sized> ChecksumSource for &T {
    fn get_schema_checksums(&self) -> Result<ChecksumMap, TransportError> {
        (**self).get_schema_checksums()
    }
}

/// Serialize a checksum map into a payload, compressing it when it crosses
/// the configured threshold.
pub fn encode_checksums(
    checksums: &ChecksumMap,
    config: &ExchangeConfig,
) -> io::Result<(Flags, Vec<u8>)> {
    let json = serde_json::to_vec(checksums)?;
    if json.len() > config.compress_threshold {
        Ok((Flags::ZSTD, zstd_compress(&json, config.zstd_level)?))
    } else {
        Ok((Flags::empty(), json))
    }
}

pub fn decode_checksums(frame: &Frame, max_len: u32) -> Result<ChecksumMap, TransportError> {
    let json: Cow<'_, [u8]> = if frame.hdr.flags.contains(Flags::ZSTD) {
        zstd_decompress(&frame.payload, max_len as usize)
            .map(Cow::Owned)
            .map_err(|e| TransportError::Malformed(format!("bad compressed payload: {e}")))?
    } else {
        Cow::Borrowed(frame.payload.as_slice())
    };
    serde_json::from_slice(&json)
        .map_err(|e| TransportError::Malformed(format!("bad checksum payload: {e}")))
}

/// TCP server exposing a registry to peers.
pub struct ExchangeServer {
    listener: TcpListener,
    registry: Arc<Registry>,
    config: ExchangeConfig,
    active: Arc<AtomicUsize>,
}

/// Holds one slot of `max_connections` until the connection thread ends.
struct ConnectionSlot(Arc<AtomicUsize>);

impl ConnectionSlot {
    fn acquire(active: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .ok()
            .map(|_| ConnectionSlot(Arc::clone(active)))
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl ExchangeServer {
    pub fn bind(config: ExchangeConfig, registry: Arc<Registry>) -> io::Result<Self> {
        let listener = TcpListener::bind(&config.addr)?;
        info!(addr = %listener.local_addr()?, types = registry.len(), "checksum exchange listening");
        Ok(Self {
            listener,
            registry,
            config,
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever, one thread each. Connections beyond
    /// `max_connections` are closed right after accept.
    pub fn serve(&self) -> io::Result<()> {
        for stream in self.listener.incoming() {
            let stream = match stream {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    continue;
                }
            };
            let Some(slot) = ConnectionSlot::acquire(&self.active, self.config.max_connections)
            else {
                warn!(
                    peer = ?stream.peer_addr().ok(),
                    limit = self.config.max_connections,
                    "connection limit reached, refusing peer"
                );
                continue;
            };
            let registry = Arc::clone(&self.registry);
            let config = self.config.clone();
            thread::spawn(move || {
                let _slot = slot;
                serve_connection(stream, &registry, &config)
            });
        }
        Ok(())
    }

    /// Accept a single connection and serve it on the calling thread until
    /// the peer disconnects.
    pub fn serve_one(&self) -> io::Result<()> {
        let (stream, _) = self.listener.accept()?;
        serve_connection(stream, &self.registry, &self.config);
        Ok(())
    }
}

fn serve_connection(mut stream: TcpStream, registry: &Registry, config: &ExchangeConfig) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    debug!(%peer, "peer connected");

    if let Err(e) = stream
        .set_read_timeout(Some(config.timeout()))
        .and_then(|_| stream.set_write_timeout(Some(config.timeout())))
    {
        warn!(%peer, error = %e, "failed to set socket timeouts");
        return;
    }

    loop {
        let request = match Frame::read_from(&mut stream, config.max_frame_len) {
            Ok(frame) => frame,
            Err(FrameError::Truncated(e)) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(FrameError::Truncated(e)) if is_timeout(&e) => {
                debug!(%peer, "idle connection timed out");
                break;
            }
            Err(e) => {
                warn!(%peer, error = %e, "dropping connection after bad frame");
                break;
            }
        };

        let response = respond(&request, registry, config);
        if let Err(e) = response.write_to(&mut stream) {
            warn!(%peer, error = %e, "failed to write response");
            break;
        }
    }
    debug!(%peer, "peer disconnected");
}

fn respond(request: &Frame, registry: &Registry, config: &ExchangeConfig) -> Frame {
    let id = request.hdr.request_id;
    match request.hdr.mtype {
        MsgType::GetChecksums => match encode_checksums(registry.get(), config) {
            Ok((_, payload)) if payload.len() > config.max_frame_len as usize => {
                warn!(request_id = id, bytes = payload.len(), limit = config.max_frame_len, "checksum payload exceeds frame limit");
                Frame::new(
                    MsgType::Error,
                    id,
                    format!(
                        "checksum payload of {} bytes exceeds frame limit of {}",
                        payload.len(),
                        config.max_frame_len
                    )
                    .into_bytes(),
                )
            }
            Ok((flags, payload)) => {
                debug!(request_id = id, types = registry.len(), bytes = payload.len(), "serving checksums");
                let mut frame = Frame::new(MsgType::Checksums, id, payload);
                frame.hdr.flags = flags;
                frame
            }
            Err(e) => Frame::new(MsgType::Error, id, e.to_string().into_bytes()),
        },
        other => Frame::new(
            MsgType::Error,
            id,
            format!("unexpected message type {:?}", other).into_bytes(),
        ),
    }
}

/// Client side of the exchange. Opens one connection per call and never
/// retries; every failure is returned to the caller.
#[derive(Clone, Debug)]
pub struct RemoteChecksums {
    addr: String,
    config: ExchangeConfig,
}

impl RemoteChecksums {
    pub fn new(addr: impl Into<String>, config: ExchangeConfig) -> Self {
        Self {
            addr: addr.into(),
            config,
        }
    }

    pub fn from_config(config: ExchangeConfig) -> Self {
        Self::new(config.addr.clone(), config)
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn connect(&self) -> Result<TcpStream, TransportError> {
        let mut last = None;
        for addr in self.addr.to_socket_addrs().map_err(io_error)? {
            match TcpStream::connect_timeout(&addr, self.config.timeout()) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(self.config.timeout())).map_err(io_error)?;
                    stream.set_write_timeout(Some(self.config.timeout())).map_err(io_error)?;
                    return Ok(stream);
                }
                Err(e) => last = Some(e),
            }
        }
        Err(match last {
            Some(e) => io_error(e),
            None => TransportError::Io(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("{} resolved to no addresses", self.addr),
            )),
        })
    }
}

impl ChecksumSource for RemoteChecksums {
    fn get_schema_checksums(&self) -> Result<ChecksumMap, TransportError> {
        let mut stream = self.connect()?;
        let request_id: u32 = rand::thread_rng().gen();

        Frame::new(MsgType::GetChecksums, request_id, Vec::new())
            .write_to(&mut stream)
            .map_err(io_error)?;

        let response = Frame::read_from(&mut stream, self.config.max_frame_len)?;
        if response.hdr.request_id != request_id {
            return Err(TransportError::Malformed(format!(
                "response id {:#x} does not match request id {:#x}",
                response.hdr.request_id, request_id
            )));
        }

        match response.hdr.mtype {
            MsgType::Checksums => {
                let checksums = decode_checksums(&response, self.config.max_frame_len)?;
                debug!(peer = %self.addr, types = checksums.len(), "received checksums");
                Ok(checksums)
            }
            MsgType::Error => Err(TransportError::Remote(
                String::from_utf8_lossy(&response.payload).into_owned(),
            )),
            MsgType::GetChecksums => Err(TransportError::Malformed(
                "peer answered with a request frame".to_string(),
            )),
        }
    }
}

fn io_error(e: io::Error) -> TransportError {
    if is_timeout(&e) {
        TransportError::Timeout
    } else {
        TransportError::Io(e)
    }
}
