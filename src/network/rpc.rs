//! RPC message catalogue and the self-describing envelope codec.
//!
//! Every message travels as an [`Envelope`] carrying the registered name of
//! its payload type next to the encoded payload, so a receiver can decode a
//! polymorphic message without knowing its type up front. The name-to-decoder
//! mapping lives in an explicit [`MessageRegistry`] built once at startup.

use crate::counter::CounterCommand;
use crate::error::NetworkError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Default upper bound for a single frame.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

pub const NAME_INDIRECT_REQUEST: &str = "counterdb.NQ";
pub const NAME_DIRECT_REQUEST: &str = "counterdb.MQ";
pub const NAME_DIRECT_RESPONSE: &str = "counterdb.MR";
pub const NAME_REPLICATION_REQUEST: &str = "counterdb.SQ";
pub const NAME_REPLICATION_RESPONSE: &str = "counterdb.SR";
pub const NAME_EMPTY: &str = "counterdb.X";

/// All messages exchanged between nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Request that may land on any node; forwarded to the master.
    Indirect(IndirectRequest),

    /// Request that must land on the master for its key.
    Direct(DirectRequest),

    /// Answer to a direct or indirect request.
    DirectResponse(DirectResponse),

    /// New value pushed from a master to a replica.
    Replication(ReplicationRequest),

    /// Answer to a replication push.
    ReplicationResponse(ReplicationResponse),

    /// Inert acknowledgment.
    Empty,
}

impl Message {
    /// Registered envelope name of this message kind.
    pub fn name(&self) -> &'static str {
        match self {
            Message::Indirect(_) => NAME_INDIRECT_REQUEST,
            Message::Direct(_) => NAME_DIRECT_REQUEST,
            Message::DirectResponse(_) => NAME_DIRECT_RESPONSE,
            Message::Replication(_) => NAME_REPLICATION_REQUEST,
            Message::ReplicationResponse(_) => NAME_REPLICATION_RESPONSE,
            Message::Empty => NAME_EMPTY,
        }
    }

    fn encode_body(&self) -> Result<Vec<u8>, bincode::Error> {
        match self {
            Message::Indirect(m) => bincode::serialize(m),
            Message::Direct(m) => bincode::serialize(m),
            Message::DirectResponse(m) => bincode::serialize(m),
            Message::Replication(m) => bincode::serialize(m),
            Message::ReplicationResponse(m) => bincode::serialize(m),
            Message::Empty => Ok(Vec::new()),
        }
    }
}

/// `{key, command, args}` addressed to the key's master.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectRequest {
    pub key: Vec<u8>,
    /// Command name; see [`CounterCommand::name`].
    pub command: String,
    pub args: Vec<u8>,
}

impl DirectRequest {
    pub fn new(key: impl Into<Vec<u8>>, command: CounterCommand, args: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            command: command.name().to_string(),
            args,
        }
    }

    /// The parsed command, or `None` when the name is not recognized.
    pub fn command(&self) -> Option<CounterCommand> {
        CounterCommand::from_name(&self.command)
    }
}

/// Wraps a [`DirectRequest`] so that any node may receive it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndirectRequest {
    pub to_master: DirectRequest,
}

impl IndirectRequest {
    pub fn new(to_master: DirectRequest) -> Self {
        Self { to_master }
    }
}

/// Outcome codes carried in [`DirectResponse::errno`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DirectStatus {
    Ok = 0,
    /// The ring is empty.
    NoRing = 1,
    /// The storage transaction failed.
    IoError = 2,
    /// The transaction committed without performing the write.
    UpdateFailed = 3,
    /// The receiver does not own the key.
    NotMaster = 4,
    /// Forwarding to the master failed.
    NetworkError = 5,
    /// Any other code received from a peer.
    Unknown = 255,
}

impl DirectStatus {
    pub fn from_errno(errno: u8) -> Self {
        match errno {
            0 => DirectStatus::Ok,
            1 => DirectStatus::NoRing,
            2 => DirectStatus::IoError,
            3 => DirectStatus::UpdateFailed,
            4 => DirectStatus::NotMaster,
            5 => DirectStatus::NetworkError,
            _ => DirectStatus::Unknown,
        }
    }

    pub fn errno(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for DirectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// `{errno, result}`; `result` is the command's encoded result on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectResponse {
    pub errno: u8,
    pub result: Vec<u8>,
}

impl DirectResponse {
    pub fn ok(result: Vec<u8>) -> Self {
        Self { errno: 0, result }
    }

    pub fn error(status: DirectStatus) -> Self {
        Self {
            errno: status.errno(),
            result: Vec::new(),
        }
    }

    pub fn status(&self) -> DirectStatus {
        DirectStatus::from_errno(self.errno)
    }

    pub fn is_ok(&self) -> bool {
        self.errno == 0
    }
}

/// `{key, value}` where `value` is an encoded counter entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationRequest {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Outcome codes carried in [`ReplicationResponse::errno`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReplicationStatus {
    Ok = 0,
    IoError = 1,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationResponse {
    pub errno: u8,
}

impl ReplicationResponse {
    pub fn new(status: ReplicationStatus) -> Self {
        Self {
            errno: status as u8,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.errno == ReplicationStatus::Ok as u8
    }
}

/// `{name, body}` wrapper written on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    name: String,
    body: Vec<u8>,
}

type Decoder = fn(&[u8]) -> Result<Message, bincode::Error>;

/// Maps envelope names to payload decoders.
#[derive(Clone, Default)]
pub struct MessageRegistry {
    decoders: HashMap<String, Decoder>,
}

impl fmt::Debug for MessageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.decoders.keys().collect();
        names.sort();
        f.debug_struct("MessageRegistry").field("names", &names).finish()
    }
}

impl MessageRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the full counter store catalogue.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(NAME_INDIRECT_REQUEST, |b| {
            bincode::deserialize(b).map(Message::Indirect)
        });
        registry.register(NAME_DIRECT_REQUEST, |b| {
            bincode::deserialize(b).map(Message::Direct)
        });
        registry.register(NAME_DIRECT_RESPONSE, |b| {
            bincode::deserialize(b).map(Message::DirectResponse)
        });
        registry.register(NAME_REPLICATION_REQUEST, |b| {
            bincode::deserialize(b).map(Message::Replication)
        });
        registry.register(NAME_REPLICATION_RESPONSE, |b| {
            bincode::deserialize(b).map(Message::ReplicationResponse)
        });
        registry.register(NAME_EMPTY, |_| Ok(Message::Empty));
        registry
    }

    /// Register a decoder under a globally unique name, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, decoder: Decoder) {
        self.decoders.insert(name.into(), decoder);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.decoders.contains_key(name)
    }

    /// Encode a message into an envelope.
    pub fn encode(&self, msg: &Message) -> Result<Vec<u8>, NetworkError> {
        let name = msg.name();
        if !self.contains(name) {
            return Err(NetworkError::UnknownMessage(name.to_string()));
        }
        let envelope = Envelope {
            name: name.to_string(),
            body: msg.encode_body()?,
        };
        Ok(bincode::serialize(&envelope)?)
    }

    /// Decode an envelope by dispatching on its name.
    pub fn decode(&self, data: &[u8]) -> Result<Message, NetworkError> {
        let envelope: Envelope = bincode::deserialize(data)?;
        let decoder = self
            .decoders
            .get(&envelope.name)
            .ok_or_else(|| NetworkError::UnknownMessage(envelope.name.clone()))?;
        Ok(decoder(&envelope.body)?)
    }
}

/// Prefix `data` with its big-endian `u32` length.
pub fn frame(data: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(4 + data.len());
    framed.extend_from_slice(&(data.len() as u32).to_be_bytes());
    framed.extend_from_slice(data);
    framed
}

/// Write one length-prefixed frame.
pub async fn write_frame<W>(writer: &mut W, data: &[u8]) -> Result<(), NetworkError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&frame(data)).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed frame. Returns `None` on a clean end of stream.
pub async fn read_frame<R>(reader: &mut R, max_size: usize) -> Result<Option<Vec<u8>>, NetworkError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(NetworkError::Io(e)),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_size {
        return Err(NetworkError::ReceiveFailed(format!(
            "frame of {} bytes exceeds limit of {}",
            len, max_size
        )));
    }

    let mut data = vec![0u8; len];
    reader.read_exact(&mut data).await?;
    Ok(Some(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_dispatch() {
        let registry = MessageRegistry::standard();
        let msg = Message::Indirect(IndirectRequest::new(DirectRequest::new(
            b"k".to_vec(),
            CounterCommand::Increment,
            Vec::new(),
        )));

        let encoded = registry.encode(&msg).unwrap();
        assert_eq!(registry.decode(&encoded).unwrap(), msg);

        let empty = registry.encode(&Message::Empty).unwrap();
        assert_eq!(registry.decode(&empty).unwrap(), Message::Empty);
    }

    #[test]
    fn test_unregistered_name_is_rejected() {
        let mut partial = MessageRegistry::new();
        partial.register(NAME_EMPTY, |_| Ok(Message::Empty));

        let msg = Message::Replication(ReplicationRequest {
            key: b"k".to_vec(),
            value: vec![1, 2, 3],
        });
        assert!(matches!(
            partial.encode(&msg),
            Err(NetworkError::UnknownMessage(name)) if name == NAME_REPLICATION_REQUEST
        ));

        let encoded = MessageRegistry::standard().encode(&msg).unwrap();
        assert!(matches!(
            partial.decode(&encoded),
            Err(NetworkError::UnknownMessage(_))
        ));
    }

    #[test]
    fn test_direct_status_codes() {
        assert_eq!(DirectResponse::error(DirectStatus::NoRing).errno, 1);
        assert_eq!(DirectResponse::error(DirectStatus::IoError).errno, 2);
        assert_eq!(DirectResponse::error(DirectStatus::UpdateFailed).errno, 3);
        assert_eq!(DirectResponse::error(DirectStatus::NotMaster).errno, 4);
        assert_eq!(DirectResponse::error(DirectStatus::NetworkError).errno, 5);
        assert_eq!(DirectStatus::from_errno(42), DirectStatus::Unknown);
        assert!(DirectResponse::ok(vec![7]).is_ok());
        assert_eq!(ReplicationResponse::new(ReplicationStatus::IoError).errno, 1);
    }

    #[test]
    fn test_unknown_command_name() {
        let req = DirectRequest {
            key: b"k".to_vec(),
            command: "Explode".to_string(),
            args: Vec::new(),
        };
        assert!(req.command().is_none());
    }

    #[tokio::test]
    async fn test_frame_roundtrip_over_stream() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        write_frame(&mut a, b"hello").await.unwrap();
        drop(a);

        let data = read_frame(&mut b, 1024).await.unwrap();
        assert_eq!(data.as_deref(), Some(&b"hello"[..]));
        assert!(read_frame(&mut b, 1024).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        write_frame(&mut a, &[0u8; 64]).await.unwrap();
        assert!(read_frame(&mut b, 16).await.is_err());
    }
}
