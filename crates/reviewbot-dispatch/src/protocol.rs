//! Gearman binary protocol framing.
//!
//! Every packet is a 12-byte header (`\0REQ` or `\0RES` magic, big-endian
//! packet type, big-endian payload size) followed by NUL-separated
//! arguments. Only the packets a job-submitting client exchanges are
//! modelled.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{DispatchError, Result};

pub const HEADER_LEN: usize = 12;

/// Upper bound on accepted payloads, to fail fast on garbage headers.
const MAX_PAYLOAD: u32 = 64 * 1024 * 1024;

/// Direction marker at the start of every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Magic {
    Request,
    Response,
}

impl Magic {
    pub fn bytes(self) -> &'static [u8; 4] {
        match self {
            Magic::Request => b"\0REQ",
            Magic::Response => b"\0RES",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    SubmitJob,
    JobCreated,
    WorkStatus,
    WorkComplete,
    WorkFail,
    Error,
    WorkException,
    WorkData,
    WorkWarning,
}

impl PacketType {
    pub fn code(self) -> u32 {
        match self {
            PacketType::SubmitJob => 7,
            PacketType::JobCreated => 8,
            PacketType::WorkStatus => 12,
            PacketType::WorkComplete => 13,
            PacketType::WorkFail => 14,
            PacketType::Error => 19,
            PacketType::WorkException => 25,
            PacketType::WorkData => 28,
            PacketType::WorkWarning => 29,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            7 => PacketType::SubmitJob,
            8 => PacketType::JobCreated,
            12 => PacketType::WorkStatus,
            13 => PacketType::WorkComplete,
            14 => PacketType::WorkFail,
            19 => PacketType::Error,
            25 => PacketType::WorkException,
            28 => PacketType::WorkData,
            29 => PacketType::WorkWarning,
            _ => return None,
        })
    }

    /// Number of arguments; the last one may itself contain NUL bytes.
    fn arg_count(self) -> usize {
        match self {
            PacketType::JobCreated | PacketType::WorkFail => 1,
            PacketType::WorkComplete
            | PacketType::Error
            | PacketType::WorkException
            | PacketType::WorkData
            | PacketType::WorkWarning => 2,
            PacketType::SubmitJob | PacketType::WorkStatus => 3,
        }
    }
}

/// A decoded packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketType,
    pub args: Vec<Vec<u8>>,
}

impl Packet {
    pub fn new(kind: PacketType, args: &[&[u8]]) -> Self {
        Self {
            kind,
            args: args.iter().map(|a| a.to_vec()).collect(),
        }
    }

    /// Argument `index` as lossy UTF-8, empty when absent.
    pub fn arg_str(&self, index: usize) -> String {
        self.args
            .get(index)
            .map(|a| String::from_utf8_lossy(a).into_owned())
            .unwrap_or_default()
    }

    pub fn encode(&self, magic: Magic) -> Vec<u8> {
        let payload = self.args.join(&0u8);
        let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
        out.extend_from_slice(magic.bytes());
        out.extend_from_slice(&self.kind.code().to_be_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&payload);
        out
    }

    pub fn decode(header: &[u8; HEADER_LEN], payload: &[u8], magic: Magic) -> Result<Self> {
        let (kind, size) = parse_header(header, magic)?;
        if payload.len() != size as usize {
            return Err(DispatchError::Protocol(format!(
                "payload length {} does not match header size {size}",
                payload.len()
            )));
        }
        let args = if payload.is_empty() {
            Vec::new()
        } else {
            payload
                .splitn(kind.arg_count(), |b| *b == 0)
                .map(<[u8]>::to_vec)
                .collect()
        };
        Ok(Self { kind, args })
    }
}

/// Validate a header and return the packet type and payload size.
pub fn parse_header(header: &[u8; HEADER_LEN], magic: Magic) -> Result<(PacketType, u32)> {
    if &header[..4] != magic.bytes() {
        return Err(DispatchError::Protocol(format!(
            "bad magic {:?}",
            String::from_utf8_lossy(&header[..4])
        )));
    }
    let code = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    let size = u32::from_be_bytes([header[8], header[9], header[10], header[11]]);
    let kind = PacketType::from_code(code)
        .ok_or_else(|| DispatchError::Protocol(format!("unexpected packet type {code}")))?;
    if size > MAX_PAYLOAD {
        return Err(DispatchError::Protocol(format!("payload of {size} bytes is too large")));
    }
    Ok((kind, size))
}

/// Read one packet carrying `magic` from `reader`.
pub async fn read_packet<R: AsyncRead + Unpin>(reader: &mut R, magic: Magic) -> Result<Packet> {
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).await?;
    let (_, size) = parse_header(&header, magic)?;
    let mut payload = vec![0u8; size as usize];
    reader.read_exact(&mut payload).await?;
    Packet::decode(&header, &payload, magic)
}

/// Write `packet` with `magic` to `writer`.
pub async fn write_packet<W: AsyncWrite + Unpin>(
    writer: &mut W,
    packet: &Packet,
    magic: Magic,
) -> Result<()> {
    writer.write_all(&packet.encode(magic)).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_job_encoding() {
        let packet = Packet::new(PacketType::SubmitJob, &[b"build:mesos", b"u1", b"{}"]);
        let bytes = packet.encode(Magic::Request);
        assert_eq!(&bytes[..4], b"\0REQ");
        assert_eq!(&bytes[4..8], &[0, 0, 0, 7]);
        assert_eq!(&bytes[8..12], &[0, 0, 0, 17]);
        assert_eq!(&bytes[12..], b"build:mesos\0u1\0{}");
    }

    #[test]
    fn test_decode_keeps_nul_in_last_argument() {
        let packet = Packet::new(PacketType::WorkComplete, &[b"H:1", b"a\0b"]);
        let bytes = packet.encode(Magic::Response);
        let header: [u8; HEADER_LEN] = bytes[..HEADER_LEN].try_into().unwrap();
        let decoded = Packet::decode(&header, &bytes[HEADER_LEN..], Magic::Response).unwrap();
        assert_eq!(decoded.args, vec![b"H:1".to_vec(), b"a\0b".to_vec()]);
        assert_eq!(decoded.arg_str(1), "a\0b");
    }

    #[test]
    fn test_wrong_magic_is_rejected() {
        let bytes = Packet::new(PacketType::JobCreated, &[b"H:1"]).encode(Magic::Request);
        let header: [u8; HEADER_LEN] = bytes[..HEADER_LEN].try_into().unwrap();
        assert!(matches!(
            parse_header(&header, Magic::Response),
            Err(DispatchError::Protocol(_))
        ));
    }

    #[test]
    fn test_unknown_packet_type_is_rejected() {
        let mut header = [0u8; HEADER_LEN];
        header[..4].copy_from_slice(b"\0RES");
        header[7] = 99;
        let err = parse_header(&header, Magic::Response).unwrap_err();
        assert!(err.to_string().contains("99"));
    }

    #[test]
    fn test_packet_type_codes_round_trip() {
        for code in [7, 8, 12, 13, 14, 19, 25, 28, 29] {
            assert_eq!(PacketType::from_code(code).unwrap().code(), code);
        }
        assert_eq!(PacketType::from_code(1), None);
    }

    #[tokio::test]
    async fn test_read_packet_from_stream() {
        let bytes = Packet::new(PacketType::JobCreated, &[b"H:host:7"]).encode(Magic::Response);
        let mut reader = std::io::Cursor::new(bytes);
        let packet = read_packet(&mut reader, Magic::Response).await.unwrap();
        assert_eq!(packet.kind, PacketType::JobCreated);
        assert_eq!(packet.arg_str(0), "H:host:7");
    }

    #[tokio::test]
    async fn test_truncated_stream_is_io_error() {
        let mut bytes = Packet::new(PacketType::JobCreated, &[b"H:1"]).encode(Magic::Response);
        bytes.truncate(14);
        let mut reader = std::io::Cursor::new(bytes);
        assert!(matches!(
            read_packet(&mut reader, Magic::Response).await,
            Err(DispatchError::Io(_))
        ));
    }
}
