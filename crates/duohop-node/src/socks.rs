//! Destination negotiation: the SOCKS5 subset spoken on the exit side
//! (RFC 1928, CONNECT only).
//!
//! The negotiation runs once per tunnel connection, before any relaying:
//! greeting → method reply → request → (dial) → reply. Only the
//! "no authentication" method and the CONNECT command are implemented;
//! anything else closes the connection. Version or command mismatches get
//! no reply at all — the stream is simply dropped.

use std::fmt;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::SocksError;

pub const SOCKS_VERSION: u8 = 0x05;
const METHOD_NO_AUTH: u8 = 0x00;

pub const CMD_CONNECT: u8 = 0x01;

const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

/// SOCKS5 reply codes.
pub const REPLY_SUCCEEDED: u8 = 0x00;
pub const REPLY_GENERAL_FAILURE: u8 = 0x01;
pub const REPLY_HOST_UNREACHABLE: u8 = 0x04;
pub const REPLY_CONNECTION_REFUSED: u8 = 0x05;

/// Destination requested by the tunneled client.
///
/// IP literals carry their port; domain names are resolved at dial time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAddr {
    Ip(SocketAddr),
    Domain(String, u16),
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetAddr::Ip(addr) => write!(f, "{addr}"),
            TargetAddr::Domain(host, port) => write!(f, "{host}:{port}"),
        }
    }
}

/// Run the full negotiation: greeting, method reply, request parse.
///
/// On success the destination is known and the caller proceeds to dial it.
/// On any error the caller drops the stream; no reply has been written
/// (the method reply acknowledging the greeting aside).
pub async fn negotiate<S>(stream: &mut S) -> Result<TargetAddr, SocksError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    negotiate_method(stream).await?;
    read_request(stream).await
}

/// Read the client greeting and reply with NO AUTH.
///
/// The offered method list is read and discarded: authentication methods
/// are not implemented, so we select 0x00 unconditionally.
pub async fn negotiate_method<S>(stream: &mut S) -> Result<(), SocksError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut header = [0u8; 2];
    stream
        .read_exact(&mut header)
        .await
        .map_err(eof_as_truncated)?;

    if header[0] != SOCKS_VERSION {
        return Err(SocksError::InvalidVersion(header[0]));
    }

    let nmethods = header[1] as usize;
    let mut methods = vec![0u8; nmethods];
    stream
        .read_exact(&mut methods)
        .await
        .map_err(eof_as_truncated)?;

    stream
        .write_all(&[SOCKS_VERSION, METHOD_NO_AUTH])
        .await
        .map_err(SocksError::Io)?;
    Ok(())
}

/// Read the request record after the method reply.
///
/// Accepts only CONNECT; parses the destination by address type.
pub async fn read_request<S>(stream: &mut S) -> Result<TargetAddr, SocksError>
where
    S: AsyncRead + Unpin,
{
    // VER CMD RSV ATYP
    let mut header = [0u8; 4];
    stream
        .read_exact(&mut header)
        .await
        .map_err(eof_as_truncated)?;

    if header[0] != SOCKS_VERSION {
        return Err(SocksError::InvalidVersion(header[0]));
    }
    if header[1] != CMD_CONNECT {
        return Err(SocksError::UnsupportedCommand(header[1]));
    }
    // header[2] is RSV

    read_address(stream, header[3]).await
}

/// Read the destination address + port for the given address type.
async fn read_address<S>(stream: &mut S, atyp: u8) -> Result<TargetAddr, SocksError>
where
    S: AsyncRead + Unpin,
{
    match atyp {
        ATYP_IPV4 => {
            let mut buf = [0u8; 6]; // 4 addr + 2 port
            stream.read_exact(&mut buf).await.map_err(eof_as_truncated)?;
            let ip = [buf[0], buf[1], buf[2], buf[3]];
            let port = u16::from_be_bytes([buf[4], buf[5]]);
            Ok(TargetAddr::Ip(SocketAddr::from((Ipv4Addr::from(ip), port))))
        }
        ATYP_DOMAIN => {
            let mut len_buf = [0u8; 1];
            stream
                .read_exact(&mut len_buf)
                .await
                .map_err(eof_as_truncated)?;
            let domain_len = len_buf[0] as usize;
            let mut buf = vec![0u8; domain_len + 2]; // domain + port
            stream.read_exact(&mut buf).await.map_err(eof_as_truncated)?;
            let port = u16::from_be_bytes([buf[domain_len], buf[domain_len + 1]]);
            let domain = String::from_utf8(buf[..domain_len].to_vec())
                .map_err(|_| SocksError::InvalidDomain)?;
            Ok(TargetAddr::Domain(domain, port))
        }
        ATYP_IPV6 => {
            let mut buf = [0u8; 18]; // 16 addr + 2 port
            stream.read_exact(&mut buf).await.map_err(eof_as_truncated)?;
            let mut ip = [0u8; 16];
            ip.copy_from_slice(&buf[..16]);
            let port = u16::from_be_bytes([buf[16], buf[17]]);
            Ok(TargetAddr::Ip(SocketAddr::from((Ipv6Addr::from(ip), port))))
        }
        _ => Err(SocksError::UnsupportedAddressType(atyp)),
    }
}

/// Send a reply with a zeroed IPv4 bind address.
///
/// The true local endpoint of the outbound socket is never reported; every
/// reply carries the 0.0.0.0:0 placeholder. Known simplification relative
/// to full RFC 1928 compliance.
pub async fn send_reply<S>(stream: &mut S, reply: u8) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let buf = [
        SOCKS_VERSION,
        reply,
        0x00, // RSV
        ATYP_IPV4,
        0, 0, 0, 0, // BND.ADDR
        0, 0, // BND.PORT
    ];
    stream.write_all(&buf).await
}

/// Map a dial failure to the reply code written before closing.
pub fn reply_code_for_dial_error(err: &std::io::Error) -> u8 {
    match err.kind() {
        ErrorKind::ConnectionRefused => REPLY_CONNECTION_REFUSED,
        ErrorKind::TimedOut | ErrorKind::AddrNotAvailable | ErrorKind::NotFound => {
            REPLY_HOST_UNREACHABLE
        }
        _ => REPLY_GENERAL_FAILURE,
    }
}

fn eof_as_truncated(e: std::io::Error) -> SocksError {
    if e.kind() == ErrorKind::UnexpectedEof {
        SocksError::Truncated
    } else {
        SocksError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn greeting_always_selects_no_auth() {
        let (mut client, mut server) = duplex(64);
        // Client offers only GSSAPI (0x01) — we still select NO AUTH.
        client.write_all(&[0x05, 0x01, 0x01]).await.unwrap();

        negotiate_method(&mut server).await.unwrap();

        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0x00]);
    }

    #[tokio::test]
    async fn greeting_rejects_wrong_version() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&[0x04, 0x01, 0x00]).await.unwrap();

        match negotiate_method(&mut server).await {
            Err(SocksError::InvalidVersion(0x04)) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn request_parses_ipv4() {
        let mut input: &[u8] = &[0x05, 0x01, 0x00, 0x01, 10, 0, 0, 1, 0x1f, 0x90];
        let target = read_request(&mut input).await.unwrap();
        assert_eq!(
            target,
            TargetAddr::Ip(SocketAddr::from((Ipv4Addr::new(10, 0, 0, 1), 8080)))
        );
    }

    #[tokio::test]
    async fn request_parses_domain() {
        let mut record = vec![0x05, 0x01, 0x00, 0x03, 11];
        record.extend_from_slice(b"example.com");
        record.extend_from_slice(&443u16.to_be_bytes());
        let mut input: &[u8] = &record;
        let target = read_request(&mut input).await.unwrap();
        assert_eq!(target, TargetAddr::Domain("example.com".to_string(), 443));
    }

    #[tokio::test]
    async fn request_parses_ipv6() {
        let mut record = vec![0x05, 0x01, 0x00, 0x04];
        record.extend_from_slice(&Ipv6Addr::LOCALHOST.octets());
        record.extend_from_slice(&9000u16.to_be_bytes());
        let mut input: &[u8] = &record;
        let target = read_request(&mut input).await.unwrap();
        assert_eq!(
            target,
            TargetAddr::Ip(SocketAddr::from((Ipv6Addr::LOCALHOST, 9000)))
        );
    }

    #[tokio::test]
    async fn request_rejects_bind_command() {
        let mut input: &[u8] = &[0x05, 0x02, 0x00, 0x01, 127, 0, 0, 1, 0, 80];
        match read_request(&mut input).await {
            Err(SocksError::UnsupportedCommand(0x02)) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn request_rejects_unknown_address_type() {
        let mut input: &[u8] = &[0x05, 0x01, 0x00, 0x7f, 0, 0];
        match read_request(&mut input).await {
            Err(SocksError::UnsupportedAddressType(0x7f)) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn truncated_request_fails() {
        // Header claims IPv4 but only two address bytes follow.
        let mut input: &[u8] = &[0x05, 0x01, 0x00, 0x01, 10, 0];
        match read_request(&mut input).await {
            Err(SocksError::Truncated) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn reply_is_fixed_placeholder() {
        let (mut client, mut server) = duplex(64);
        send_reply(&mut server, REPLY_SUCCEEDED).await.unwrap();
        let mut buf = [0u8; 10];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0]);
    }
}
