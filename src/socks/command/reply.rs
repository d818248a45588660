//! SOCKS5 reply builder
//!
//! Constructs SOCKS5 reply messages.

use crate::error::Socks5ReplyCode;
use crate::socks::consts::*;
use crate::socks::types::TargetAddr;
use anyhow::Result;
use bytes::{BufMut, BytesMut};
use std::net::SocketAddr;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Encode a SOCKS5 reply
///
/// # SOCKS5 Reply Format
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// A missing bind address is reported as `0.0.0.0:0`.
pub fn encode_reply(reply_code: Socks5ReplyCode, bind_addr: Option<SocketAddr>) -> BytesMut {
    let bind_addr = bind_addr.map(TargetAddr::Ip).unwrap_or_default();

    let mut reply = BytesMut::with_capacity(3 + bind_addr.encoded_len());
    reply.put_u8(SOCKS5_VERSION);
    reply.put_u8(reply_code.into());
    reply.put_u8(SOCKS5_RESERVED);
    bind_addr.write_to(&mut reply);
    reply
}

/// Build and send a SOCKS5 reply
pub async fn build_reply<S>(
    stream: &mut S,
    reply_code: Socks5ReplyCode,
    bind_addr: Option<SocketAddr>,
) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let reply = encode_reply(reply_code, bind_addr);

    stream.write_all(&reply).await?;
    stream.flush().await?;

    Ok(())
}

/// Send a success reply
pub async fn send_success<S>(stream: &mut S, bind_addr: Option<SocketAddr>) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    build_reply(stream, Socks5ReplyCode::Succeeded, bind_addr).await
}

/// Send a failure reply with a zeroed bind address
pub async fn send_failure<S>(stream: &mut S, reply_code: Socks5ReplyCode) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    build_reply(stream, reply_code, None).await
}
