//! Outgoing request/response exchanges with peers.
//!
//! Every exchange uses its own TCP connection:
//! 1. Connect (bounded by the probe timeout)
//! 2. Write one framed request
//! 3. Read one framed response
//! 4. Close (the stream is dropped on every exit path)

use crate::error::{NodeError, Result};
use std::time::Duration;
use swim_core::messages::FRAME_DELIMITER;
use swim_core::{
    JoinRequest, JoinResponse, MAX_MESSAGE_SIZE, Message, MessageType, Query, QueryResponse,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Read one framed message: the tag byte, then the body up to the delimiter.
///
/// The tag is checked before the body is read, so an unknown tag fails fast
/// with `UnrecognizedMessageType`.
pub async fn read_message<R>(reader: &mut R) -> Result<Message>
where
    R: AsyncBufRead + Unpin,
{
    let tag = match reader.read_u8().await {
        Ok(tag) => tag,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(NodeError::ConnectionClosed);
        }
        Err(e) => return Err(e.into()),
    };
    let ty = MessageType::try_from(tag)?;

    let mut body = Vec::new();
    let limit = MAX_MESSAGE_SIZE as u64 + 1;
    (&mut *reader)
        .take(limit)
        .read_until(FRAME_DELIMITER, &mut body)
        .await?;

    if body.len() > MAX_MESSAGE_SIZE {
        return Err(NodeError::MessageTooLarge(body.len()));
    }
    if body.is_empty() {
        return Err(NodeError::ConnectionClosed);
    }

    Ok(Message::decode_body(ty, &body)?)
}

/// Encode and write one framed message.
pub async fn write_message<W>(writer: &mut W, message: &Message) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = message.encode()?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Client for one-shot exchanges with other nodes.
#[derive(Debug, Clone)]
pub struct Client {
    /// Bound on connecting
    connect_timeout: Duration,
}

impl Client {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Send a join request and wait for the membership snapshot.
    pub async fn join(
        &self,
        address: &str,
        request: JoinRequest,
        read_timeout: Duration,
    ) -> Result<JoinResponse> {
        match self.send(address, &request.into(), read_timeout).await? {
            Message::JoinResponse(response) => Ok(response),
            other => Err(unexpected(address, MessageType::JoinResponse, &other)),
        }
    }

    /// Send a ping or ping-req and wait for the query response.
    pub async fn query(
        &self,
        address: &str,
        query: Query,
        read_timeout: Duration,
    ) -> Result<QueryResponse> {
        match self.send(address, &query.into(), read_timeout).await? {
            Message::QueryResponse(response) => Ok(response),
            other => Err(unexpected(address, MessageType::QueryResponse, &other)),
        }
    }

    /// Send one message on a fresh connection and read one message back.
    ///
    /// `read_timeout` bounds the write plus the wait for the reply.
    pub async fn send(
        &self,
        address: &str,
        message: &Message,
        read_timeout: Duration,
    ) -> Result<Message> {
        let mut stream = self.connect(address).await?;
        debug!("Sending {:?} to {}", message.message_type(), address);

        match timeout(read_timeout, exchange(&mut stream, message)).await {
            Ok(result) => result,
            Err(_) => Err(NodeError::Timeout {
                address: address.to_string(),
            }),
        }
    }

    async fn connect(&self, address: &str) -> Result<TcpStream> {
        if address.is_empty() {
            return Err(NodeError::MissingAddress);
        }

        match timeout(self.connect_timeout, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(source)) => Err(NodeError::Connect {
                address: address.to_string(),
                source,
            }),
            Err(_) => Err(NodeError::Timeout {
                address: address.to_string(),
            }),
        }
    }
}

async fn exchange(stream: &mut TcpStream, message: &Message) -> Result<Message> {
    let (read_half, mut write_half) = stream.split();
    write_message(&mut write_half, message).await?;

    let mut reader = BufReader::new(read_half);
    read_message(&mut reader).await
}

fn unexpected(address: &str, expected: MessageType, actual: &Message) -> NodeError {
    NodeError::UnexpectedResponse {
        address: address.to_string(),
        expected,
        actual: actual.message_type(),
    }
}
