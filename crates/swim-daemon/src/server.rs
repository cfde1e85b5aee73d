//! Inbound request handling.
//!
//! Each accepted connection carries exactly one request and gets at most one
//! response on the same connection. Connections are served on their own task,
//! so a slow ping-req does not hold up the accept loop.
//!
//! A malformed or unrecognized request only drops its own connection. An
//! accept failure stops the node.

use crate::client::{read_message, write_message};
use crate::error::{NodeError, Result};
use crate::node::{Node, NodeState, stopped};
use std::net::SocketAddr;
use swim_core::{
    CodecError, JoinRequest, JoinResponse, Member, Message, Query, QueryKind, QueryResponse,
};
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

impl Node {
    /// Accept and serve inbound connections until the node is shut down.
    ///
    /// Returns immediately if the node is already stopped. Returns an error if
    /// accepting fails; the node is stopped in that case.
    pub async fn listen(&self) -> Result<()> {
        if self.state() == NodeState::Stopped {
            debug!("Node {} stopped before listening", self.local_addr());
            return Ok(());
        }

        let listener = self
            .inner
            .listener
            .lock()
            .await
            .take()
            .ok_or(NodeError::NotStarted)?;

        let mut state = self.watch_state();
        if self.state() == NodeState::Listening {
            self.set_state(NodeState::Running);
        }
        debug!("Accepting connections on {}", self.local_addr());

        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = stopped(&mut state) => {
                    debug!("Listener on {} closed", self.local_addr());
                    return Ok(());
                }
            };

            let (stream, addr) = match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    self.shutdown();
                    return Err(e.into());
                }
            };

            let node = self.clone();
            tokio::spawn(async move {
                if let Err(e) = node.serve_connection(stream, addr).await {
                    match e {
                        NodeError::Codec(CodecError::UnrecognizedMessageType(tag)) => {
                            warn!("Unrecognized message type {:#04x} from {}", tag, addr);
                        }
                        NodeError::ConnectionClosed => {
                            debug!("Connection from {} closed before a request", addr);
                        }
                        e => warn!("Dropping connection from {}: {}", addr, e),
                    }
                }
            });
        }
    }

    /// Read one request, dispatch it, write the response.
    async fn serve_connection(&self, mut stream: TcpStream, addr: SocketAddr) -> Result<()> {
        let (read_half, mut write_half) = stream.split();
        let mut reader = BufReader::new(read_half);

        let request = timeout(
            self.inner.config.detector.probe_timeout,
            read_message(&mut reader),
        )
        .await
        .map_err(|_| NodeError::Timeout {
            address: addr.to_string(),
        })??;
        let ty = request.message_type();
        debug!("Received {:?} from {}", ty, addr);

        let response = match request {
            Message::Join(req) => self.handle_join(req).await,
            Message::Query(query) => match query.name {
                QueryKind::Ping => self.handle_ping(query).await,
                QueryKind::PingReq => self.handle_ping_req(query).await,
            },
            Message::JoinResponse(_) | Message::QueryResponse(_) => {
                debug!("Ignoring unsolicited {:?} from {}", ty, addr);
                return Ok(());
            }
        };

        write_message(&mut write_half, &response).await
    }

    async fn handle_join(&self, req: JoinRequest) -> Message {
        let member = Member::new(req.name, req.address);
        let mut members = self.inner.members.lock().await;

        if members.add(member.clone()) {
            info!("Join: member {}", member);
        }

        JoinResponse {
            members: members.clone(),
        }
        .into()
    }

    async fn handle_ping(&self, query: Query) -> Message {
        let mut members = self.inner.members.lock().await;
        members.merge(&query.updates);

        QueryResponse {
            updates: members.pending().to_vec(),
            ack: true,
        }
        .into()
    }

    async fn handle_ping_req(&self, query: Query) -> Message {
        self.inner.members.lock().await.merge(&query.updates);

        let ack = match query.target_address() {
            Ok(target) => match self.ping(&target).await {
                Ok(()) => true,
                Err(e) => {
                    debug!("Ping-req: {} unreachable: {}", target, e);
                    false
                }
            },
            Err(e) => {
                warn!("Ping-req with unusable target: {}", e);
                false
            }
        };

        QueryResponse {
            updates: self.pending_updates().await,
            ack,
        }
        .into()
    }
}
