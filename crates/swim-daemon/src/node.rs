//! The SWIM protocol engine.
//!
//! A [`Node`] owns the local membership log and drives the protocol:
//! - `start` binds the listener, registers ourselves and launches gossip
//! - `join` adopts the membership snapshot of a seed node
//! - `ping` / `ping_req` are the direct and indirect probes
//! - `listen` (see `server`) answers inbound requests
//!
//! The log sits behind a single async mutex shared by the accept loop, the
//! gossip loop and probe tasks. The lock is never held across network I/O.

use crate::client::Client;
use crate::config::NodeConfig;
use crate::error::{NodeError, Result};
use crate::gossip;
use std::net::SocketAddr;
use std::sync::Arc;
use swim_core::{JoinRequest, Member, MembershipLog, Query, Update};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info};

/// Lifecycle of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Shut down (or never started)
    Stopped,
    /// Bound and gossiping, not yet serving or joined
    Listening,
    /// Waiting for a seed's membership snapshot
    Joining,
    /// Serving requests as a cluster member
    Running,
}

/// Handle to a running SWIM node. Cheap to clone.
#[derive(Clone)]
pub struct Node {
    pub(crate) inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) config: NodeConfig,
    /// Our own identity, as advertised to peers
    pub(crate) local: Member,
    pub(crate) local_addr: SocketAddr,
    pub(crate) members: Mutex<MembershipLog>,
    pub(crate) client: Client,
    /// Taken by `listen`
    pub(crate) listener: Mutex<Option<TcpListener>>,
    pub(crate) state: watch::Sender<NodeState>,
}

impl Node {
    /// Bind the listener, add ourselves to the membership log and start gossiping.
    pub async fn start(config: NodeConfig) -> Result<Self> {
        config.validate()?;

        let listener = TcpListener::bind(&config.bind_address)
            .await
            .map_err(|source| NodeError::Bind {
                address: config.bind_address.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let address = config
            .advertise_address
            .clone()
            .unwrap_or_else(|| local_addr.to_string());
        let local = Member::from_address(address);

        let mut members = MembershipLog::new(config.detector.max_rounds);
        members.add(local.clone());

        let (state, _) = watch::channel(NodeState::Listening);
        let inner = Arc::new(Inner {
            client: Client::new(config.detector.probe_timeout),
            config,
            local,
            local_addr,
            members: Mutex::new(members),
            listener: Mutex::new(Some(listener)),
            state,
        });

        gossip::spawn(
            Arc::downgrade(&inner),
            inner.config.detector.ping_interval,
            inner.state.subscribe(),
        );

        info!(
            "Node {} started (bound to {})",
            inner.local.address, inner.local_addr
        );
        Ok(Self { inner })
    }

    /// Join a cluster through `seed`, replacing our membership log with its snapshot.
    pub async fn join(&self, seed: &str) -> Result<()> {
        if seed.is_empty() {
            return Err(NodeError::MissingAddress);
        }
        if self.state() == NodeState::Stopped {
            return Err(NodeError::NotStarted);
        }

        let previous = self.set_state(NodeState::Joining);
        let request = JoinRequest {
            name: self.inner.local.address.clone(),
            address: self.inner.local.address.clone(),
        };

        let response = match self
            .inner
            .client
            .join(seed, request, self.inner.config.detector.probe_timeout)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.set_state(previous);
                return Err(e);
            }
        };

        let count = response.members.len();
        *self.inner.members.lock().await = response.members;
        self.set_state(NodeState::Running);

        info!("Joined cluster via {} ({} members)", seed, count);
        Ok(())
    }

    /// Directly probe `address`, piggybacking our pending updates.
    ///
    /// The updates in the reply are merged into our log.
    pub async fn ping(&self, address: &str) -> Result<()> {
        let updates = self.pending_updates().await;
        let response = self
            .inner
            .client
            .query(
                address,
                Query::ping(updates),
                self.inner.config.detector.probe_timeout,
            )
            .await?;

        self.inner.members.lock().await.merge(&response.updates);
        debug!("Ping to {} acknowledged", address);
        Ok(())
    }

    /// Ask `helper` to probe `target` on our behalf.
    ///
    /// The helper's updates are merged even when it reports no ack.
    pub async fn ping_req(&self, helper: &Member, target: &Member) -> Result<()> {
        let updates = self.pending_updates().await;
        let response = self
            .inner
            .client
            .query(
                &helper.address,
                Query::ping_req(updates, &target.address),
                self.inner.config.indirect_timeout(),
            )
            .await?;

        self.inner.members.lock().await.merge(&response.updates);

        if !response.ack {
            return Err(NodeError::AckNotReceived {
                helper: helper.address.clone(),
                target: target.address.clone(),
            });
        }
        Ok(())
    }

    /// Stop gossiping and serving. In-flight handlers run to completion.
    pub fn shutdown(&self) {
        self.inner.state.send_replace(NodeState::Stopped);

        // Release the port if `listen` never took the listener
        if let Ok(mut listener) = self.inner.listener.try_lock() {
            listener.take();
        }
        info!("Node {} stopped", self.inner.local.address);
    }

    /// Add a member to the local log (self-initiated join event).
    pub async fn add_member(&self, member: Member) -> bool {
        self.inner.members.lock().await.add(member)
    }

    /// Mark a member failed in the local log (self-initiated failure event).
    pub async fn remove_member(&self, member: &Member) -> bool {
        self.inner.members.lock().await.remove(member)
    }

    /// Our identity as advertised to peers.
    pub fn local_member(&self) -> &Member {
        &self.inner.local
    }

    /// Socket address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    pub fn config(&self) -> &NodeConfig {
        &self.inner.config
    }

    pub fn state(&self) -> NodeState {
        *self.inner.state.borrow()
    }

    /// Subscribe to state transitions.
    pub fn watch_state(&self) -> watch::Receiver<NodeState> {
        self.inner.state.subscribe()
    }

    /// Alive members, sorted by address.
    pub async fn alive_members(&self) -> Vec<Member> {
        let members = self.inner.members.lock().await;
        sorted(members.alive())
    }

    /// Failed members, sorted by address.
    pub async fn failed_members(&self) -> Vec<Member> {
        let members = self.inner.members.lock().await;
        sorted(members.failed())
    }

    /// Updates waiting to be piggybacked, oldest first.
    pub async fn pending_updates(&self) -> Vec<Update> {
        self.inner.members.lock().await.pending().to_vec()
    }

    /// Copy of the whole membership log.
    pub async fn membership(&self) -> MembershipLog {
        self.inner.members.lock().await.clone()
    }

    /// Move to `to` unless stopped. Returns the state before the call.
    pub(crate) fn set_state(&self, to: NodeState) -> NodeState {
        let mut previous = to;
        self.inner.state.send_if_modified(|state| {
            previous = *state;
            if *state == NodeState::Stopped || *state == to {
                return false;
            }
            *state = to;
            true
        });
        previous
    }
}

fn sorted<'a>(members: impl Iterator<Item = &'a Member>) -> Vec<Member> {
    let mut members: Vec<Member> = members.cloned().collect();
    members.sort_by(|a, b| a.address.cmp(&b.address));
    members
}

/// Resolves once the node is stopped (or its state channel is gone).
pub(crate) async fn stopped(state: &mut watch::Receiver<NodeState>) {
    let _ = state.wait_for(|s| *s == NodeState::Stopped).await;
}
