//! Periodic gossip cycle and failure detection.
//!
//! Each cycle:
//! 1. Ages pending updates by one round
//! 2. Picks one random member (other than ourselves) and pings it
//! 3. On failure, asks up to K other members to ping it concurrently
//! 4. If no helper gets an ack, marks the member failed
//!
//! Helpers race: the first ack ends the wait. Slower helpers are not cancelled,
//! their results are simply dropped.

use crate::node::{Inner, Node, NodeState, stopped};
use std::sync::Weak;
use std::time::Duration;
use swim_core::Member;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

/// Launch the gossip loop for a node.
///
/// The loop holds a weak reference so it ends once every handle is dropped.
pub(crate) fn spawn(node: Weak<Inner>, period: Duration, mut state: watch::Receiver<NodeState>) {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stopped(&mut state) => break,
            }

            let Some(inner) = node.upgrade() else {
                break;
            };
            Node { inner }.gossip_once().await;
        }

        debug!("Gossip loop stopped");
    });
}

impl Node {
    /// Run one gossip cycle.
    pub async fn gossip_once(&self) {
        let target = {
            let mut members = self.inner.members.lock().await;
            members.advance_round();

            match members.random_others(1, &[&self.inner.local]) {
                Ok(mut picked) => match picked.pop() {
                    Some(target) => target,
                    None => return,
                },
                // Alone in the cluster
                Err(_) => return,
            }
        };

        self.probe(&target).await;
    }

    /// Probe `target` directly, then indirectly, and mark it failed if nobody reaches it.
    ///
    /// Returns true if the target was declared failed.
    pub async fn probe(&self, target: &Member) -> bool {
        let Err(e) = self.ping(&target.address).await else {
            return false;
        };
        debug!("Ping to {} failed: {}", target.address, e);

        let k = self.inner.config.detector.indirect_probes;
        let helpers = {
            let members = self.inner.members.lock().await;
            members
                .random_others(k, &[&self.inner.local, target])
                .unwrap_or_default()
        };

        if self.indirect_probe(target, helpers).await {
            debug!("Indirect probe reached {}", target.address);
            return false;
        }

        warn!(
            "Ping-req: ack was not received, removing node {}",
            target.address
        );
        let removed = self.inner.members.lock().await.remove(target);
        if removed {
            info!("Member {} failed", target);
        }
        removed
    }

    /// Ask every helper to ping `target` at once; true on the first ack.
    async fn indirect_probe(&self, target: &Member, helpers: Vec<Member>) -> bool {
        if helpers.is_empty() {
            debug!("No helpers available to probe {}", target.address);
            return false;
        }

        let (tx, mut rx) = mpsc::channel(helpers.len());
        for helper in helpers {
            let node = self.clone();
            let target = target.clone();
            let tx = tx.clone();

            tokio::spawn(async move {
                let result = node.ping_req(&helper, &target).await;
                if let Err(e) = &result {
                    debug!("Ping-req via {} failed: {}", helper.address, e);
                }
                // Receiver is gone once someone else acked
                let _ = tx.send(result.is_ok()).await;
            });
        }
        drop(tx);

        while let Some(acked) = rx.recv().await {
            if acked {
                return true;
            }
        }
        false
    }
}
