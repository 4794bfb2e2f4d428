//! Coordinator round loop
//!
//! Registers a fixed set of peripherals, then repeats
//! broadcast → collect → converge-check until every peripheral value has
//! settled. The collect phase joins all peers before any reply is applied,
//! so no CENTRAL for round k+1 leaves before every TEMP of round k arrived.

use crate::config::{validate_initial_value, CoordinatorConfig};
use crate::error::{Error, RegistrationError, Result};
use crate::registry::{PeripheralRecord, Registry};
use crate::thermal::next_central;
use crate::transport::{self, within, Connection};
use crate::types::{Message, PeerId};
use futures_util::future::try_join_all;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Coordinator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Registering,
    Broadcast,
    Collect,
    Converged,
    Failed,
}

/// Everything the coordinator knows between rounds
#[derive(Debug, Clone)]
pub struct CoordinatorState {
    pub central_value: f64,
    /// Rounds broadcast so far
    pub round: u64,
    pub records: Registry,
    /// Set once the first collect phase completed
    pub has_previous_round: bool,
}

/// Result of applying one round of replies
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundReport {
    pub round: u64,
    pub previous_central: f64,
    pub central: f64,
    pub converged: bool,
}

/// Final values of a converged run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub rounds: u64,
    pub central_value: f64,
    pub peripherals: Vec<PeripheralRecord>,
}

impl CoordinatorState {
    pub fn new(central_value: f64, peer_count: usize) -> Self {
        Self {
            central_value,
            round: 0,
            records: Registry::new(peer_count),
            has_previous_round: false,
        }
    }

    /// Apply every reply of the current round, decide convergence and move
    /// the central value
    pub fn complete_round(
        &mut self,
        replies: &[(PeerId, f64)],
        epsilon: f64,
    ) -> Result<RoundReport> {
        if let Some(&(id, _)) = replies.iter().find(|(id, _)| !self.records.contains(*id)) {
            return Err(Error::UnknownPeer(id));
        }
        for &(id, value) in replies {
            self.records.update(id, value, self.has_previous_round)?;
        }

        // Round 1 has nothing to compare against
        let converged = self.has_previous_round && self.records.is_stable(epsilon);

        let previous_central = self.central_value;
        self.central_value = next_central(previous_central, self.records.current_values());
        if !converged {
            self.has_previous_round = true;
        }

        Ok(RoundReport {
            round: self.round,
            previous_central,
            central: self.central_value,
            converged,
        })
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            rounds: self.round,
            central_value: self.central_value,
            peripherals: self.records.records().copied().collect(),
        }
    }
}

/// A registered peripheral's channel
struct Peer<S> {
    id: PeerId,
    conn: Connection<S>,
}

/// One TEMP as read from a peer's channel
struct Reply {
    from: PeerId,
    id: PeerId,
    value: f64,
}

impl<S: AsyncRead + AsyncWrite> Peer<S> {
    async fn recv_temp(&mut self) -> Result<Reply> {
        match self.conn.recv().await? {
            Message::Temp { id, value } => Ok(Reply {
                from: self.id,
                id,
                value,
            }),
            other => Err(Error::Unexpected {
                peer: self.conn.peer().to_string(),
                expected: "TEMP",
                got: other.kind(),
            }),
        }
    }
}

/// Server side of the protocol over any stream type
pub struct Coordinator<S> {
    config: CoordinatorConfig,
    state: CoordinatorState,
    phase: Phase,
    peers: Vec<Peer<S>>,
}

impl<S: AsyncRead + AsyncWrite> Coordinator<S> {
    pub fn new(config: CoordinatorConfig, initial_central: f64) -> Self {
        let state = CoordinatorState::new(initial_central, config.peer_count);
        Self {
            config,
            state,
            phase: Phase::Registering,
            peers: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> &CoordinatorState {
        &self.state
    }

    /// True once every peer slot is registered
    pub fn is_ready(&self) -> bool {
        self.state.records.is_full()
    }

    /// Read the HELLO of a freshly accepted connection and admit the peer
    pub async fn register(&mut self, conn: Connection<S>) -> Result<PeerId> {
        let result = self.admit(conn).await;
        self.guard(result)
    }

    async fn admit(&mut self, mut conn: Connection<S>) -> Result<PeerId> {
        if self.phase != Phase::Registering || self.is_ready() {
            return Err(RegistrationError::Full(self.config.peer_count).into());
        }

        let line = within(self.config.round_timeout, conn.recv_line()).await?;
        let (id, value) = match Message::decode(&line) {
            Ok(Message::Hello { id, value }) => (id, value),
            Ok(other) => return Err(RegistrationError::NotHello(other.kind()).into()),
            Err(source) => return Err(RegistrationError::Malformed { line, source }.into()),
        };
        self.state.records.register(id, value)?;

        info!(
            "Peripheral #{} registered from {} with temp={:.6} ({}/{})",
            id,
            conn.peer(),
            value,
            self.state.records.len(),
            self.config.peer_count
        );
        self.peers.push(Peer { id, conn });
        Ok(id)
    }

    /// Run rounds until convergence, then send DONE and close every connection
    pub async fn run(&mut self) -> Result<RunSummary> {
        let result = self.run_rounds().await;
        let result = self.guard(result);
        self.close().await;
        result
    }

    async fn run_rounds(&mut self) -> Result<RunSummary> {
        if self.phase != Phase::Registering || self.peers.is_empty() || !self.is_ready() {
            return Err(RegistrationError::Incomplete {
                registered: self.peers.len(),
                expected: self.config.peer_count,
            }
            .into());
        }

        loop {
            self.phase = Phase::Broadcast;
            self.state.round += 1;
            let central = Message::Central {
                value: self.state.central_value,
            };
            self.broadcast(&central).await?;

            self.phase = Phase::Collect;
            let replies = self.collect().await?;
            let report = self.state.complete_round(&replies, self.config.epsilon)?;

            info!(
                "round={} central={:.6} -> {:.6}   ext=[{}]",
                report.round,
                report.previous_central,
                report.central,
                self.format_values()
            );

            if report.converged {
                info!("*** STABILIZED after {} rounds ***", report.round);
                let done = Message::Done {
                    value: self.state.central_value,
                };
                self.broadcast(&done).await?;
                self.phase = Phase::Converged;

                info!("Final central={:.6}", self.state.central_value);
                for record in self.state.records.records() {
                    info!("Final ext[{}]={:.6}", record.id, record.current_value);
                }
                return Ok(self.state.summary());
            }
        }
    }

    async fn broadcast(&mut self, msg: &Message) -> Result<()> {
        debug!("Broadcasting {} to {} peers", msg.kind(), self.peers.len());
        try_join_all(self.peers.iter_mut().map(move |peer| peer.conn.send(msg))).await?;
        Ok(())
    }

    /// Wait for exactly one TEMP per peer; this join is the round barrier
    async fn collect(&mut self) -> Result<Vec<(PeerId, f64)>> {
        let deadline = self.config.round_timeout;
        let replies = within(
            deadline,
            try_join_all(self.peers.iter_mut().map(|peer| peer.recv_temp())),
        )
        .await?;

        let mut values = Vec::with_capacity(replies.len());
        for reply in replies {
            if !self.state.records.contains(reply.id) {
                return Err(Error::UnknownPeer(reply.id));
            }
            if reply.id != reply.from {
                return Err(Error::IdMismatch {
                    registered: reply.from,
                    claimed: reply.id,
                });
            }
            values.push((reply.id, reply.value));
        }
        Ok(values)
    }

    async fn close(&mut self) {
        for peer in &mut self.peers {
            if let Err(e) = peer.conn.shutdown().await {
                debug!("Closing {} failed: {}", peer.conn.peer(), e);
            }
        }
    }

    fn guard<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            warn!("Coordinator failed during {:?}: {}", self.phase, e);
            self.phase = Phase::Failed;
        }
        result
    }

    fn format_values(&self) -> String {
        self.state
            .records
            .current_values()
            .map(|v| format!("{:.6}", v))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Bind the configured endpoint and run a full session
pub async fn serve(config: CoordinatorConfig, initial_central: f64) -> Result<RunSummary> {
    config.validate()?;
    validate_initial_value(initial_central)?;

    let listener = transport::bind(&config.bind_addr, config.port).await?;
    info!(
        "Listening on {}, initial central={:.6}",
        listener.local_addr()?,
        initial_central
    );
    accept_and_run(listener, config, initial_central).await
}

/// Accept exactly `peer_count` peripherals on `listener`, then run rounds
pub async fn serve_on(
    listener: TcpListener,
    config: CoordinatorConfig,
    initial_central: f64,
) -> Result<RunSummary> {
    config.validate()?;
    validate_initial_value(initial_central)?;
    accept_and_run(listener, config, initial_central).await
}

async fn accept_and_run(
    listener: TcpListener,
    config: CoordinatorConfig,
    initial_central: f64,
) -> Result<RunSummary> {
    let mut coordinator = Coordinator::new(config, initial_central);
    while !coordinator.is_ready() {
        let conn = Connection::accept(&listener).await?;
        coordinator.register(conn).await?;
    }
    coordinator.run().await
}
