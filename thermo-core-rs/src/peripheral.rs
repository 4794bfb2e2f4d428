//! Peripheral node update loop

use crate::config::{validate_initial_value, PeripheralConfig};
use crate::error::{Error, Result};
use crate::thermal::next_external;
use crate::transport::Connection;
use crate::types::{Message, PeerId};
use serde::Serialize;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, warn};

/// Values owned by one peripheral
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeripheralState {
    pub id: PeerId,
    pub external_value: f64,
    /// CENTRAL messages answered so far
    pub rounds: u64,
    pub last_central: Option<f64>,
}

impl PeripheralState {
    pub fn new(id: PeerId, external_value: f64) -> Self {
        Self {
            id,
            external_value,
            rounds: 0,
            last_central: None,
        }
    }

    /// Fold a received central value into the external one and build the reply
    pub fn apply_central(&mut self, central: f64) -> Message {
        let previous = self.external_value;
        self.external_value = next_external(previous, central);
        self.rounds += 1;
        self.last_central = Some(central);

        info!(
            "[{}] round={} central={:.6}  ext: {:.6} -> {:.6}",
            self.id, self.rounds, central, previous, self.external_value
        );

        Message::Temp {
            id: self.id,
            value: self.external_value,
        }
    }
}

/// How a peripheral's run ended
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeripheralOutcome {
    pub id: PeerId,
    pub rounds: u64,
    pub final_central: f64,
    pub external_value: f64,
}

/// Client side of the protocol over any stream type
pub struct Peripheral<S> {
    state: PeripheralState,
    conn: Connection<S>,
    round_timeout: Option<Duration>,
}

impl<S: AsyncRead + AsyncWrite> Peripheral<S> {
    pub fn new(conn: Connection<S>, id: PeerId, initial_value: f64) -> Self {
        Self {
            state: PeripheralState::new(id, initial_value),
            conn,
            round_timeout: None,
        }
    }

    pub fn with_round_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.round_timeout = timeout;
        self
    }

    pub fn state(&self) -> &PeripheralState {
        &self.state
    }

    /// Register, then answer every CENTRAL until DONE arrives
    pub async fn run(&mut self) -> Result<PeripheralOutcome> {
        let result = self.run_loop().await;
        if let Err(e) = &result {
            warn!(
                "[{}] Peripheral failed after {} rounds: {}",
                self.state.id, self.state.rounds, e
            );
        }
        // Outcome is already decided
        let _ = self.conn.shutdown().await;
        result
    }

    async fn run_loop(&mut self) -> Result<PeripheralOutcome> {
        let hello = Message::Hello {
            id: self.state.id,
            value: self.state.external_value,
        };
        self.conn.send(&hello).await?;

        loop {
            // Registration of the other peers is not a round
            let deadline = if self.state.rounds == 0 {
                None
            } else {
                self.round_timeout
            };
            match self.conn.recv_within(deadline).await? {
                Message::Done { value } => {
                    info!(
                        "[{}] DONE after {} rounds. central={:.6}  ext={:.6}",
                        self.state.id, self.state.rounds, value, self.state.external_value
                    );
                    return Ok(PeripheralOutcome {
                        id: self.state.id,
                        rounds: self.state.rounds,
                        final_central: value,
                        external_value: self.state.external_value,
                    });
                }
                Message::Central { value } => {
                    let reply = self.state.apply_central(value);
                    self.conn.send(&reply).await?;
                }
                other => {
                    return Err(Error::Unexpected {
                        peer: self.conn.peer().to_string(),
                        expected: "CENTRAL or DONE",
                        got: other.kind(),
                    });
                }
            }
        }
    }
}

/// Connect to the configured coordinator and run to completion
pub async fn connect_and_run(
    config: &PeripheralConfig,
    initial_value: f64,
) -> Result<PeripheralOutcome> {
    config.validate()?;
    validate_initial_value(initial_value)?;

    let conn = Connection::connect(&config.host, config.port).await?;
    info!(
        "[{}] connected to {}:{} with initial ext={:.6}",
        config.id, config.host, config.port, initial_value
    );
    Peripheral::new(conn, config.id, initial_value)
        .with_round_timeout(config.round_timeout)
        .run()
        .await
}
