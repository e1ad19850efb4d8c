//! GATT session state machine
//!
//! ```text
//! Disconnected ─▶ Connecting ─▶ Connected ─▶ ServiceResolved ─▶ CharacteristicResolved
//!                     │              │               │                    │
//!                     └──────────────┴───────┬───────┘                    ▼
//!                                            ▼                 SubscriptionRequested
//!                                         Failed                          │
//!                                                                         ▼
//!                                            Terminated ◀──────────── Listening
//! ```
//!
//! Resolution failures are fatal and never retried. Subscription and command
//! write failures are logged and tolerated; some stacks report a failed CCCD
//! write while still delivering values.

use crate::domain::dispatcher::{read_state, NotificationDispatcher, SharedState};
use crate::domain::models::{
    CharacteristicCapabilities, CommunicationStatus, DeviceAddress, SessionState,
    SubscriptionMode, TerminationReason,
};
use crate::domain::output::OutputSink;
use crate::domain::settings::SessionConfig;
use crate::domain::transport::BleTransport;
use anyhow::Context;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("device {0} not found")]
    DeviceNotFound(DeviceAddress),
    #[error("service {0} not found")]
    ServiceNotFound(Uuid),
    #[error("characteristic {0} not found")]
    CharacteristicNotFound(Uuid),
    #[error("session already started (state {0:?})")]
    AlreadyStarted(SessionState),
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

pub struct Session<T: BleTransport> {
    transport: T,
    config: SessionConfig,
    state: SharedState,
    dispatcher: Arc<NotificationDispatcher>,
    connection: Option<T::Connection>,
    characteristic: Option<T::Characteristic>,
    handler_registered: bool,
}

impl<T: BleTransport> Session<T> {
    pub fn new(transport: T, config: SessionConfig, sink: Box<dyn OutputSink>) -> Self {
        let state = Arc::new(RwLock::new(SessionState::Disconnected));
        let dispatcher = Arc::new(NotificationDispatcher::new(
            Arc::clone(&state),
            sink,
            config.emit_budget,
        ));

        Self {
            transport,
            config,
            state,
            dispatcher,
            connection: None,
            characteristic: None,
            handler_registered: false,
        }
    }

    pub fn state(&self) -> SessionState {
        *read_state(&self.state)
    }

    pub fn dispatcher(&self) -> Arc<NotificationDispatcher> {
        Arc::clone(&self.dispatcher)
    }

    fn set_state(&self, next: SessionState) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        debug!("Session state {:?} -> {:?}", *state, next);
        *state = next;
    }

    /// Establish, listen until `cancel` completes or the link drops, then tear down
    pub async fn run<F: Future>(&mut self, cancel: F) -> Result<TerminationReason, SessionError> {
        self.establish().await?;
        let reason = self.listen(cancel).await;
        self.terminate().await;
        Ok(reason)
    }

    /// Drive the session from `Disconnected` to `Listening`
    pub async fn establish(&mut self) -> Result<(), SessionError> {
        let current = self.state();
        if current != SessionState::Disconnected {
            return Err(SessionError::AlreadyStarted(current));
        }

        let characteristic = match self.resolve().await {
            Ok(characteristic) => characteristic,
            Err(e) => {
                error!("{:#}", e);
                self.fail().await;
                return Err(e);
            }
        };

        self.subscribe(&characteristic).await;

        self.set_state(SessionState::Listening);
        self.send_command(&characteristic).await;
        self.characteristic = Some(characteristic);
        Ok(())
    }

    async fn resolve(&mut self) -> Result<T::Characteristic, SessionError> {
        let address = self.config.address;

        self.set_state(SessionState::Connecting);
        info!("Connecting to device {}", address);
        let connection = self
            .transport
            .connect(address)
            .await
            .with_context(|| format!("connecting to {}", address))?
            .ok_or(SessionError::DeviceNotFound(address))?;
        self.set_state(SessionState::Connected);
        info!("Device connected");

        let result = self.resolve_characteristic(&connection).await;
        self.connection = Some(connection);
        result
    }

    async fn resolve_characteristic(
        &self,
        connection: &T::Connection,
    ) -> Result<T::Characteristic, SessionError> {
        let service_uuid = self.config.service_uuid;
        let service = self
            .transport
            .resolve_service(connection, service_uuid)
            .await
            .with_context(|| format!("resolving service {}", service_uuid))?
            .ok_or(SessionError::ServiceNotFound(service_uuid))?;
        self.set_state(SessionState::ServiceResolved);
        info!("Found service {}", service_uuid);

        let characteristic_uuid = self.config.characteristic_uuid;
        let characteristic = self
            .transport
            .resolve_characteristic(&service, characteristic_uuid)
            .await
            .with_context(|| format!("resolving characteristic {}", characteristic_uuid))?
            .ok_or(SessionError::CharacteristicNotFound(characteristic_uuid))?;
        self.set_state(SessionState::CharacteristicResolved);
        info!("Found characteristic {}", characteristic_uuid);

        Ok(characteristic)
    }

    async fn subscribe(&mut self, characteristic: &T::Characteristic) {
        let capabilities = self
            .transport
            .capabilities(characteristic)
            .unwrap_or_else(|e| {
                warn!("Could not read characteristic properties: {:#}", e);
                CharacteristicCapabilities::NONE
            });
        let mode = SubscriptionMode::select(capabilities);

        // Handler must be attached before the CCCD write
        match self
            .transport
            .register_value_changed(characteristic, Arc::clone(&self.dispatcher))
        {
            Ok(()) => self.handler_registered = true,
            Err(e) => warn!("Could not attach value-changed handler: {:#}", e),
        }

        self.set_state(SessionState::SubscriptionRequested);
        match self.transport.subscribe(characteristic, mode).await {
            Ok(CommunicationStatus::Success) => info!("CCCD enabled ({})", mode),
            Ok(status) => warn!(
                "Could not enable CCCD ({}): {:?}. Continuing anyway.",
                mode, status
            ),
            Err(e) => warn!(
                "Fault while enabling CCCD ({}): {:#}. Continuing anyway.",
                mode, e
            ),
        }
    }

    async fn send_command(&self, characteristic: &T::Characteristic) {
        match self
            .transport
            .write(characteristic, &self.config.command)
            .await
        {
            Ok(CommunicationStatus::Success) => info!("Auto-sync command sent"),
            Ok(status) => warn!("Command write failed: {:?}", status),
            Err(e) => warn!("Fault while writing command: {:#}", e),
        }
    }

    async fn fail(&mut self) {
        self.set_state(SessionState::Failed);
        if let Some(connection) = self.connection.take() {
            if let Err(e) = self.transport.disconnect(connection).await {
                warn!("Error releasing connection: {:#}", e);
            }
        }
    }

    /// Wait in `Listening` until `cancel` completes or the device goes away
    pub async fn listen<F: Future>(&self, cancel: F) -> TerminationReason {
        let Some(connection) = self.connection.as_ref() else {
            return TerminationReason::ConnectionLost;
        };

        info!("Waiting for measurements (Ctrl+C to exit)...");
        tokio::select! {
            _ = cancel => {
                info!("Cancellation requested");
                TerminationReason::Cancelled
            }
            _ = self.transport.wait_for_disconnect(connection) => {
                warn!("Connection to device lost");
                TerminationReason::ConnectionLost
            }
        }
    }

    /// Move to `Terminated`, detach the dispatcher and release the connection.
    /// Once this returns no further event reaches the output sink.
    pub async fn terminate(&mut self) {
        if self.state().is_terminal() {
            return;
        }
        self.set_state(SessionState::Terminated);

        if let Some(characteristic) = self.characteristic.take() {
            if self.handler_registered {
                if let Err(e) = self.transport.unregister_value_changed(&characteristic) {
                    warn!("Could not detach value-changed handler: {:#}", e);
                }
                self.handler_registered = false;
            }
        }

        if let Some(connection) = self.connection.take() {
            match self.transport.disconnect(connection).await {
                Ok(()) => info!("Disconnected from device"),
                Err(e) => warn!("Error while disconnecting: {:#}", e),
            }
        }
    }
}
