//! BLE transport seam
//!
//! Everything the session needs from the platform GATT client. `Ok(None)`
//! from a lookup means "not there"; `Err` is a lower-level fault.

use crate::domain::dispatcher::NotificationDispatcher;
use crate::domain::models::{
    CharacteristicCapabilities, CommunicationStatus, DeviceAddress, SubscriptionMode,
};
use anyhow::Result;
use std::sync::Arc;
use uuid::Uuid;

#[allow(async_fn_in_trait)]
pub trait BleTransport {
    type Connection;
    type Service;
    type Characteristic;

    async fn connect(&self, address: DeviceAddress) -> Result<Option<Self::Connection>>;

    async fn resolve_service(
        &self,
        connection: &Self::Connection,
        uuid: Uuid,
    ) -> Result<Option<Self::Service>>;

    async fn resolve_characteristic(
        &self,
        service: &Self::Service,
        uuid: Uuid,
    ) -> Result<Option<Self::Characteristic>>;

    fn capabilities(&self, characteristic: &Self::Characteristic) -> Result<CharacteristicCapabilities>;

    /// Route value changes on `characteristic` to `dispatcher`
    fn register_value_changed(
        &self,
        characteristic: &Self::Characteristic,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Result<()>;

    fn unregister_value_changed(&self, characteristic: &Self::Characteristic) -> Result<()>;

    /// Write the CCCD for `mode`
    async fn subscribe(
        &self,
        characteristic: &Self::Characteristic,
        mode: SubscriptionMode,
    ) -> Result<CommunicationStatus>;

    /// Write request (with response) to `characteristic`
    async fn write(&self, characteristic: &Self::Characteristic, bytes: &[u8]) -> Result<CommunicationStatus>;

    /// Resolves once the link to the device drops
    async fn wait_for_disconnect(&self, connection: &Self::Connection);

    async fn disconnect(&self, connection: Self::Connection) -> Result<()>;
}
