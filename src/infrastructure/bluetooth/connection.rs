//! BLE Connection Module
//!
//! WinRT implementation of [`BleTransport`]: device connection, GATT lookup,
//! CCCD writes and value-change event plumbing.

use crate::domain::dispatcher::NotificationDispatcher;
use crate::domain::models::{
    CharacteristicCapabilities, CommunicationStatus, DeviceAddress, SubscriptionMode,
};
use crate::domain::transport::BleTransport;
use anyhow::Result;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;
use windows::core::GUID;
use windows::Devices::Bluetooth::GenericAttributeProfile::{
    GattCharacteristic, GattCharacteristicProperties,
    GattClientCharacteristicConfigurationDescriptorValue, GattCommunicationStatus,
    GattDeviceService, GattSession, GattValueChangedEventArgs,
};
use windows::Devices::Bluetooth::{BluetoothConnectionStatus, BluetoothLEDevice};
use windows::Foundation::TypedEventHandler;
use windows::Storage::Streams::{DataReader, DataWriter, IBuffer};

/// An open device plus the handlers attached to it
pub struct WinRtConnection {
    device: BluetoothLEDevice,
    session: Option<GattSession>,
    status_token: Option<i64>,
    link_up: watch::Receiver<bool>,
}

pub struct WinRtCharacteristic {
    inner: GattCharacteristic,
    value_changed_token: Mutex<Option<i64>>,
}

/// GATT client backed by `Windows.Devices.Bluetooth`
#[derive(Debug, Default)]
pub struct WinRtTransport;

impl WinRtTransport {
    pub fn new() -> Self {
        Self
    }

    /// Create a GattSession to maintain the BLE connection
    async fn create_gatt_session(device: &BluetoothLEDevice) -> Result<GattSession> {
        let device_id = device.BluetoothDeviceId()?;
        let session = GattSession::FromDeviceIdAsync(&device_id)?.await?;
        session.SetMaintainConnection(true)?;
        Ok(session)
    }
}

fn to_guid(uuid: Uuid) -> GUID {
    GUID::from_u128(uuid.as_u128())
}

fn to_status(status: GattCommunicationStatus) -> CommunicationStatus {
    match status {
        GattCommunicationStatus::Success => CommunicationStatus::Success,
        GattCommunicationStatus::AccessDenied => CommunicationStatus::AccessDenied,
        GattCommunicationStatus::ProtocolError => CommunicationStatus::ProtocolError,
        _ => CommunicationStatus::Unreachable,
    }
}

fn read_buffer(buffer: &IBuffer) -> windows::core::Result<Vec<u8>> {
    let reader = DataReader::FromBuffer(buffer)?;
    let length = reader.UnconsumedBufferLength()? as usize;
    let mut bytes = vec![0u8; length];
    reader.ReadBytes(&mut bytes)?;
    Ok(bytes)
}

impl BleTransport for WinRtTransport {
    type Connection = WinRtConnection;
    type Service = GattDeviceService;
    type Characteristic = WinRtCharacteristic;

    async fn connect(&self, address: DeviceAddress) -> Result<Option<WinRtConnection>> {
        let device = match BluetoothLEDevice::FromBluetoothAddressAsync(address.as_u64())?.await {
            Ok(device) => device,
            Err(e) => {
                debug!("No device for {}: {:?}", address, e);
                return Ok(None);
            }
        };
        info!(
            "Device: {}",
            device.Name().map(|n| n.to_string()).unwrap_or_default()
        );

        let session = match Self::create_gatt_session(&device).await {
            Ok(session) => {
                info!("GattSession created, MaintainConnection set to true");
                Some(session)
            }
            Err(e) => {
                warn!("Failed to create GattSession, continuing anyway: {:#}", e);
                None
            }
        };

        let (link_tx, link_up) = watch::channel(true);
        let status_handler =
            TypedEventHandler::new(move |dev: windows::core::Ref<BluetoothLEDevice>, _| {
                if let Some(dev) = dev.as_ref() {
                    if let Ok(status) = dev.ConnectionStatus() {
                        debug!("Connection status changed: {:?}", status);
                        let _ = link_tx.send(status == BluetoothConnectionStatus::Connected);
                    }
                }
                Ok(())
            });
        let status_token = match device.ConnectionStatusChanged(&status_handler) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!("Connection status events unavailable: {:?}", e);
                None
            }
        };

        Ok(Some(WinRtConnection {
            device,
            session,
            status_token,
            link_up,
        }))
    }

    async fn resolve_service(
        &self,
        connection: &WinRtConnection,
        uuid: Uuid,
    ) -> Result<Option<GattDeviceService>> {
        let result = connection
            .device
            .GetGattServicesForUuidAsync(to_guid(uuid))?
            .await?;

        let status = result.Status()?;
        if status != GattCommunicationStatus::Success {
            warn!("GATT service query returned {:?}", status);
        }

        let services = result.Services()?;
        if services.Size()? == 0 {
            return Ok(None);
        }
        Ok(Some(services.GetAt(0)?))
    }

    async fn resolve_characteristic(
        &self,
        service: &GattDeviceService,
        uuid: Uuid,
    ) -> Result<Option<WinRtCharacteristic>> {
        let result = service
            .GetCharacteristicsForUuidAsync(to_guid(uuid))?
            .await?;

        let status = result.Status()?;
        if status != GattCommunicationStatus::Success {
            warn!("GATT characteristic query returned {:?}", status);
        }

        let characteristics = result.Characteristics()?;
        if characteristics.Size()? == 0 {
            return Ok(None);
        }
        Ok(Some(WinRtCharacteristic {
            inner: characteristics.GetAt(0)?,
            value_changed_token: Mutex::new(None),
        }))
    }

    fn capabilities(&self, characteristic: &WinRtCharacteristic) -> Result<CharacteristicCapabilities> {
        let props = characteristic.inner.CharacteristicProperties()?;
        let mut capabilities = CharacteristicCapabilities::NONE;
        if props.0 & GattCharacteristicProperties::Notify.0 != 0 {
            capabilities = capabilities | CharacteristicCapabilities::NOTIFY;
        }
        if props.0 & GattCharacteristicProperties::Indicate.0 != 0 {
            capabilities = capabilities | CharacteristicCapabilities::INDICATE;
        }
        debug!("Characteristic properties: {:#X}", props.0);
        Ok(capabilities)
    }

    fn register_value_changed(
        &self,
        characteristic: &WinRtCharacteristic,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Result<()> {
        let data_handler = TypedEventHandler::new(
            move |_: windows::core::Ref<GattCharacteristic>,
                  args: windows::core::Ref<GattValueChangedEventArgs>| {
                if let Some(args) = args.as_ref() {
                    match args
                        .CharacteristicValue()
                        .and_then(|buffer| read_buffer(&buffer))
                    {
                        Ok(bytes) => {
                            dispatcher.on_value_changed(&bytes);
                        }
                        Err(e) => warn!("Could not read notification payload: {:?}", e),
                    }
                }
                Ok(())
            },
        );

        let token = characteristic.inner.ValueChanged(&data_handler)?;
        *characteristic
            .value_changed_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(token);
        Ok(())
    }

    fn unregister_value_changed(&self, characteristic: &WinRtCharacteristic) -> Result<()> {
        let token = characteristic
            .value_changed_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(token) = token {
            characteristic.inner.RemoveValueChanged(token)?;
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        characteristic: &WinRtCharacteristic,
        mode: SubscriptionMode,
    ) -> Result<CommunicationStatus> {
        let value = match mode {
            SubscriptionMode::Notify => GattClientCharacteristicConfigurationDescriptorValue::Notify,
            SubscriptionMode::Indicate => {
                GattClientCharacteristicConfigurationDescriptorValue::Indicate
            }
        };

        let status = characteristic
            .inner
            .WriteClientCharacteristicConfigurationDescriptorAsync(value)?
            .await?;
        Ok(to_status(status))
    }

    async fn write(&self, characteristic: &WinRtCharacteristic, bytes: &[u8]) -> Result<CommunicationStatus> {
        let writer = DataWriter::new()?;
        writer.WriteBytes(bytes)?;
        let buffer = writer.DetachBuffer()?;

        let status = characteristic.inner.WriteValueAsync(&buffer)?.await?;
        Ok(to_status(status))
    }

    async fn wait_for_disconnect(&self, connection: &WinRtConnection) {
        let mut link_up = connection.link_up.clone();
        loop {
            if !*link_up.borrow_and_update() {
                return;
            }
            if link_up.changed().await.is_err() {
                // Status handler is gone; nothing will ever report a drop
                std::future::pending::<()>().await;
            }
        }
    }

    async fn disconnect(&self, connection: WinRtConnection) -> Result<()> {
        if let Some(token) = connection.status_token {
            if let Err(e) = connection.device.RemoveConnectionStatusChanged(token) {
                warn!("Could not remove status handler: {:?}", e);
            }
        }
        if let Some(session) = connection.session {
            session.Close()?;
        }
        connection.device.Close()?;
        Ok(())
    }
}
