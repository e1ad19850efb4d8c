//! In-memory transport and sink used by the unit tests

use crate::domain::dispatcher::{DispatchOutcome, NotificationDispatcher};
use crate::domain::models::{
    CharacteristicCapabilities, CommunicationStatus, DeviceAddress, Measurement, SubscriptionMode,
};
use crate::domain::output::OutputSink;
use crate::domain::transport::BleTransport;
use crate::infrastructure::bluetooth::protocol::MEASUREMENT_PREFIX;
use anyhow::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use uuid::Uuid;

/// 12-byte measurement frame carrying `meters`
pub fn measurement_frame(meters: f32) -> Vec<u8> {
    let mut bytes = MEASUREMENT_PREFIX.to_vec();
    bytes.extend_from_slice(&[0x00, 0x00, 0x00]);
    bytes.extend_from_slice(&meters.to_le_bytes());
    bytes.push(0x00);
    bytes
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Connect(DeviceAddress),
    ResolveService(Uuid),
    ResolveCharacteristic(Uuid),
    Capabilities,
    Register,
    Subscribe(SubscriptionMode),
    Write(Vec<u8>),
    Unregister,
    Disconnect,
}

#[derive(Debug, Clone, Copy)]
pub enum Reply {
    Status(CommunicationStatus),
    Fault,
}

impl Reply {
    fn into_result(self, what: &str) -> Result<CommunicationStatus> {
        match self {
            Reply::Status(status) => Ok(status),
            Reply::Fault => anyhow::bail!("simulated {} fault", what),
        }
    }
}

#[derive(Clone)]
pub struct MockTransport {
    pub device_present: bool,
    pub connect_fault: bool,
    pub service_present: bool,
    pub characteristic_present: bool,
    pub capabilities: CharacteristicCapabilities,
    pub subscribe_reply: Reply,
    pub write_reply: Reply,
    pub(crate) calls: Arc<Mutex<Vec<Call>>>,
    pub(crate) handler: Arc<Mutex<Option<Arc<NotificationDispatcher>>>>,
    pub(crate) last_handler: Arc<Mutex<Option<Arc<NotificationDispatcher>>>>,
    pub(crate) link_lost: Arc<Notify>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            device_present: true,
            connect_fault: false,
            service_present: true,
            characteristic_present: true,
            capabilities: CharacteristicCapabilities::NOTIFY | CharacteristicCapabilities::INDICATE,
            subscribe_reply: Reply::Status(CommunicationStatus::Success),
            write_reply: Reply::Status(CommunicationStatus::Success),
            calls: Arc::default(),
            handler: Arc::default(),
            last_handler: Arc::default(),
            link_lost: Arc::new(Notify::new()),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    /// Deliver through the currently registered handler, if any
    pub fn deliver(&self, bytes: &[u8]) -> Option<DispatchOutcome> {
        let handler = self.handler.lock().unwrap().clone();
        handler.map(|h| h.on_value_changed(bytes))
    }

    /// Deliver through the last handler ever registered, as a callback that
    /// was already running when it was removed
    pub fn deliver_in_flight(&self, bytes: &[u8]) -> Option<DispatchOutcome> {
        let handler = self.last_handler.lock().unwrap().clone();
        handler.map(|h| h.on_value_changed(bytes))
    }

    pub fn drop_link(&self) {
        self.link_lost.notify_one();
    }
}

pub struct MockConnection;

impl BleTransport for MockTransport {
    type Connection = MockConnection;
    type Service = ();
    type Characteristic = ();

    async fn connect(&self, address: DeviceAddress) -> Result<Option<MockConnection>> {
        self.record(Call::Connect(address));
        if self.connect_fault {
            anyhow::bail!("simulated radio failure");
        }
        Ok(self.device_present.then_some(MockConnection))
    }

    async fn resolve_service(&self, _: &MockConnection, uuid: Uuid) -> Result<Option<()>> {
        self.record(Call::ResolveService(uuid));
        Ok(self.service_present.then_some(()))
    }

    async fn resolve_characteristic(&self, _: &(), uuid: Uuid) -> Result<Option<()>> {
        self.record(Call::ResolveCharacteristic(uuid));
        Ok(self.characteristic_present.then_some(()))
    }

    fn capabilities(&self, _: &()) -> Result<CharacteristicCapabilities> {
        self.record(Call::Capabilities);
        Ok(self.capabilities)
    }

    fn register_value_changed(&self, _: &(), dispatcher: Arc<NotificationDispatcher>) -> Result<()> {
        self.record(Call::Register);
        *self.last_handler.lock().unwrap() = Some(Arc::clone(&dispatcher));
        *self.handler.lock().unwrap() = Some(dispatcher);
        Ok(())
    }

    fn unregister_value_changed(&self, _: &()) -> Result<()> {
        self.record(Call::Unregister);
        *self.handler.lock().unwrap() = None;
        Ok(())
    }

    async fn subscribe(&self, _: &(), mode: SubscriptionMode) -> Result<CommunicationStatus> {
        self.record(Call::Subscribe(mode));
        self.subscribe_reply.into_result("CCCD")
    }

    async fn write(&self, _: &(), bytes: &[u8]) -> Result<CommunicationStatus> {
        self.record(Call::Write(bytes.to_vec()));
        self.write_reply.into_result("write")
    }

    async fn wait_for_disconnect(&self, _: &MockConnection) {
        self.link_lost.notified().await;
    }

    async fn disconnect(&self, _: MockConnection) -> Result<()> {
        self.record(Call::Disconnect);
        *self.handler.lock().unwrap() = None;
        Ok(())
    }
}

/// Records every measurement it is handed
#[derive(Clone, Default)]
pub struct RecordingSink {
    emitted: Arc<Mutex<Vec<Measurement>>>,
    attempts: Arc<AtomicUsize>,
    fail: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn meters(&self) -> Vec<f32> {
        self.emitted.lock().unwrap().iter().map(|m| m.meters()).collect()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl OutputSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn emit(&mut self, measurement: Measurement) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("sink offline");
        }
        self.emitted.lock().unwrap().push(measurement);
        Ok(())
    }
}
