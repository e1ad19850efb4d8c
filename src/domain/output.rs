//! Output sinks
//!
//! Where decoded measurements go once the dispatcher accepts them. Sinks are
//! invoked one measurement at a time and must return quickly; failures are
//! reported to the caller, which logs them.

use crate::domain::models::Measurement;
use crate::domain::settings::DisplayUnit;
use tracing::{debug, warn};

/// Receives each accepted measurement
pub trait OutputSink: Send {
    fn name(&self) -> &'static str;

    fn emit(&mut self, measurement: Measurement) -> anyhow::Result<()>;
}

/// Synthetic keyboard input into the focused application
#[cfg_attr(not(any(windows, test)), allow(dead_code))]
pub trait KeyboardInput: Send {
    /// Type `text` character by character, handling shift state as needed
    fn send_text(&self, text: &str) -> anyhow::Result<()>;

    fn send_enter(&self) -> anyhow::Result<()>;
}

/// Value only, as typed into other applications: `1234` or `1.234`.
/// Both units come from the same rounded millimeter count.
pub fn render_value(measurement: Measurement, unit: DisplayUnit) -> String {
    let mm = measurement.millimeters();
    match unit {
        DisplayUnit::Meters => {
            let sign = if mm < 0 { "-" } else { "" };
            let abs = mm.unsigned_abs();
            format!("{}{}.{:03}", sign, abs / 1000, abs % 1000)
        }
        DisplayUnit::Millimeters => mm.to_string(),
    }
}

/// Human-readable line: `Measurement: 1234 mm`
pub fn format_measurement(measurement: Measurement, unit: DisplayUnit) -> String {
    let suffix = match unit {
        DisplayUnit::Meters => "m",
        DisplayUnit::Millimeters => "mm",
    };
    format!("Measurement: {} {}", render_value(measurement, unit), suffix)
}

/// Types the measurement followed by Enter
#[cfg_attr(not(any(windows, test)), allow(dead_code))]
pub struct InjectionSink<K: KeyboardInput> {
    keyboard: K,
    unit: DisplayUnit,
}

impl<K: KeyboardInput> InjectionSink<K> {
    #[cfg_attr(not(any(windows, test)), allow(dead_code))]
    pub fn new(keyboard: K, unit: DisplayUnit) -> Self {
        Self { keyboard, unit }
    }
}

impl<K: KeyboardInput> OutputSink for InjectionSink<K> {
    fn name(&self) -> &'static str {
        "injection"
    }

    fn emit(&mut self, measurement: Measurement) -> anyhow::Result<()> {
        let text = render_value(measurement, self.unit);
        debug!("Injecting {:?}", text);
        self.keyboard.send_text(&text)?;
        self.keyboard.send_enter()?;
        Ok(())
    }
}

/// Forwards to several sinks in order
pub struct FanOutSink {
    sinks: Vec<Box<dyn OutputSink>>,
}

impl FanOutSink {
    pub fn new(sinks: Vec<Box<dyn OutputSink>>) -> Self {
        Self { sinks }
    }
}

impl OutputSink for FanOutSink {
    fn name(&self) -> &'static str {
        "fan-out"
    }

    /// Every sink is tried; the first failure is returned after the rest ran.
    fn emit(&mut self, measurement: Measurement) -> anyhow::Result<()> {
        let mut first_error = None;
        for sink in &mut self.sinks {
            if let Err(e) = sink.emit(measurement) {
                warn!("{} sink failed: {:#}", sink.name(), e);
                first_error.get_or_insert(e.context(format!("{} sink", sink.name())));
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
