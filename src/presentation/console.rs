use crate::domain::models::Measurement;
use crate::domain::output::{format_measurement, OutputSink};
use crate::domain::settings::DisplayUnit;
use std::io::{self, Stdout, Write};

/// Prints one line per measurement
pub struct ConsoleSink<W: Write + Send = Stdout> {
    writer: W,
    unit: DisplayUnit,
}

impl ConsoleSink {
    pub fn stdout(unit: DisplayUnit) -> Self {
        Self::new(io::stdout(), unit)
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(writer: W, unit: DisplayUnit) -> Self {
        Self { writer, unit }
    }
}

impl<W: Write + Send> OutputSink for ConsoleSink<W> {
    fn name(&self) -> &'static str {
        "display"
    }

    fn emit(&mut self, measurement: Measurement) -> anyhow::Result<()> {
        writeln!(self.writer, "{}", format_measurement(measurement, self.unit))?;
        self.writer.flush()?;
        Ok(())
    }
}
