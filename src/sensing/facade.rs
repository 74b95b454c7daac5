use anyhow::Result;
use log::warn;
use std::fmt;
use std::sync::Arc;

/// Column placeholder used when no capsense board is attached.
pub const CAPSENSE_UNAVAILABLE_HEADER: &str = "capsense_unavailable";

/// One CSV field as produced by a collaborator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading<T> {
    Value(T),
    /// The collaborator answered but had nothing to report.
    Empty,
    /// No collaborator is configured.
    NoSensor,
    Error,
}

impl<T> Reading<T> {
    pub fn is_error(&self) -> bool {
        matches!(self, Reading::Error)
    }
}

// Formatter options (precision) are forwarded to the value, so `{:.2}` works
// for floats; sentinels are written verbatim.
impl<T: fmt::Display> fmt::Display for Reading<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Value(value) => value.fmt(f),
            Reading::Empty => f.write_str("EMPTY"),
            Reading::NoSensor => f.write_str("NO_SENSOR"),
            Reading::Error => f.write_str("ERROR"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvironmentReading {
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
}

/// Temperature/humidity/pressure source (a BME280 on the real board).
pub trait EnvironmentSensor: Send + Sync {
    fn read(&self) -> Result<EnvironmentReading>;
}

/// Capacitive touch controller exposing a fixed set of u16 counters.
pub trait CapsenseSensor: Send + Sync {
    /// Comma-joined column names, one per value returned by `read`.
    fn csv_header(&self) -> String;

    fn columns(&self) -> usize;

    /// `Ok(None)` when the controller answered without data.
    fn read(&self) -> Result<Option<Vec<u16>>>;
}

/// Everything one tick reads, already converted to fields.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReading {
    pub temperature: Reading<f64>,
    pub humidity: Reading<f64>,
    pub pressure: Reading<f64>,
    pub capsense: Vec<Reading<u16>>,
}

impl TickReading {
    /// True when any collaborator reported a failure this tick.
    pub fn has_fault(&self) -> bool {
        self.temperature.is_error()
            || self.humidity.is_error()
            || self.pressure.is_error()
            || self.capsense.iter().any(Reading::is_error)
    }

    pub fn to_csv_fields(&self) -> String {
        let capsense = self
            .capsense
            .iter()
            .map(|field| field.to_string())
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "{:.2},{:.2},{:.2},{}",
            self.temperature, self.humidity, self.pressure, capsense
        )
    }
}

/// Shared handle over the sensor collaborators. Reads never fail; faults come
/// back as `Reading::Error` fields.
#[derive(Clone)]
pub struct SensorFacade {
    environment: Arc<dyn EnvironmentSensor>,
    capsense: Option<Arc<dyn CapsenseSensor>>,
}

impl SensorFacade {
    pub fn new(
        environment: Arc<dyn EnvironmentSensor>,
        capsense: Option<Arc<dyn CapsenseSensor>>,
    ) -> Self {
        Self {
            environment,
            capsense,
        }
    }

    pub fn capsense_header(&self) -> String {
        match &self.capsense {
            Some(sensor) => sensor.csv_header(),
            None => CAPSENSE_UNAVAILABLE_HEADER.to_string(),
        }
    }

    pub fn read(&self) -> TickReading {
        let (temperature, humidity, pressure) = match self.environment.read() {
            Ok(reading) => (
                Reading::Value(reading.temperature),
                Reading::Value(reading.humidity),
                Reading::Value(reading.pressure),
            ),
            Err(err) => {
                warn!("BME280 read failed: {err:#}");
                (Reading::Error, Reading::Error, Reading::Error)
            }
        };

        TickReading {
            temperature,
            humidity,
            pressure,
            capsense: self.read_capsense(),
        }
    }

    fn read_capsense(&self) -> Vec<Reading<u16>> {
        let Some(sensor) = &self.capsense else {
            return vec![Reading::NoSensor];
        };

        let columns = sensor.columns();
        match sensor.read() {
            Ok(Some(values)) if values.len() == columns => {
                values.into_iter().map(Reading::Value).collect()
            }
            Ok(Some(values)) => {
                warn!(
                    "capsense returned {} values, expected {}",
                    values.len(),
                    columns
                );
                vec![Reading::Error; columns]
            }
            Ok(None) => vec![Reading::Empty; columns],
            Err(err) => {
                warn!("capsense read failed: {err:#}");
                vec![Reading::Error; columns]
            }
        }
    }
}
