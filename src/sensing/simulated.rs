//! Software stand-ins for the BME280 and the capsense board, used when the
//! logger runs off-target.

use anyhow::{bail, Result};
use rand::Rng;

use super::capsense::CapsenseLayout;
use super::facade::{CapsenseSensor, EnvironmentReading, EnvironmentSensor};

pub struct SimulatedEnvironment {
    fault_probability: f64,
}

impl SimulatedEnvironment {
    pub fn new(fault_probability: f64) -> Self {
        let fault_probability = if fault_probability.is_finite() {
            fault_probability.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self { fault_probability }
    }
}

impl EnvironmentSensor for SimulatedEnvironment {
    fn read(&self) -> Result<EnvironmentReading> {
        let mut rng = rand::thread_rng();
        if rng.gen_bool(self.fault_probability) {
            bail!("simulated I2C timeout");
        }
        Ok(EnvironmentReading {
            temperature: 22.0 + rng.gen_range(-0.5..0.5),
            humidity: 45.0 + rng.gen_range(-2.0..2.0),
            pressure: 1013.25 + rng.gen_range(-0.8..0.8),
        })
    }
}

pub struct SimulatedCapsense {
    layout: CapsenseLayout,
}

impl SimulatedCapsense {
    pub fn new(layout: CapsenseLayout) -> Self {
        Self { layout }
    }
}

impl CapsenseSensor for SimulatedCapsense {
    fn csv_header(&self) -> String {
        self.layout.csv_header()
    }

    fn columns(&self) -> usize {
        self.layout.columns()
    }

    fn read(&self) -> Result<Option<Vec<u16>>> {
        let mut rng = rand::thread_rng();
        let values = (0..self.columns())
            .map(|_| rng.gen_range(900..1100))
            .collect();
        Ok(Some(values))
    }
}
