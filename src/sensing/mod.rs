pub mod capsense;
pub mod facade;
pub mod simulated;

pub use capsense::CapsenseLayout;
pub use facade::{
    CapsenseSensor, EnvironmentReading, EnvironmentSensor, Reading, SensorFacade, TickReading,
    CAPSENSE_UNAVAILABLE_HEADER,
};
pub use simulated::{SimulatedCapsense, SimulatedEnvironment};
