use serde::{Deserialize, Serialize};

/// Column layout of a capsense controller: every sensor reports every value
/// kind, columns are emitted sensor-major.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapsenseLayout {
    pub sensor_names: Vec<String>,
    pub value_names: Vec<String>,
}

impl Default for CapsenseLayout {
    fn default() -> Self {
        Self {
            sensor_names: vec!["CSD_360".into(), "CSD_100".into(), "CSD_20".into()],
            value_names: vec!["RawCount".into(), "DiffCount".into(), "Baseline".into()],
        }
    }
}

impl CapsenseLayout {
    pub fn columns(&self) -> usize {
        self.sensor_names.len() * self.value_names.len()
    }

    pub fn csv_header(&self) -> String {
        self.sensor_names
            .iter()
            .flat_map(|sensor| {
                self.value_names
                    .iter()
                    .map(move |value| format!("{sensor}_{value}"))
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}
