use serde::{Deserialize, Serialize};

/// A delivery resource and the driver who owns it. Maintained by fleet
/// management; the core only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Truck {
    #[serde(rename = "_id")]
    pub id: i64,
    pub driver_id: String,
    #[serde(default)]
    pub plate_number: String,
    pub capacity: Option<String>,
    #[serde(default)]
    pub active: bool,
}
