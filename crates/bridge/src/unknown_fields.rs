use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Captures JSON object fields not modeled explicitly, so round-tripping a
/// request or response never silently drops data the caller sent.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnknownFields(pub HashMap<String, Value>);
