use serde::{ Deserialize, Deserializer, Serialize };
use serde_json::Value as JsonValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualizationType {
    Map,
    #[serde(other)]
    None,
}

impl Default for VisualizationType {
    fn default() -> Self {
        VisualizationType::None
    }
}

/// One location row as returned by the analysis model.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MapEntry {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    /// Geocoder-style address; used when `address` is missing or blank.
    #[serde(default)]
    pub formatted_address: Option<String>,
    #[serde(default, deserialize_with = "lenient_coordinate")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient_coordinate")]
    pub lng: Option<f64>,
    /// Models emit this as a number or a numeric string.
    #[serde(default)]
    pub visits: Option<JsonValue>,
    #[serde(default)]
    pub category: Option<String>,
}

/// Accepts a number or a numeric string. Anything else reads as absent so a
/// bad coordinate costs only that entry its map marker.
fn lenient_coordinate<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where D: Deserializer<'de>
{
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(match value {
        Some(JsonValue::Number(n)) => n.as_f64(),
        Some(JsonValue::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }.filter(|v| v.is_finite()))
}

impl MapEntry {
    pub fn resolved_address(&self) -> Option<&str> {
        [self.address.as_deref(), self.formatted_address.as_deref()]
            .into_iter()
            .flatten()
            .find(|a| !a.trim().is_empty())
    }

    pub fn visit_count(&self) -> u64 {
        match &self.visits {
            Some(JsonValue::Number(n)) =>
                n
                    .as_u64()
                    .or_else(|| n.as_f64().filter(|v| *v >= 0.0).map(|v| v.round() as u64))
                    .unwrap_or(0),
            Some(JsonValue::String(s)) => {
                let digits: String = s
                    .chars()
                    .filter(|c| c.is_ascii_digit())
                    .collect();
                digits.parse().unwrap_or(0)
            }
            _ => 0,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    #[serde(default)]
    pub visualization_type: VisualizationType,
    #[serde(default)]
    pub map_data: Vec<MapEntry>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

impl AnalysisResult {
    pub fn empty(reason: impl Into<String>) -> Self {
        Self {
            visualization_type: VisualizationType::None,
            map_data: Vec::new(),
            reasoning: Some(reason.into()),
        }
    }
}
