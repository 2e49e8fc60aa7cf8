use log::{ info, warn };
use std::sync::Arc;

use super::analysis::TextAnalyzer;
use crate::models::analysis::{ AnalysisResult, VisualizationType };
use crate::models::chat::{ Coordinates, Place };

const UNNAMED_PLACE: &str = "Unnamed place";

/// Turns finalized answer text into ordered place records. Never fails:
/// analyzer errors become an empty result.
#[derive(Clone)]
pub struct PlaceExtractor {
    analyzer: Arc<dyn TextAnalyzer>,
}

impl PlaceExtractor {
    pub fn new(analyzer: Arc<dyn TextAnalyzer>) -> Self {
        Self { analyzer }
    }

    pub async fn extract(&self, text: &str) -> Vec<Place> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        match self.analyzer.analyze(text).await {
            Ok(result) => {
                let places = places_from_analysis(&result);
                info!(
                    "Extracted {} place(s), {} mappable",
                    places.len(),
                    places
                        .iter()
                        .filter(|p| p.is_mappable())
                        .count()
                );
                places
            }
            Err(e) => {
                warn!("Place extraction failed, treating turn as having no places: {}", e);
                Vec::new()
            }
        }
    }
}

/// Maps a `map` analysis to places numbered 1.. in reply order. Any other
/// visualization type yields nothing.
pub fn places_from_analysis(result: &AnalysisResult) -> Vec<Place> {
    if result.visualization_type != VisualizationType::Map {
        return Vec::new();
    }

    result.map_data
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let address = entry.resolved_address().unwrap_or_default().to_string();
            let name = entry.name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .or_else(|| Some(address.clone()).filter(|a| !a.trim().is_empty()))
                .unwrap_or_else(|| UNNAMED_PLACE.to_string());

            Place {
                ordinal: (index as u32) + 1,
                name,
                address,
                category: entry.category.clone().unwrap_or_default(),
                visit_count: entry.visit_count(),
                coordinates: match (entry.lat, entry.lng) {
                    (Some(lat), Some(lng)) => Coordinates::new(lat, lng),
                    _ => None,
                },
            }
        })
        .collect()
}
