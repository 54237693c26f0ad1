//! Species reference gallery data

use axum::{extract::Path, routing::get, Json, Router};
use serde::Serialize;

use crate::error::{ApiError, ApiResult};
use crate::species::{self, format_whale_name, Species, WHALE_CLASSES};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct SpeciesEntry {
    #[serde(flatten)]
    pub species: Species,
    pub display_name: String,
}

impl From<&Species> for SpeciesEntry {
    fn from(species: &Species) -> Self {
        Self {
            species: *species,
            display_name: format_whale_name(species.class),
        }
    }
}

/// GET /species
pub async fn list_species() -> Json<Vec<SpeciesEntry>> {
    Json(WHALE_CLASSES.iter().map(SpeciesEntry::from).collect())
}

/// GET /species/:class
pub async fn get_species(Path(class): Path<String>) -> ApiResult<Json<SpeciesEntry>> {
    species::find(&class)
        .map(|s| Json(SpeciesEntry::from(s)))
        .ok_or_else(|| ApiError::NotFound(format!("Species {}", class)))
}

pub fn species_routes() -> Router<AppState> {
    Router::new()
        .route("/species", get(list_species))
        .route("/species/:class", get(get_species))
}
