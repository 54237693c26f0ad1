//! Hash-keyed observations in upload order

use image::DynamicImage;
use std::collections::HashMap;

use crate::models::{ImageHash, InputObservation};

/// Observations, their images and their render order as one unit
///
/// Images are read through the owning observation and the order list is
/// only written when an observation is inserted, so every hash present in
/// one view is present in the others. Membership is fixed after
/// construction; a new file set means a new `ObservationSet`.
#[derive(Debug, Clone, Default)]
pub struct ObservationSet {
    observations: HashMap<ImageHash, InputObservation>,
    image_hashes: Vec<ImageHash>,
}

impl ObservationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identical bytes produce the same hash: a later copy overwrites the
    /// earlier one and keeps its position
    pub fn from_observations(observations: impl IntoIterator<Item = InputObservation>) -> Self {
        let mut set = Self::new();
        for observation in observations {
            let hash = observation.image_md5().clone();
            if set.observations.insert(hash.clone(), observation).is_none() {
                set.image_hashes.push(hash);
            } else {
                tracing::debug!(image_hash = %hash, "Duplicate upload replaced existing observation");
            }
        }
        set
    }

    pub fn len(&self) -> usize {
        self.image_hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image_hashes.is_empty()
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.observations.contains_key(hash)
    }

    pub fn get(&self, hash: &str) -> Option<&InputObservation> {
        self.observations.get(hash)
    }

    pub(crate) fn get_mut(&mut self, hash: &str) -> Option<&mut InputObservation> {
        self.observations.get_mut(hash)
    }

    pub fn image(&self, hash: &str) -> Option<&DynamicImage> {
        self.observations.get(hash).map(InputObservation::image)
    }

    pub fn image_hashes(&self) -> &[ImageHash] {
        &self.image_hashes
    }

    /// Observations in upload order
    pub fn iter(&self) -> impl Iterator<Item = &InputObservation> + '_ {
        self.image_hashes
            .iter()
            .filter_map(move |hash| self.observations.get(hash))
    }

    /// Images in upload order
    pub fn images(&self) -> impl Iterator<Item = (&ImageHash, &DynamicImage)> + '_ {
        self.iter().map(|o| (o.image_md5(), o.image()))
    }

    pub(crate) fn for_each_mut(&mut self, mut f: impl FnMut(&mut InputObservation)) {
        self.observations.values_mut().for_each(|o| f(o));
    }

    /// Keep entered metadata for hashes present in both sets
    pub(crate) fn carry_metadata_from(&mut self, previous: &ObservationSet) -> usize {
        let mut carried = 0;
        for (hash, observation) in self.observations.iter_mut() {
            if let Some(old) = previous.observations.get(hash) {
                observation.carry_metadata_from(old);
                carried += 1;
            }
        }
        carried
    }
}
