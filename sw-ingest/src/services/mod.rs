//! External collaborators: classifier, dataset store, metadata reader

pub mod classifier;
pub mod dataset_store;
pub mod image_metadata;

pub use classifier::{Classifier, ClassifierError, HfClassifier, Prediction};
pub use dataset_store::{
    observation_path, CommitInfo, DatasetError, DatasetStore, HfDatasetStore, MemoryDatasetStore,
};
pub use image_metadata::{ExifMetadataReader, ImageMetadata, ImageMetadataReader, NoMetadata};
