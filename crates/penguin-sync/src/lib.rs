//! Remote artifact transport: downloads model files from object storage.

pub mod gcs;

pub use gcs::{
    Credentials, DEFAULT_ENDPOINT, FetchConfig, FetchError, GcsFetcher, ObjectFetcher,
};
