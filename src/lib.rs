//! # Overview
//!
//! This crate generates resized image derivatives on demand in front of an
//! object store.
//!
//! A request names an original object by its path and asks for a size with
//! query parameters (`w`, `h`, `q` and the `s` presets `s`/`m`/`l`). The
//! original is shrunk to satisfy the constrained axis, center-cropped and
//! re-encoded in its own format. Results small enough for the edge are
//! returned inline as base64; larger ones are written back to the store under
//! a deterministic derived key (for example `albums/w400q60_photo.jpg`) and the
//! caller is redirected there. Later requests for the same derivative are
//! redirected straight away.
//!
//! # Usage
//!
//! ```rust,no_run
//! use edge_image_derive::{EdgeEvent, HttpObjectStore, ImageDeriverBuilder};
//! use tower::{Service, ServiceExt};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Set up the store once per process.
//!     let store = HttpObjectStore::new("https://images.example.com/".parse()?);
//!     let mut deriver = ImageDeriverBuilder::new(store).build();
//!
//!     let event = EdgeEvent::from_json(
//!         r#"{"Records": [{"cf": {"request": {
//!             "uri": "/albums/photo.jpg",
//!             "querystring": "w=400&q=60",
//!             "headers": {}
//!         }}}]}"#,
//!     )?;
//!     let response = deriver.ready().await?.call(event).await?;
//!
//!     println!("{}", serde_json::to_string(&response)?);
//!
//!     Ok(())
//! }
//! ```
#![warn(
    clippy::all,
    nonstandard_style,
    future_incompatible,
    missing_docs,
    missing_debug_implementations
)]
#![forbid(unsafe_code)]

pub mod cache;
mod derived_key;
pub mod envelope;
mod http_store;
pub mod image_type;
pub mod policy;
mod service;
pub mod store;
pub mod transform;
mod transformation_params;

pub use cache::CacheStatus;
pub use derived_key::DerivedKey;
pub use envelope::{BodyEncoding, EdgeEvent, EdgeRequest, EdgeResponse};
pub use http_store::{HttpObjectStore, STORE_URL_ENV};
pub use image_type::{SupportedImageTypes, DEFAULT_SUPPORTED_IMAGE_TYPES};
pub use service::{DeriveError, ImageDeriver, ImageDeriverBuilder};
pub use store::{MemoryStore, ObjectStore, StoreError, StoredObject};
pub use transform::TransformError;
pub use transformation_params::{
    ParamsError, Quality, SizePreset, TransformSpec, TransformationParams, DEFAULT_QUALITY,
};
