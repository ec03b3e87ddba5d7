//! Offline conversion of authored assets into the renderer's container formats.
//!
//! Textures go through an external block compression converter, driven by
//! [`scheduler::convert_textures`]. Volumes and light lists are written
//! directly by [`volume_container`] and [`light_list`].
pub mod bounds;
pub mod config;
pub mod error;
pub mod format_registry;
pub mod light_list;
pub mod materials;
pub mod scheduler;
pub mod texture_set;
pub mod volume;
pub mod volume_container;

pub use config::ConversionConfig;
pub use error::{ConversionError, Result};
