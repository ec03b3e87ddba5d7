//! File format constants shared between the asset conversion tools and the renderer.

pub mod lights;
pub mod texture;
pub mod volume;
