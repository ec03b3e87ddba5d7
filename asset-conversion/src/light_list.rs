/// Spherical light list container and import of authored light placements.
///
/// Layout, little-endian: a `u32` light count followed by one record per
/// light holding a `f32[3]` world position and a `f32` radius. All lights
/// share one brightness that lives in the renderer.
use crate::error::{ConversionError, IoContext, Result};
use constants::lights::{LIGHT_RECORD_SIZE, SPHERICAL_LIGHT_MESH};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Spherical light: a scaled instance of the unit sphere proxy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointLight {
    pub position: [f32; 3],
    pub radius: f32,
}

/// Object placement exported by the authoring tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightPlacement {
    pub location: [f32; 3],
    pub scale: [f32; 3],
    /// Mesh the object instantiates; unnamed placements are taken as lights.
    #[serde(default)]
    pub mesh: Option<String>,
}

impl LightPlacement {
    /// Whether this object instantiates the spherical light proxy.
    pub fn is_spherical_light(&self) -> bool {
        self.mesh
            .as_deref()
            .is_none_or(|mesh| mesh == SPHERICAL_LIGHT_MESH)
    }
}

impl From<&LightPlacement> for PointLight {
    /// The proxy is a unit sphere scaled uniformly, so the first scale
    /// component is the radius.
    fn from(placement: &LightPlacement) -> Self {
        PointLight {
            position: placement.location,
            radius: placement.scale[0],
        }
    }
}

/// Lights for every spherical light placement, in input order.
pub fn lights_from_placements(placements: &[LightPlacement]) -> Vec<PointLight> {
    placements
        .iter()
        .filter(|placement| placement.is_spherical_light())
        .map(PointLight::from)
        .collect()
}

/// Loads placements from a JSON array.
pub fn load_placements(path: &Path) -> Result<Vec<LightPlacement>> {
    let text = fs::read_to_string(path).at(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Writes lights in input order, without reordering or deduplication.
pub fn write_light_list(path: &Path, lights: &[PointLight]) -> Result<()> {
    let count =
        u32::try_from(lights.len()).map_err(|_| ConversionError::TooManyLights(lights.len()))?;

    let mut bytes = Vec::with_capacity(4 + lights.len() * LIGHT_RECORD_SIZE);
    bytes.extend_from_slice(&count.to_le_bytes());
    for light in lights {
        for coordinate in light.position {
            bytes.extend_from_slice(&coordinate.to_le_bytes());
        }
        bytes.extend_from_slice(&light.radius.to_le_bytes());
    }

    let mut file = BufWriter::new(File::create(path).at(path)?);
    file.write_all(&bytes).at(path)?;
    file.flush().at(path)?;
    log::info!("Saved {} lights to {}", lights.len(), path.display());
    Ok(())
}

/// Reads a light list, checking that the count matches the records.
pub fn read_light_list(path: &Path) -> Result<Vec<PointLight>> {
    let bytes = fs::read(path).at(path)?;
    if bytes.len() < 4 {
        return Err(ConversionError::invalid_container(path, "missing light count"));
    }
    let count = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let records = &bytes[4..];
    if records.len() != count * LIGHT_RECORD_SIZE {
        return Err(ConversionError::invalid_container(
            path,
            format!(
                "{} lights announced but {} bytes of records present",
                count,
                records.len()
            ),
        ));
    }

    let float = |chunk: &[u8], i: usize| {
        f32::from_le_bytes([chunk[4 * i], chunk[4 * i + 1], chunk[4 * i + 2], chunk[4 * i + 3]])
    };
    Ok(records
        .chunks_exact(LIGHT_RECORD_SIZE)
        .map(|chunk| PointLight {
            position: [float(chunk, 0), float(chunk, 1), float(chunk, 2)],
            radius: float(chunk, 3),
        })
        .collect())
}

/// Converts a placement export into a light list file.
pub fn export_lights(placements_path: &Path, output: &Path) -> Result<usize> {
    let placements = load_placements(placements_path)?;
    let lights = lights_from_placements(&placements);
    let skipped = placements.len() - lights.len();
    if skipped > 0 {
        log::debug!("Skipped {} placements that are not spherical lights", skipped);
    }
    write_light_list(output, &lights)?;
    Ok(lights.len())
}
