/// Completion of material texture sets with constant placeholder textures.
use crate::error::{ConversionError, IoContext, Result};
use crate::texture_set::{TextureKind, classify_file_name, list_file_names, strip_extension};
use constants::texture::PLACEHOLDER_TEXTURE_SIZE;
use image::{Rgb, RgbImage};
use rayon::prelude::*;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Requested content of one texture of a material.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ChannelSpec {
    /// Use the global default for this texture kind.
    #[default]
    Default,
    /// Normalized values: [0, 1] for colours and specular, [-1, 1] for normals.
    Normalized([f32; 3]),
    /// Final 8-bit texel values.
    Raw([u8; 3]),
}

impl ChannelSpec {
    /// Grey base colour of the given linear intensity.
    pub fn grey(value: f32) -> Self {
        ChannelSpec::Normalized([value; 3])
    }

    /// Dielectric specular parameters with the given roughness.
    pub fn dielectric(roughness: f32) -> Self {
        ChannelSpec::Normalized([1.0, roughness, 0.0])
    }

    /// Final texel for a texture of the given kind.
    pub fn resolve(self, kind: TextureKind) -> [u8; 3] {
        match self {
            ChannelSpec::Default => kind.default_texel(),
            ChannelSpec::Raw(texel) => texel,
            ChannelSpec::Normalized(values) => values.map(|v| match kind {
                TextureKind::BaseColor => unorm_to_byte(linear_to_srgb(v)),
                TextureKind::Normal => unorm_to_byte(v * 0.5 + 0.5),
                TextureKind::Specular => unorm_to_byte(v),
            }),
        }
    }
}

/// Partially specified texture triple of one material.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MaterialSpec {
    pub base_color: ChannelSpec,
    pub normal: ChannelSpec,
    pub specular: ChannelSpec,
}

impl MaterialSpec {
    pub fn new(base_color: ChannelSpec, normal: ChannelSpec, specular: ChannelSpec) -> Self {
        Self {
            base_color,
            normal,
            specular,
        }
    }

    pub fn channel(&self, kind: TextureKind) -> ChannelSpec {
        match kind {
            TextureKind::BaseColor => self.base_color,
            TextureKind::Normal => self.normal,
            TextureKind::Specular => self.specular,
        }
    }

    /// Resolves all three textures to 8-bit texels.
    pub fn resolve(&self) -> ResolvedMaterial {
        ResolvedMaterial {
            texels: TextureKind::ALL.map(|kind| self.channel(kind).resolve(kind)),
        }
    }
}

/// Concrete 8-bit RGB texel per texture kind, in [`TextureKind::ALL`] order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedMaterial {
    texels: [[u8; 3]; 3],
}

impl ResolvedMaterial {
    pub fn global_default() -> Self {
        MaterialSpec::default().resolve()
    }

    pub fn texel(&self, kind: TextureKind) -> [u8; 3] {
        self.texels[kind as usize]
    }
}

/// Materials requested by the caller, keyed by material name.
pub type MaterialMap = BTreeMap<String, MaterialSpec>;

/// Linear to sRGB encoding of a value in [0, 1], negative inputs clamp to 0.
pub fn linear_to_srgb(linear: f32) -> f32 {
    let linear = linear.max(0.0);
    if linear <= 0.0031308 {
        12.92 * linear
    } else {
        1.055 * linear.powf(1.0 / 2.4) - 0.055
    }
}

fn unorm_to_byte(value: f32) -> u8 {
    (value * 255.0).round_ties_even().clamp(0.0, 255.0) as u8
}

/// Makes sure every material in `directory` has a base colour, normal and
/// specular texture.
///
/// Materials are the keys of `materials` plus every prefix of a recognised
/// texture file in the directory. Explicit entries take precedence over
/// inferred ones, which use the global defaults. A texture counts as present
/// when any file with its stem exists, whatever the extension. Missing
/// textures are written as small constant PNG images. Returns the created
/// files.
pub fn complete_materials(directory: &Path, materials: &MaterialMap) -> Result<Vec<PathBuf>> {
    let mut full_materials: BTreeMap<String, ResolvedMaterial> = materials
        .iter()
        .map(|(name, spec)| (name.clone(), spec.resolve()))
        .collect();

    let file_names = list_file_names(directory)?;
    for file_name in &file_names {
        if let Some(texture) = classify_file_name(file_name) {
            if !materials.contains_key(texture.material) {
                full_materials
                    .entry(texture.material.to_string())
                    .or_insert_with(ResolvedMaterial::global_default);
            }
        }
    }

    let existing: HashSet<&str> = file_names.iter().map(|name| strip_extension(name)).collect();
    let existing = &existing;
    let missing: Vec<(PathBuf, [u8; 3])> = full_materials
        .iter()
        .flat_map(|(name, material)| {
            TextureKind::ALL.into_iter().filter_map(move |kind| {
                let stem = kind.texture_stem(name);
                (!existing.contains(stem.as_str()))
                    .then(|| (directory.join(format!("{stem}.png")), material.texel(kind)))
            })
        })
        .collect();

    missing
        .par_iter()
        .map(|(path, texel)| save_placeholder(path, *texel))
        .collect::<Result<Vec<()>>>()?;

    for (path, _) in &missing {
        log::info!("Created {}.", path.display());
    }
    Ok(missing.into_iter().map(|(path, _)| path).collect())
}

/// Writes a constant colour image at the placeholder resolution.
pub fn save_placeholder(path: &Path, texel: [u8; 3]) -> Result<()> {
    let size = PLACEHOLDER_TEXTURE_SIZE;
    let image = RgbImage::from_pixel(size, size, Rgb(texel));
    image.save(path)?;
    Ok(())
}

/// One texture entry of a material mapping file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChannelValue {
    Bytes([u8; 3]),
    Floats([f32; 3]),
    Scalar(f32),
}

/// A material in a mapping file: `[base, normal, specular]`,
/// `[base, specular]` or an object with named fields.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MaterialEntry {
    Triple(
        Option<ChannelValue>,
        Option<ChannelValue>,
        Option<ChannelValue>,
    ),
    Pair(Option<ChannelValue>, Option<ChannelValue>),
    Fields {
        #[serde(default)]
        base_color: Option<ChannelValue>,
        #[serde(default)]
        normal: Option<ChannelValue>,
        #[serde(default)]
        specular: Option<ChannelValue>,
    },
}

fn channel_spec(name: &str, kind: TextureKind, value: Option<ChannelValue>) -> Result<ChannelSpec> {
    Ok(match value {
        None => ChannelSpec::Default,
        Some(ChannelValue::Bytes(texel)) => ChannelSpec::Raw(texel),
        Some(ChannelValue::Floats(values)) => ChannelSpec::Normalized(values),
        Some(ChannelValue::Scalar(value)) => match kind {
            TextureKind::BaseColor => ChannelSpec::grey(value),
            TextureKind::Specular => ChannelSpec::dielectric(value),
            TextureKind::Normal => {
                return Err(ConversionError::InvalidMaterial {
                    name: name.to_string(),
                    reason: "a normal needs three components".to_string(),
                });
            }
        },
    })
}

/// Parses a JSON material mapping.
///
/// ```json
/// { "wood": [0.5, null, 0.2], "tiles": { "normal": [0.0, 0.0, 1.0] } }
/// ```
pub fn parse_material_map(json: &str) -> Result<MaterialMap> {
    let entries: BTreeMap<String, MaterialEntry> = serde_json::from_str(json)?;
    entries
        .into_iter()
        .map(|(name, entry)| {
            let (base_color, normal, specular) = match entry {
                MaterialEntry::Triple(b, n, s) => (b, n, s),
                MaterialEntry::Pair(b, s) => (b, None, s),
                MaterialEntry::Fields {
                    base_color,
                    normal,
                    specular,
                } => (base_color, normal, specular),
            };
            let spec = MaterialSpec::new(
                channel_spec(&name, TextureKind::BaseColor, base_color)?,
                channel_spec(&name, TextureKind::Normal, normal)?,
                channel_spec(&name, TextureKind::Specular, specular)?,
            );
            Ok((name, spec))
        })
        .collect()
}

/// Loads a JSON material mapping from disk.
pub fn load_material_map(path: &Path) -> Result<MaterialMap> {
    let json = fs::read_to_string(path).at(path)?;
    parse_material_map(&json)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("asset_conversion_materials_test_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn pixel(path: &Path) -> [u8; 3] {
        let image = image::open(path).unwrap().to_rgb8();
        assert_eq!(image.dimensions(), (4, 4));
        let first = image.get_pixel(0, 0).0;
        assert!(image.pixels().all(|p| p.0 == first));
        first
    }

    fn wood() -> MaterialMap {
        let mut materials = MaterialMap::new();
        materials.insert(
            "wood".to_string(),
            MaterialSpec::new(
                ChannelSpec::grey(0.5),
                ChannelSpec::Default,
                ChannelSpec::dielectric(0.2),
            ),
        );
        materials
    }

    #[test]
    fn srgb_encoding() {
        assert_eq!(linear_to_srgb(0.0), 0.0);
        assert_eq!(linear_to_srgb(-1.0), 0.0);
        assert!((linear_to_srgb(0.002) - 0.02584).abs() < 1e-5);
        assert!((linear_to_srgb(1.0) - 1.0).abs() < 1e-6);
        assert!((linear_to_srgb(0.5) - 0.735357).abs() < 1e-5);
    }

    #[test]
    fn channels_resolve_per_kind() {
        assert_eq!(ChannelSpec::grey(0.5).resolve(TextureKind::BaseColor), [188, 188, 188]);
        assert_eq!(
            ChannelSpec::Normalized([0.0, 0.0, 1.0]).resolve(TextureKind::Normal),
            [128, 128, 255]
        );
        assert_eq!(
            ChannelSpec::Normalized([-1.0, 1.0, 0.0]).resolve(TextureKind::Normal),
            [0, 255, 128]
        );
        assert_eq!(ChannelSpec::dielectric(0.2).resolve(TextureKind::Specular), [255, 51, 0]);
        assert_eq!(ChannelSpec::Raw([1, 2, 3]).resolve(TextureKind::Normal), [1, 2, 3]);
        assert_eq!(ChannelSpec::Default.resolve(TextureKind::Specular), [255, 128, 0]);
        assert_eq!(
            ResolvedMaterial::global_default().texel(TextureKind::BaseColor),
            [0, 0, 0]
        );
    }

    #[test]
    fn wood_on_empty_directory() {
        let dir = temp_dir("wood");

        let created = complete_materials(&dir, &wood()).unwrap();

        assert_eq!(created.len(), 3);
        let mut entries: Vec<String> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        entries.sort();
        assert_eq!(
            entries,
            vec!["wood_BaseColor.png", "wood_Normal.png", "wood_Specular.png"]
        );
        assert_eq!(pixel(&dir.join("wood_BaseColor.png")), [188, 188, 188]);
        assert_eq!(pixel(&dir.join("wood_Normal.png")), [128, 128, 255]);
        assert_eq!(pixel(&dir.join("wood_Specular.png")), [255, 51, 0]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn second_run_changes_nothing() {
        let dir = temp_dir("idempotent");
        std::fs::write(dir.join("stone_Normal.jpg"), b"not really a jpeg").unwrap();

        let first = complete_materials(&dir, &wood()).unwrap();
        assert_eq!(first.len(), 5);
        let second = complete_materials(&dir, &wood()).unwrap();
        assert!(second.is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn infers_materials_from_directory() {
        let dir = temp_dir("infer");
        std::fs::write(dir.join("stone_Normal.jpg"), b"").unwrap();
        std::fs::write(dir.join("notes.txt"), b"").unwrap();
        std::fs::write(dir.join("metal_BaseColor.vkt"), b"").unwrap();

        let created = complete_materials(&dir, &MaterialMap::new()).unwrap();

        assert_eq!(
            created,
            vec![dir.join("stone_BaseColor.png"), dir.join("stone_Specular.png")]
        );
        assert_eq!(pixel(&dir.join("stone_BaseColor.png")), [0, 0, 0]);
        assert_eq!(pixel(&dir.join("stone_Specular.png")), [255, 128, 0]);
        assert!(!dir.join("stone_Normal.png").exists());
        assert!(!dir.join("metal_Normal.png").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn explicit_mapping_beats_inference() {
        let dir = temp_dir("explicit");
        std::fs::write(dir.join("wood_Normal.tga"), b"").unwrap();

        let created = complete_materials(&dir, &wood()).unwrap();

        assert_eq!(created.len(), 2);
        assert_eq!(pixel(&dir.join("wood_BaseColor.png")), [188, 188, 188]);
        assert_eq!(pixel(&dir.join("wood_Specular.png")), [255, 51, 0]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn container_files_count_as_present() {
        let dir = temp_dir("present");
        std::fs::write(dir.join("wood_BaseColor.vkt"), b"").unwrap();
        std::fs::write(dir.join("wood_Normal.png"), b"").unwrap();

        let created = complete_materials(&dir, &wood()).unwrap();
        assert_eq!(created, vec![dir.join("wood_Specular.png")]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = std::env::temp_dir().join("asset_conversion_materials_test_missing");
        let _ = std::fs::remove_dir_all(&dir);
        assert!(matches!(
            complete_materials(&dir, &wood()),
            Err(ConversionError::Io { .. })
        ));
    }

    #[test]
    fn parses_mapping_shorthands() {
        let map = parse_material_map(
            r#"{
                "wood": [0.5, null, 0.2],
                "metal": [[200, 10, 10], 0.1],
                "tiles": {"normal": [0.0, 0.0, 1.0]},
                "rubber": [[0.1, 0.1, 0.1], null, [1.0, 0.8, 0.0]]
            }"#,
        )
        .unwrap();

        assert_eq!(map["wood"], wood()["wood"]);
        assert_eq!(
            map["metal"],
            MaterialSpec::new(
                ChannelSpec::Raw([200, 10, 10]),
                ChannelSpec::Default,
                ChannelSpec::dielectric(0.1)
            )
        );
        assert_eq!(map["tiles"].normal, ChannelSpec::Normalized([0.0, 0.0, 1.0]));
        assert_eq!(map["tiles"].base_color, ChannelSpec::Default);
        assert_eq!(
            map["rubber"].base_color,
            ChannelSpec::Normalized([0.1, 0.1, 0.1])
        );
        assert_eq!(map["rubber"].specular.resolve(TextureKind::Specular), [255, 204, 0]);
    }

    #[test]
    fn scalar_normal_is_rejected() {
        let err = parse_material_map(r#"{"odd": [null, 0.5, null]}"#).unwrap_err();
        assert!(matches!(err, ConversionError::InvalidMaterial { .. }));
    }
}
