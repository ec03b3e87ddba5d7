/// Ingestion of sparse scalar grids into volume containers.
///
/// Grid sources describe index space with voxel boundaries on integer
/// coordinates: voxel `(i, j, k)` covers `[i, i + 1) x [j, j + 1) x [k, k + 1)`.
/// Sources whose voxel centres sit on integers fold the half voxel shift into
/// their transform.
use crate::bounds::VoxelBounds;
use crate::error::{ConversionError, IoContext, Result};
use crate::volume_container::{DenseVolume, TexelToWorld, VolumeFormat, write_volume};
use constants::volume::VOLUME_FILE_EXTENSION;
use glam::{Affine3A, Mat4, Vec3};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Grid loaded when the caller names none.
pub const DEFAULT_GRID_NAME: &str = "density";

/// Index to world mapping of a grid.
#[derive(Debug, Clone, PartialEq)]
pub enum GridTransform {
    Linear(Affine3A),
    /// Frustum and other maps without a 3x4 matrix form.
    NonLinear(String),
}

impl GridTransform {
    /// Cubic voxels of the given edge length, index origin at `origin`.
    pub fn uniform(voxel_size: f32, origin: Vec3) -> Self {
        GridTransform::Linear(Affine3A::from_scale_rotation_translation(
            Vec3::splat(voxel_size),
            glam::Quat::IDENTITY,
            origin,
        ))
    }

    /// Linear transform from the rows of a 3x4 index to world matrix.
    pub fn from_rows(rows: &TexelToWorld) -> Self {
        GridTransform::Linear(Affine3A::from_mat4(affine_matrix(rows)))
    }
}

fn affine_matrix(rows: &TexelToWorld) -> Mat4 {
    let [r0, r1, r2] = *rows;
    Mat4::from_cols_array_2d(&[r0, r1, r2, [0.0, 0.0, 0.0, 1.0]]).transpose()
}

/// A named scalar grid as provided by a volumetric source file.
pub trait GridSource {
    fn name(&self) -> &str;

    /// Value of voxels that are not stored.
    fn background(&self) -> f32;

    /// Index coordinates of all active voxels, in no particular order.
    fn active_voxels(&self) -> Box<dyn Iterator<Item = [i32; 3]> + '_>;

    /// Value at any index, the background for inactive voxels.
    fn value(&self, ijk: [i32; 3]) -> f32;

    fn transform(&self) -> &GridTransform;

    /// Minimal box covering all active voxels.
    fn active_bounds(&self) -> Option<VoxelBounds> {
        VoxelBounds::enclosing(self.active_voxels())
    }
}

/// In-memory sparse grid. Voxels holding the background value are inactive.
#[derive(Debug, Clone)]
pub struct SparseGrid {
    name: String,
    background: f32,
    voxels: HashMap<[i32; 3], f32>,
    transform: GridTransform,
}

impl SparseGrid {
    pub fn new(name: impl Into<String>, background: f32, transform: GridTransform) -> Self {
        Self {
            name: name.into(),
            background,
            voxels: HashMap::new(),
            transform,
        }
    }

    pub fn set(&mut self, ijk: [i32; 3], value: f32) {
        if value == self.background {
            self.voxels.remove(&ijk);
        } else {
            self.voxels.insert(ijk, value);
        }
    }

    pub fn active_count(&self) -> usize {
        self.voxels.len()
    }
}

impl GridSource for SparseGrid {
    fn name(&self) -> &str {
        &self.name
    }

    fn background(&self) -> f32 {
        self.background
    }

    fn active_voxels(&self) -> Box<dyn Iterator<Item = [i32; 3]> + '_> {
        Box::new(self.voxels.keys().copied())
    }

    fn value(&self, ijk: [i32; 3]) -> f32 {
        self.voxels.get(&ijk).copied().unwrap_or(self.background)
    }

    fn transform(&self) -> &GridTransform {
        &self.transform
    }
}

/// Named grids loaded from one volumetric source file.
#[derive(Debug, Clone, Default)]
pub struct GridFile {
    grids: Vec<SparseGrid>,
}

impl GridFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, grid: SparseGrid) {
        self.grids.retain(|g| g.name != grid.name);
        self.grids.push(grid);
    }

    pub fn grid(&self, name: &str) -> Result<&SparseGrid> {
        self.grids
            .iter()
            .find(|g| g.name == name)
            .ok_or_else(|| ConversionError::GridNotFound(name.to_string()))
    }

    /// Parses a JSON grid document.
    ///
    /// ```json
    /// { "grids": [{
    ///     "name": "density",
    ///     "background": 0.0,
    ///     "transform": { "linear": [[1, 0, 0, 0], [0, 1, 0, 0], [0, 0, 1, 0]] },
    ///     "voxels": [[[0, 0, 0], 0.5], [[1, 0, 0], 0.25]]
    /// }] }
    /// ```
    pub fn parse(json: &str) -> Result<Self> {
        let document: GridDocument = serde_json::from_str(json)?;
        let mut file = GridFile::new();
        for record in document.grids {
            let transform = match record.transform {
                TransformRecord::Linear(rows) => GridTransform::from_rows(&rows),
                TransformRecord::NonLinear(kind) => GridTransform::NonLinear(kind),
            };
            let mut grid = SparseGrid::new(record.name, record.background, transform);
            for (ijk, value) in record.voxels {
                grid.set(ijk, value);
            }
            file.insert(grid);
        }
        Ok(file)
    }

    /// Loads the grids of a volumetric source file, chosen by extension.
    pub fn load(path: &Path) -> Result<Self> {
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if !is_json {
            return Err(ConversionError::UnsupportedGridFile(path.to_path_buf()));
        }
        let json = fs::read_to_string(path).at(path)?;
        Self::parse(&json)
    }
}

#[derive(Debug, Deserialize)]
struct GridDocument {
    grids: Vec<GridRecord>,
}

#[derive(Debug, Deserialize)]
struct GridRecord {
    name: String,
    #[serde(default)]
    background: f32,
    transform: TransformRecord,
    /// Index coordinates with their values.
    voxels: Vec<([i32; 3], f32)>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum TransformRecord {
    /// Row-major 3x4 index to world matrix.
    Linear(TexelToWorld),
    NonLinear(String),
}

/// Dense copy of a grid's active region with its texel to world transform.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseGrid {
    pub volume: DenseVolume,
    pub texel_to_world: TexelToWorld,
    pub bounds: VoxelBounds,
}

/// Copies the active bounding box of a grid into a dense array.
///
/// Texel `(0, 0, 0)` of the result is the corner of the minimal active voxel,
/// so the transform is the grid transform shifted by the bounds minimum.
pub fn extract_dense(grid: &dyn GridSource) -> Result<DenseGrid> {
    let affine = match grid.transform() {
        GridTransform::Linear(affine) => *affine,
        GridTransform::NonLinear(kind) => {
            return Err(ConversionError::UnsupportedTransform(kind.clone()));
        }
    };
    let bounds = grid
        .active_bounds()
        .ok_or_else(|| ConversionError::EmptyGrid(grid.name().to_string()))?;

    let extent = bounds.extent();
    let mut volume = DenseVolume::filled(extent, grid.background());
    for x in 0..extent[0] {
        for y in 0..extent[1] {
            for z in 0..extent[2] {
                let ijk = [
                    bounds.min[0] + x as i32,
                    bounds.min[1] + y as i32,
                    bounds.min[2] + z as i32,
                ];
                volume.set(x, y, z, grid.value(ijk));
            }
        }
    }

    let min = Vec3::new(
        bounds.min[0] as f32,
        bounds.min[1] as f32,
        bounds.min[2] as f32,
    );
    let origin = affine.transform_point3(min);
    let axes = [Vec3::X, Vec3::Y, Vec3::Z].map(|unit| affine.transform_point3(min + unit) - origin);
    let texel_to_world = [0, 1, 2].map(|row| {
        [
            axes[0][row],
            axes[1][row],
            axes[2][row],
            origin[row],
        ]
    });

    log::debug!(
        "Grid '{}' active region {:?} to {:?}",
        grid.name(),
        bounds.min,
        bounds.max
    );
    Ok(DenseGrid {
        volume,
        texel_to_world,
        bounds,
    })
}

/// Applies a 4x4 world space transform on top of a texel to world transform.
pub fn compose_transform(
    world_to_new_world: Mat4,
    texel_to_world: &TexelToWorld,
) -> TexelToWorld {
    let combined = world_to_new_world * affine_matrix(texel_to_world);
    [0, 1, 2].map(|row| combined.row(row).to_array())
}

/// Rotation taking y-up world space to z-up world space.
pub fn y_up_to_z_up() -> Mat4 {
    Mat4::from_cols_array_2d(&[
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, -1.0, 0.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ])
}

/// Settings for [`convert_volume`].
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeOptions {
    /// Factor applied to every voxel value.
    pub value_scale: f32,
    /// Transform applied after the grid's own index to world transform.
    pub world_to_new_world: Mat4,
    pub format: VolumeFormat,
}

impl Default for VolumeOptions {
    fn default() -> Self {
        Self {
            value_scale: 1.0,
            world_to_new_world: Mat4::IDENTITY,
            format: VolumeFormat::Float16,
        }
    }
}

/// Output path for a converted volume: the source path with a `.blob` extension.
pub fn volume_output_path(source: &Path) -> PathBuf {
    source.with_extension(VOLUME_FILE_EXTENSION)
}

/// Converts the active region of a grid into a volume container.
pub fn convert_volume(
    grid: &dyn GridSource,
    output: &Path,
    options: &VolumeOptions,
) -> Result<()> {
    let DenseGrid {
        mut volume,
        texel_to_world,
        ..
    } = extract_dense(grid)?;
    if options.value_scale != 1.0 {
        volume.scale(options.value_scale);
    }
    let texel_to_new_world = compose_transform(options.world_to_new_world, &texel_to_world);
    write_volume(output, &volume, &texel_to_new_world, options.format.code())
}

/// Converts grid `grid_name` of a source file into a `.blob` next to it.
/// Returns the path of the written container.
pub fn convert_volume_file(
    source: &Path,
    grid_name: &str,
    options: &VolumeOptions,
) -> Result<PathBuf> {
    let file = GridFile::load(source)?;
    let output = volume_output_path(source);
    convert_volume(file.grid(grid_name)?, &output, options)?;
    Ok(output)
}
