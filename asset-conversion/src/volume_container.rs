/// Volume container writer and reader.
///
/// Layout, all little-endian:
///
/// ```text
/// u64           marker          0x656d756c6f76 ("volume")
/// u64           version         0
/// u64[3]        extent          voxel counts along x, y, z
/// u32           value_format    VkFormat of the voxel values (76 or 100)
/// f32[3][4]     texel_to_world  row-major affine transform
/// payload       voxel values, x varying fastest
/// ```
///
/// In texel space voxel boundaries have integer coordinates and the first
/// voxel corresponds to the unit cube.
use crate::error::{ConversionError, IoContext, Result};
use constants::volume::{
    SUPPORTED_VOLUME_FORMATS, VK_FORMAT_R16_SFLOAT, VK_FORMAT_R32_SFLOAT, VOLUME_FILE_MARKER,
    VOLUME_FILE_VERSION, VOLUME_HEADER_SIZE,
};
use half::f16;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Row-major 3x4 affine map from texel space to world space.
pub type TexelToWorld = [[f32; 4]; 3];

/// Quantization of stored voxel values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeFormat {
    /// VK_FORMAT_R16_SFLOAT
    Float16,
    /// VK_FORMAT_R32_SFLOAT
    Float32,
}

impl VolumeFormat {
    pub fn code(self) -> u32 {
        match self {
            VolumeFormat::Float16 => VK_FORMAT_R16_SFLOAT,
            VolumeFormat::Float32 => VK_FORMAT_R32_SFLOAT,
        }
    }

    pub fn bytes_per_value(self) -> usize {
        match self {
            VolumeFormat::Float16 => 2,
            VolumeFormat::Float32 => 4,
        }
    }

    fn encode(self, value: f32, out: &mut Vec<u8>) {
        match self {
            VolumeFormat::Float16 => {
                let clamped = if value.is_finite() {
                    value.clamp(f16::MIN.to_f32(), f16::MAX.to_f32())
                } else {
                    value
                };
                out.extend_from_slice(&f16::from_f32(clamped).to_bits().to_le_bytes());
            }
            VolumeFormat::Float32 => out.extend_from_slice(&value.to_le_bytes()),
        }
    }

    fn decode(self, bytes: &[u8]) -> f32 {
        match self {
            VolumeFormat::Float16 => {
                f16::from_bits(u16::from_le_bytes([bytes[0], bytes[1]])).to_f32()
            }
            VolumeFormat::Float32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        }
    }
}

impl TryFrom<u32> for VolumeFormat {
    type Error = ConversionError;

    fn try_from(code: u32) -> Result<Self> {
        match code {
            VK_FORMAT_R16_SFLOAT => Ok(VolumeFormat::Float16),
            VK_FORMAT_R32_SFLOAT => Ok(VolumeFormat::Float32),
            format => Err(ConversionError::UnsupportedFormat {
                format,
                supported: SUPPORTED_VOLUME_FORMATS,
            }),
        }
    }
}

/// Dense scalar field indexed `[x][y][z]` with z varying fastest in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseVolume {
    extent: [usize; 3],
    values: Vec<f32>,
}

impl DenseVolume {
    /// Wraps values laid out with z varying fastest.
    pub fn new(extent: [usize; 3], values: Vec<f32>) -> Result<Self> {
        let expected = extent.iter().product::<usize>();
        if values.len() != expected {
            return Err(ConversionError::ValueCount {
                extent,
                expected,
                found: values.len(),
            });
        }
        Ok(Self { extent, values })
    }

    /// A volume filled with a constant.
    pub fn filled(extent: [usize; 3], value: f32) -> Self {
        Self {
            extent,
            values: vec![value; extent.iter().product()],
        }
    }

    pub fn extent(&self) -> [usize; 3] {
        self.extent
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    fn index(&self, x: usize, y: usize, z: usize) -> usize {
        (x * self.extent[1] + y) * self.extent[2] + z
    }

    pub fn get(&self, x: usize, y: usize, z: usize) -> f32 {
        self.values[self.index(x, y, z)]
    }

    pub fn set(&mut self, x: usize, y: usize, z: usize, value: f32) {
        let index = self.index(x, y, z);
        self.values[index] = value;
    }

    /// Multiplies every voxel by `factor`.
    pub fn scale(&mut self, factor: f32) {
        self.values.par_iter_mut().for_each(|v| *v *= factor);
    }

    /// Smallest and largest value, `None` for an empty volume.
    pub fn value_range(&self) -> Option<(f32, f32)> {
        self.values
            .par_iter()
            .map(|&v| (v, v))
            .reduce_with(|a, b| (a.0.min(b.0), a.1.max(b.1)))
    }

    /// Payload bytes in storage order: x fastest, then y, then z.
    fn encode_payload(&self, format: VolumeFormat) -> Vec<u8> {
        let [nx, ny, nz] = self.extent;
        let slices: Vec<Vec<u8>> = (0..nz)
            .into_par_iter()
            .map(|z| {
                let mut bytes = Vec::with_capacity(nx * ny * format.bytes_per_value());
                for y in 0..ny {
                    for x in 0..nx {
                        format.encode(self.get(x, y, z), &mut bytes);
                    }
                }
                bytes
            })
            .collect();
        slices.concat()
    }
}

/// Writes a volume container.
///
/// Fails with [`ConversionError::Shape`] unless `texel_to_world` has exactly
/// three rows and with [`ConversionError::UnsupportedFormat`] for format codes
/// other than 76 and 100. Both checks run before the file is created.
pub fn write_volume(
    path: &Path,
    volume: &DenseVolume,
    texel_to_world: &[[f32; 4]],
    format: u32,
) -> Result<()> {
    if texel_to_world.len() != 3 {
        return Err(ConversionError::Shape {
            rows: texel_to_world.len(),
        });
    }
    let format = VolumeFormat::try_from(format)?;

    let mut header = Vec::with_capacity(VOLUME_HEADER_SIZE);
    header.extend_from_slice(&VOLUME_FILE_MARKER.to_le_bytes());
    header.extend_from_slice(&VOLUME_FILE_VERSION.to_le_bytes());
    for &count in &volume.extent {
        header.extend_from_slice(&(count as u64).to_le_bytes());
    }
    header.extend_from_slice(&format.code().to_le_bytes());
    for row in texel_to_world {
        for &entry in row {
            header.extend_from_slice(&entry.to_le_bytes());
        }
    }

    if let Some((min, max)) = volume.value_range() {
        log::info!(
            "Writing {} ({}x{}x{}, values {} to {})",
            path.display(),
            volume.extent[0],
            volume.extent[1],
            volume.extent[2],
            min,
            max
        );
    }
    let payload = volume.encode_payload(format);

    let mut file = BufWriter::new(File::create(path).at(path)?);
    file.write_all(&header).at(path)?;
    file.write_all(&payload).at(path)?;
    file.flush().at(path)?;
    Ok(())
}

/// Volume read back from a container, values kept in storage order.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeFile {
    pub extent: [u64; 3],
    pub format: VolumeFormat,
    pub texel_to_world: TexelToWorld,
    /// Decoded values, x varying fastest.
    pub values: Vec<f32>,
}

impl VolumeFile {
    /// Value of the voxel at texel `(x, y, z)`.
    pub fn value_at(&self, x: u64, y: u64, z: u64) -> f32 {
        let [nx, ny, _] = self.extent;
        self.values[(x + nx * (y + ny * z)) as usize]
    }

    /// Converts back to the `[x][y][z]` indexing of [`DenseVolume`].
    pub fn to_dense(&self) -> DenseVolume {
        let extent = self.extent.map(|n| n as usize);
        let mut volume = DenseVolume::filled(extent, 0.0);
        for z in 0..extent[2] {
            for y in 0..extent[1] {
                for x in 0..extent[0] {
                    volume.set(x, y, z, self.value_at(x as u64, y as u64, z as u64));
                }
            }
        }
        volume
    }
}

/// Reads a volume container, validating marker, version, format and size.
pub fn read_volume(path: &Path) -> Result<VolumeFile> {
    let bytes = std::fs::read(path).at(path)?;
    if bytes.len() < VOLUME_HEADER_SIZE {
        return Err(ConversionError::invalid_container(path, "truncated header"));
    }
    let u64_at = |offset: usize| {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[offset..offset + 8]);
        u64::from_le_bytes(raw)
    };
    let u32_at = |offset: usize| {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&bytes[offset..offset + 4]);
        raw
    };

    if u64_at(0) != VOLUME_FILE_MARKER {
        return Err(ConversionError::invalid_container(
            path,
            "the file does not use the volume file format",
        ));
    }
    let version = u64_at(8);
    if version != VOLUME_FILE_VERSION {
        return Err(ConversionError::invalid_container(
            path,
            format!("unsupported file format version {version}"),
        ));
    }
    let extent = [u64_at(16), u64_at(24), u64_at(32)];
    let format = VolumeFormat::try_from(u32::from_le_bytes(u32_at(40)))?;
    let mut texel_to_world = [[0.0f32; 4]; 3];
    for (i, entry) in texel_to_world.iter_mut().flatten().enumerate() {
        *entry = f32::from_le_bytes(u32_at(44 + 4 * i));
    }

    let payload = &bytes[VOLUME_HEADER_SIZE..];
    let expected = extent
        .iter()
        .try_fold(1u64, |acc, &n| acc.checked_mul(n))
        .and_then(|count| usize::try_from(count).ok())
        .and_then(|count| count.checked_mul(format.bytes_per_value()))
        .ok_or_else(|| ConversionError::invalid_container(path, "extent overflows"))?;
    if payload.len() != expected {
        return Err(ConversionError::invalid_container(
            path,
            format!("payload has {} bytes, expected {}", payload.len(), expected),
        ));
    }
    let values = payload
        .chunks_exact(format.bytes_per_value())
        .map(|chunk| format.decode(chunk))
        .collect();

    Ok(VolumeFile {
        extent,
        format,
        texel_to_world,
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const IDENTITY: TexelToWorld = [
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
    ];

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("asset_conversion_volume_test_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn two_voxels_round_trip_as_float32() {
        let dir = temp_dir("two_voxels");
        let path = dir.join("two.blob");
        let volume = DenseVolume::new([2, 1, 1], vec![1.0, 2.0]).unwrap();

        write_volume(&path, &volume, &IDENTITY, 100).unwrap();
        let file = read_volume(&path).unwrap();

        assert_eq!(file.extent, [2, 1, 1]);
        assert_eq!(file.format, VolumeFormat::Float32);
        assert_eq!(file.texel_to_world, IDENTITY);
        assert_eq!(file.values, vec![1.0, 2.0]);
        assert_eq!(file.value_at(0, 0, 0), 1.0);
        assert_eq!(file.value_at(1, 0, 0), 2.0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn header_layout_is_byte_exact() {
        let dir = temp_dir("header");
        let path = dir.join("header.blob");
        let volume = DenseVolume::new([1, 2, 3], (0..6).map(|v| v as f32).collect()).unwrap();
        let transform = [
            [0.5, 0.0, 0.0, 10.0],
            [0.0, 0.5, 0.0, 20.0],
            [0.0, 0.0, 0.5, 30.0],
        ];

        write_volume(&path, &volume, &transform, 100).unwrap();
        let bytes = std::fs::read(&path).unwrap();

        assert_eq!(bytes.len(), VOLUME_HEADER_SIZE + 6 * 4);
        assert_eq!(&bytes[0..6], b"volume");
        assert_eq!(&bytes[6..8], &[0, 0]);
        assert_eq!(&bytes[8..16], &0u64.to_le_bytes());
        assert_eq!(&bytes[16..24], &1u64.to_le_bytes());
        assert_eq!(&bytes[24..32], &2u64.to_le_bytes());
        assert_eq!(&bytes[32..40], &3u64.to_le_bytes());
        assert_eq!(&bytes[40..44], &100u32.to_le_bytes());
        assert_eq!(&bytes[44..48], &0.5f32.to_le_bytes());
        assert_eq!(&bytes[56..60], &10.0f32.to_le_bytes());
        assert_eq!(&bytes[88..92], &30.0f32.to_le_bytes());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn storage_order_has_x_fastest() {
        let dir = temp_dir("order");
        let path = dir.join("order.blob");
        let extent = [2, 3, 4];
        let mut volume = DenseVolume::filled(extent, 0.0);
        for x in 0..2 {
            for y in 0..3 {
                for z in 0..4 {
                    volume.set(x, y, z, (100 * x + 10 * y + z) as f32);
                }
            }
        }

        write_volume(&path, &volume, &IDENTITY, 100).unwrap();
        let file = read_volume(&path).unwrap();

        // Second stored value steps along x, the third wraps to the next y.
        assert_eq!(file.values[0], 0.0);
        assert_eq!(file.values[1], 100.0);
        assert_eq!(file.values[2], 10.0);
        assert_eq!(file.values[6], 1.0);
        for x in 0..2u64 {
            for y in 0..3u64 {
                for z in 0..4u64 {
                    assert_eq!(file.value_at(x, y, z), (100 * x + 10 * y + z) as f32);
                }
            }
        }
        assert_eq!(file.to_dense(), volume);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn float16_stays_within_half_precision() {
        let dir = temp_dir("half");
        let path = dir.join("half.blob");
        let values: Vec<f32> = (0..27).map(|i| 0.1 + i as f32 * 0.37).collect();
        let volume = DenseVolume::new([3, 3, 3], values).unwrap();

        write_volume(&path, &volume, &IDENTITY, 76).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), VOLUME_HEADER_SIZE + 27 * 2);

        let file = read_volume(&path).unwrap();
        assert_eq!(file.format, VolumeFormat::Float16);
        let restored = file.to_dense();
        for (original, decoded) in volume.values().iter().zip(restored.values()) {
            assert!(((original - decoded) / original).abs() <= 1.0 / 1024.0);
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn float16_clamps_out_of_range_values() {
        let dir = temp_dir("half_clamp");
        let path = dir.join("clamp.blob");
        let volume = DenseVolume::new([2, 1, 1], vec![1.0e6, -1.0e6]).unwrap();

        write_volume(&path, &volume, &IDENTITY, 76).unwrap();
        let file = read_volume(&path).unwrap();
        assert_eq!(file.values, vec![65504.0, -65504.0]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn rejects_transforms_that_are_not_3x4() {
        let dir = temp_dir("shape");
        let path = dir.join("shape.blob");
        let volume = DenseVolume::filled([1, 1, 1], 1.0);

        let four_rows = [[0.0f32; 4]; 4];
        let err = write_volume(&path, &volume, &four_rows, 100).unwrap_err();
        assert!(matches!(err, ConversionError::Shape { rows: 4 }));

        let two_rows = [[0.0f32; 4]; 2];
        let err = write_volume(&path, &volume, &two_rows, 100).unwrap_err();
        assert!(matches!(err, ConversionError::Shape { rows: 2 }));
        assert!(!path.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn rejects_unsupported_formats() {
        let dir = temp_dir("format");
        let path = dir.join("format.blob");
        let volume = DenseVolume::filled([1, 1, 1], 1.0);

        for format in [0, 37, 75, 99, 101] {
            let err = write_volume(&path, &volume, &IDENTITY, format).unwrap_err();
            assert!(matches!(
                err,
                ConversionError::UnsupportedFormat { format: f, .. } if f == format
            ));
        }
        assert!(!path.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn value_count_must_match_extent() {
        let err = DenseVolume::new([2, 2, 2], vec![0.0; 7]).unwrap_err();
        assert!(matches!(
            err,
            ConversionError::ValueCount {
                expected: 8,
                found: 7,
                ..
            }
        ));
    }

    #[test]
    fn reader_rejects_foreign_files() {
        let dir = temp_dir("foreign");
        let path = dir.join("foreign.blob");
        std::fs::write(&path, vec![0u8; VOLUME_HEADER_SIZE]).unwrap();
        assert!(matches!(
            read_volume(&path),
            Err(ConversionError::InvalidContainer { .. })
        ));

        let short = dir.join("short.blob");
        std::fs::write(&short, b"volume").unwrap();
        assert!(matches!(
            read_volume(&short),
            Err(ConversionError::InvalidContainer { .. })
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn reader_rejects_truncated_payload() {
        let dir = temp_dir("truncated");
        let path = dir.join("truncated.blob");
        let volume = DenseVolume::filled([2, 2, 2], 3.0);
        write_volume(&path, &volume, &IDENTITY, 100).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        bytes.truncate(bytes.len() - 1);
        std::fs::write(&path, bytes).unwrap();
        assert!(matches!(
            read_volume(&path),
            Err(ConversionError::InvalidContainer { .. })
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn reader_rejects_overflowing_extent() {
        let dir = temp_dir("overflow");
        let path = dir.join("huge.blob");
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&VOLUME_FILE_MARKER.to_le_bytes());
        bytes.extend_from_slice(&VOLUME_FILE_VERSION.to_le_bytes());
        for n in [1u64 << 62, 1, 1] {
            bytes.extend_from_slice(&n.to_le_bytes());
        }
        bytes.extend_from_slice(&VK_FORMAT_R32_SFLOAT.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 48]);
        assert_eq!(bytes.len(), VOLUME_HEADER_SIZE);
        std::fs::write(&path, bytes).unwrap();

        match read_volume(&path) {
            Err(ConversionError::InvalidContainer { reason, .. }) => {
                assert_eq!(reason, "extent overflows")
            }
            other => panic!("expected an invalid container, got {other:?}"),
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn scale_and_range() {
        let mut volume = DenseVolume::new([1, 1, 3], vec![1.0, -2.0, 4.0]).unwrap();
        volume.scale(0.5);
        assert_eq!(volume.values(), &[0.5, -1.0, 2.0]);
        assert_eq!(volume.value_range(), Some((-1.0, 2.0)));
    }
}
