/// Volume file marker, the ASCII bytes of "volume" read as a little-endian u64
pub const VOLUME_FILE_MARKER: u64 = 0x656d756c6f76;

/// Current version of the volume file layout
pub const VOLUME_FILE_VERSION: u64 = 0;

/// File extension for converted volumes
pub const VOLUME_FILE_EXTENSION: &str = "blob";

/// VkFormat codes supported as voxel value encodings
pub const VK_FORMAT_R16_SFLOAT: u32 = 76;
pub const VK_FORMAT_R32_SFLOAT: u32 = 100;
pub const SUPPORTED_VOLUME_FORMATS: [u32; 2] = [VK_FORMAT_R16_SFLOAT, VK_FORMAT_R32_SFLOAT];

/// Header size in bytes: marker, version, extent[3], format, float[3][4]
pub const VOLUME_HEADER_SIZE: usize = 8 + 8 + 3 * 8 + 4 + 3 * 4 * 4;
