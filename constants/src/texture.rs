/// File extension of the renderer's block compressed texture container
pub const TEXTURE_CONTAINER_EXTENSION: &str = "vkt";

/// File name suffixes identifying the three textures of a material
pub const BASE_COLOR_SUFFIX: &str = "_BaseColor";
pub const NORMAL_SUFFIX: &str = "_Normal";
pub const SPECULAR_SUFFIX: &str = "_Specular";

/// VkFormat codes handed to the texture converter
/// BC1 for linear data, BC1 sRGB for display encoded colours, BC5 for normals
pub const VK_FORMAT_BC1_RGB_UNORM_BLOCK: u32 = 131;
pub const VK_FORMAT_BC1_RGB_SRGB_BLOCK: u32 = 132;
pub const VK_FORMAT_BC5_UNORM_BLOCK: u32 = 141;

/// Edge length of generated placeholder textures (pixels)
/// Block compression needs at least one full 4x4 block.
pub const PLACEHOLDER_TEXTURE_SIZE: u32 = 4;

/// Global material defaults as 8-bit RGB
/// Black base colour, normal along +Z, dielectric with medium roughness
pub const DEFAULT_BASE_COLOR: [u8; 3] = [0, 0, 0];
pub const DEFAULT_NORMAL: [u8; 3] = [128, 128, 255];
pub const DEFAULT_SPECULAR: [u8; 3] = [255, 128, 0];

/// Default location of the texture converter binary
pub const DEFAULT_CONVERTER_PATH: &str = "texture_conversion/build/texture_conversion";
