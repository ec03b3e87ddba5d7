/// Texture kinds of a material and the file naming convention that identifies them.
use crate::error::{IoContext, Result};
use constants::texture::{
    BASE_COLOR_SUFFIX, DEFAULT_BASE_COLOR, DEFAULT_NORMAL, DEFAULT_SPECULAR, NORMAL_SUFFIX,
    SPECULAR_SUFFIX, TEXTURE_CONTAINER_EXTENSION, VK_FORMAT_BC1_RGB_SRGB_BLOCK,
    VK_FORMAT_BC1_RGB_UNORM_BLOCK, VK_FORMAT_BC5_UNORM_BLOCK,
};
use std::fs;
use std::path::Path;

/// One of the three textures every material consists of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TextureKind {
    BaseColor,
    Normal,
    Specular,
}

impl TextureKind {
    pub const ALL: [TextureKind; 3] = [
        TextureKind::BaseColor,
        TextureKind::Normal,
        TextureKind::Specular,
    ];

    /// File name suffix placed between material name and extension.
    pub fn suffix(self) -> &'static str {
        match self {
            TextureKind::BaseColor => BASE_COLOR_SUFFIX,
            TextureKind::Normal => NORMAL_SUFFIX,
            TextureKind::Specular => SPECULAR_SUFFIX,
        }
    }

    /// VkFormat code the converter compresses this kind to.
    pub fn format_code(self) -> u32 {
        match self {
            TextureKind::BaseColor => VK_FORMAT_BC1_RGB_SRGB_BLOCK,
            TextureKind::Normal => VK_FORMAT_BC5_UNORM_BLOCK,
            TextureKind::Specular => VK_FORMAT_BC1_RGB_UNORM_BLOCK,
        }
    }

    /// Global default texel when a material does not specify this kind.
    pub fn default_texel(self) -> [u8; 3] {
        match self {
            TextureKind::BaseColor => DEFAULT_BASE_COLOR,
            TextureKind::Normal => DEFAULT_NORMAL,
            TextureKind::Specular => DEFAULT_SPECULAR,
        }
    }

    /// Texture file stem for a material, e.g. `wood_Normal`.
    pub fn texture_stem(self, material: &str) -> String {
        format!("{}{}", material, self.suffix())
    }
}

/// A source texture file recognised by its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureFileName<'a> {
    /// Material name, everything in front of the suffix.
    pub material: &'a str,
    pub kind: TextureKind,
}

/// Classifies a file name by the leftmost `<suffix>.` it contains.
///
/// Files already in the container format are not source textures and yield
/// `None`, as do names without any recognised suffix.
pub fn classify_file_name(file_name: &str) -> Option<TextureFileName<'_>> {
    if is_container_file(file_name) {
        return None;
    }
    TextureKind::ALL
        .iter()
        .filter_map(|&kind| {
            let needle = format!("{}.", kind.suffix());
            file_name.find(&needle).map(|start| (start, kind))
        })
        .min_by_key(|&(start, _)| start)
        .map(|(start, kind)| TextureFileName {
            material: &file_name[..start],
            kind,
        })
}

/// Whether the file carries the texture container extension.
pub fn is_container_file(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .is_some_and(|ext| ext == TEXTURE_CONTAINER_EXTENSION)
}

/// File name with its last extension removed.
pub fn strip_extension(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(dot) if dot > 0 => &file_name[..dot],
        _ => file_name,
    }
}

/// Names of the regular files in `directory`, sorted.
pub fn list_file_names(directory: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(directory).at(directory)? {
        let entry = entry.at(directory)?;
        if !entry.file_type().at(directory)?.is_file() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(name) => log::warn!("Ignoring non UTF-8 file name {:?}", name),
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_suffix() {
        let name = classify_file_name("wood_BaseColor.png").unwrap();
        assert_eq!(name.material, "wood");
        assert_eq!(name.kind, TextureKind::BaseColor);

        let name = classify_file_name("brick_wall_Normal.jpg").unwrap();
        assert_eq!(name.material, "brick_wall");
        assert_eq!(name.kind, TextureKind::Normal);

        let name = classify_file_name("metal_Specular.tga").unwrap();
        assert_eq!(name.kind, TextureKind::Specular);
    }

    #[test]
    fn suffix_needs_a_following_dot() {
        assert!(classify_file_name("wood_BaseColorX.png").is_none());
        assert!(classify_file_name("wood_Normal").is_none());
        assert!(classify_file_name("readme.txt").is_none());
    }

    #[test]
    fn leftmost_suffix_wins() {
        let name = classify_file_name("a_Normal.b_Specular.png").unwrap();
        assert_eq!(name.material, "a");
        assert_eq!(name.kind, TextureKind::Normal);
    }

    #[test]
    fn container_files_are_not_sources() {
        assert!(is_container_file("wood_BaseColor.vkt"));
        assert!(classify_file_name("wood_BaseColor.vkt").is_none());
        assert!(!is_container_file("wood_BaseColor.png"));
    }

    #[test]
    fn format_codes_follow_kind() {
        assert_eq!(TextureKind::BaseColor.format_code(), 132);
        assert_eq!(TextureKind::Normal.format_code(), 141);
        assert_eq!(TextureKind::Specular.format_code(), 131);
    }

    #[test]
    fn strips_last_extension_only() {
        assert_eq!(strip_extension("wood_Normal.png"), "wood_Normal");
        assert_eq!(strip_extension("a.b.c"), "a.b");
        assert_eq!(strip_extension("noext"), "noext");
        assert_eq!(strip_extension(".hidden"), ".hidden");
    }

    #[test]
    fn lists_regular_files_sorted() {
        let dir = std::env::temp_dir().join("asset_conversion_texture_set_test_list");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(dir.join("nested_Normal.png")).unwrap();
        std::fs::write(dir.join("b_Normal.png"), b"").unwrap();
        std::fs::write(dir.join("a_BaseColor.png"), b"").unwrap();

        assert_eq!(
            list_file_names(&dir).unwrap(),
            vec!["a_BaseColor.png", "b_Normal.png"]
        );

        let _ = std::fs::remove_dir_all(&dir);
        assert!(list_file_names(&dir).is_err());
    }
}
