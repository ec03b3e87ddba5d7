/// Generates a Vulkan format description table from the XML API registry.
///
/// The output is either a Rust module with a `format_description` lookup or a
/// JSON table, chosen by the extension of the output path.
use crate::error::{ConversionError, IoContext, Result};
use roxmltree::{Document, Node};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

/// Base of the numeric values assigned to extension enums.
const EXTENSION_ENUM_BASE: i64 = 1_000_000_000;
/// Number of values reserved per extension.
const EXTENSION_ENUM_RANGE: i64 = 1_000;

/// One `<format>` element of the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatEntry {
    pub name: String,
    /// Numeric `VkFormat` value, `None` when the registry does not define it.
    pub value: Option<u32>,
    /// Compatibility class. Copying between formats of the same class is permitted.
    pub class: String,
    /// Bytes per texel block.
    pub block_size: u64,
    pub texels_per_block: u32,
    /// Bits a colour is packed into, for packed formats only.
    pub packed_bits: Option<u32>,
}

/// Formats with a resolved value, deduplicated by value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatTable {
    /// Compatibility classes in order of first appearance.
    pub classes: Vec<String>,
    pub formats: Vec<FormatEntry>,
}

fn attribute<'a>(node: Node<'a, '_>, name: &str) -> Result<&'a str> {
    node.attribute(name).ok_or_else(|| {
        ConversionError::Registry(format!(
            "<{}> element {} lacks attribute '{}'",
            node.tag_name().name(),
            node.attribute("name").unwrap_or("<unnamed>"),
            name
        ))
    })
}

fn parse_number<T: TryFrom<i64>>(text: &str, what: &str) -> Result<T> {
    let text = text.trim();
    let (digits, negative) = match text.strip_prefix('-') {
        Some(rest) => (rest, true),
        None => (text, false),
    };
    let parsed = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => digits.parse::<i64>(),
    };
    parsed
        .ok()
        .map(|value| if negative { -value } else { value })
        .and_then(|value| T::try_from(value).ok())
        .ok_or_else(|| ConversionError::Registry(format!("invalid {} '{}'", what, text)))
}

/// Numeric value of an `<enum>` that extends `VkFormat` through an offset.
fn extension_enum_value(node: Node) -> Result<i64> {
    let offset: i64 = parse_number(attribute(node, "offset")?, "offset")?;
    let extnumber = match node.attribute("extnumber") {
        Some(number) => number,
        None => node
            .ancestors()
            .find(|ancestor| ancestor.has_tag_name("extension"))
            .and_then(|extension| extension.attribute("number"))
            .ok_or_else(|| {
                ConversionError::Registry(format!(
                    "enum {} has an offset but no extension number",
                    node.attribute("name").unwrap_or("<unnamed>")
                ))
            })?,
    };
    let extnumber: i64 = parse_number(extnumber, "extension number")?;
    let value = EXTENSION_ENUM_BASE + (extnumber - 1) * EXTENSION_ENUM_RANGE + offset;
    Ok(if node.attribute("dir") == Some("-") {
        -value
    } else {
        value
    })
}

/// Maps every `VkFormat` enumerant name, aliases included, to its value.
fn format_values(doc: &Document) -> Result<HashMap<String, i64>> {
    let mut values = HashMap::new();
    let mut aliases = Vec::new();

    for node in doc.descendants().filter(|n| n.has_tag_name("enum")) {
        let in_format_enums = node.parent().is_some_and(|parent| {
            parent.has_tag_name("enums") && parent.attribute("name") == Some("VkFormat")
        });
        if !in_format_enums && node.attribute("extends") != Some("VkFormat") {
            continue;
        }
        let name = attribute(node, "name")?;
        if let Some(alias) = node.attribute("alias") {
            aliases.push((name, alias));
        } else if let Some(value) = node.attribute("value") {
            values.insert(name.to_string(), parse_number(value, "enum value")?);
        } else if node.attribute("offset").is_some() {
            values.insert(name.to_string(), extension_enum_value(node)?);
        }
    }

    // Aliases may point at other aliases.
    let mut unresolved = aliases;
    loop {
        let before = unresolved.len();
        unresolved.retain(|(name, alias)| match values.get(*alias).copied() {
            Some(value) => {
                values.insert(name.to_string(), value);
                false
            }
            None => true,
        });
        if unresolved.is_empty() || unresolved.len() == before {
            break;
        }
    }
    for (name, alias) in unresolved {
        log::warn!("Alias {} refers to unknown format {}", name, alias);
    }
    Ok(values)
}

/// Parses all `<format>` elements of a registry document.
pub fn parse_registry(xml: &str) -> Result<Vec<FormatEntry>> {
    let doc = Document::parse(xml)?;
    let values = format_values(&doc)?;

    doc.descendants()
        .filter(|n| n.has_tag_name("format"))
        .map(|node| {
            let name = attribute(node, "name")?;
            Ok(FormatEntry {
                name: name.to_string(),
                value: values.get(name).and_then(|&v| u32::try_from(v).ok()),
                class: attribute(node, "class")?.to_string(),
                block_size: parse_number(attribute(node, "blockSize")?, "blockSize")?,
                texels_per_block: parse_number(
                    attribute(node, "texelsPerBlock")?,
                    "texelsPerBlock",
                )?,
                packed_bits: node
                    .attribute("packed")
                    .map(|bits| parse_number(bits, "packed"))
                    .transpose()?,
            })
        })
        .collect()
}

/// Name of the `FormatClass` variant for a class attribute.
///
/// `"8-bit"` becomes `Class8Bit`, `"BC1_RGB"` becomes `Bc1Rgb`.
pub fn class_variant_name(class: &str) -> String {
    let name: String = class
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
                }
                None => String::new(),
            }
        })
        .collect();
    if name.chars().next().is_none_or(|c| c.is_ascii_digit()) {
        format!("Class{}", name)
    } else {
        name
    }
}

impl FormatTable {
    /// Keeps formats with a value, the first one per value.
    pub fn from_entries(entries: Vec<FormatEntry>) -> Self {
        let mut classes: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        let mut formats = Vec::new();

        for entry in entries {
            let Some(value) = entry.value else {
                log::warn!("Skipping {}, the registry assigns it no value", entry.name);
                continue;
            };
            if !seen.insert(value) {
                log::debug!("Skipping {}, value {} is already described", entry.name, value);
                continue;
            }
            if !classes.contains(&entry.class) {
                classes.push(entry.class.clone());
            }
            formats.push(entry);
        }
        Self { classes, formats }
    }

    /// Source of a Rust module describing every format in the table.
    pub fn generate_rust(&self) -> String {
        let mut variants: Vec<String> = Vec::new();
        for class in &self.classes {
            let variant = class_variant_name(class);
            if !variants.contains(&variant) {
                variants.push(variant);
            }
        }

        let mut out = String::new();
        out.push_str("// Generated from the Vulkan API registry by ");
        out.push_str("`asset-conversion generate-formats`.\n\n");
        out.push_str("/// Format compatibility classes.\n");
        out.push_str("/// Copying between two formats of the same class is permitted.\n");
        out.push_str("#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]\n");
        out.push_str("pub enum FormatClass {\n");
        for variant in &variants {
            out.push_str(&format!("    {},\n", variant));
        }
        out.push_str("}\n\n");

        out.push_str("/// Meta data about a Vulkan format.\n");
        out.push_str("/// Used e.g. for copies between buffers and images.\n");
        out.push_str("#[derive(Debug, Clone, Copy, PartialEq, Eq)]\n");
        out.push_str("pub struct FormatDescription {\n");
        out.push_str("    pub class: FormatClass,\n");
        out.push_str("    /// Bytes per texel block\n");
        out.push_str("    pub block_size: u64,\n");
        out.push_str("    /// Texels per texel block\n");
        out.push_str("    pub texels_per_block: u32,\n");
        out.push_str("    /// Bits a colour is packed into for packed formats, 0 otherwise\n");
        out.push_str("    pub packed_bits: u32,\n");
        out.push_str("}\n\n");

        out.push_str("/// Meta data about the given `VkFormat` value, `None` if unknown.\n");
        out.push_str("pub fn format_description(format: u32) -> Option<FormatDescription> {\n");
        out.push_str("    let (class, block_size, texels_per_block, packed_bits) =\n");
        out.push_str("        match format {\n");
        for format in &self.formats {
            let Some(value) = format.value else { continue };
            out.push_str(&format!("        // {}\n", format.name));
            out.push_str(&format!(
                "        {} => (FormatClass::{}, {}, {}, {}),\n",
                value,
                class_variant_name(&format.class),
                format.block_size,
                format.texels_per_block,
                format.packed_bits.unwrap_or(0)
            ));
        }
        out.push_str("        _ => return None,\n");
        out.push_str("    };\n");
        out.push_str("    Some(FormatDescription {\n");
        out.push_str("        class,\n");
        out.push_str("        block_size,\n");
        out.push_str("        texels_per_block,\n");
        out.push_str("        packed_bits,\n");
        out.push_str("    })\n");
        out.push_str("}\n");
        out
    }
}

/// Reads `vk_xml` and writes the format table to `output`.
///
/// Writes JSON when `output` ends in `.json`, Rust source otherwise.
/// Returns the number of formats in the table.
pub fn generate_format_table(vk_xml: &Path, output: &Path) -> Result<usize> {
    let xml = fs::read_to_string(vk_xml).at(vk_xml)?;
    let table = FormatTable::from_entries(parse_registry(&xml)?);

    let contents = if output.extension().is_some_and(|ext| ext == "json") {
        serde_json::to_string_pretty(&table)?
    } else {
        table.generate_rust()
    };
    fs::write(output, contents).at(output)?;

    log::info!(
        "Described {} formats in {} classes in {}",
        table.formats.len(),
        table.classes.len(),
        output.display()
    );
    Ok(table.formats.len())
}
