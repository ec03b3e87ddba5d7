/// Asset conversion command line entry point
use asset_conversion::ConversionConfig;
use asset_conversion::format_registry::generate_format_table;
use asset_conversion::light_list::export_lights;
use asset_conversion::materials::{MaterialMap, complete_materials, load_material_map};
use asset_conversion::scheduler::convert_textures;
use asset_conversion::volume::{
    DEFAULT_GRID_NAME, VolumeOptions, convert_volume_file, y_up_to_z_up,
};
use asset_conversion::volume_container::{VolumeFormat, read_volume};
use clap::{ArgAction, Parser, Subcommand};
use constants::lights::LIGHTS_FILE_NAME;
use constants::texture::DEFAULT_CONVERTER_PATH;
use constants::volume::VK_FORMAT_R16_SFLOAT;
use glam::Mat4;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "asset-conversion", about = "Converts authored assets into renderer containers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert all textures of a directory with the external texture converter
    ConvertTextures {
        /// Directory receiving the converted textures
        destination: PathBuf,
        /// Directory holding the source textures
        source: PathBuf,
        /// Leave out textures whose converted file already exists
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        skip_existing: bool,
        /// Path to the texture converter executable
        #[arg(long, default_value = DEFAULT_CONVERTER_PATH)]
        converter: PathBuf,
    },
    /// Create placeholder textures for every incomplete material of a directory
    CompleteMaterials {
        directory: PathBuf,
        /// JSON file mapping material names to their texture values
        #[arg(long)]
        materials: Option<PathBuf>,
    },
    /// Write a light list from exported light placements
    ExportLights {
        /// JSON array of placements
        placements: PathBuf,
        #[arg(default_value = LIGHTS_FILE_NAME)]
        output: PathBuf,
    },
    /// Generate the Vulkan format description table from vk.xml
    GenerateFormats {
        /// Rust source, or JSON if the extension is .json
        output: PathBuf,
        #[arg(long, default_value = "vk.xml")]
        registry: PathBuf,
    },
    /// Convert one grid of a volumetric source file into a volume container next to it
    ConvertVolume {
        /// JSON grid file
        file: PathBuf,
        #[arg(long, default_value = DEFAULT_GRID_NAME)]
        grid: String,
        /// Factor applied to every value
        #[arg(long, default_value_t = 1.0)]
        scale: f32,
        /// Vulkan format code of the values, 76 (f16) or 100 (f32)
        #[arg(long, default_value_t = VK_FORMAT_R16_SFLOAT)]
        format: u32,
        /// Rotate y-up source space into z-up world space
        #[arg(long)]
        z_up: bool,
    },
    /// Print the header of a volume container
    InspectVolume { path: PathBuf },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Cli::parse().command {
        Command::ConvertTextures {
            destination,
            source,
            skip_existing,
            converter,
        } => {
            let config = ConversionConfig::default()
                .with_skip_existing(skip_existing)
                .with_converter_path(converter);
            let report = convert_textures(&destination, &source, &config)?;
            // Failed conversions are reported but do not change the exit code.
            if !report.is_success() {
                log::warn!(
                    "{} of {} conversions failed",
                    report.failed(),
                    report.outcomes.len()
                );
            }
        }
        Command::CompleteMaterials {
            directory,
            materials,
        } => {
            let materials = match materials {
                Some(path) => load_material_map(&path)?,
                None => MaterialMap::new(),
            };
            let created = complete_materials(&directory, &materials)?;
            log::info!("Created {} placeholder textures", created.len());
        }
        Command::ExportLights { placements, output } => {
            export_lights(&placements, &output)?;
        }
        Command::GenerateFormats { output, registry } => {
            generate_format_table(&registry, &output)?;
        }
        Command::ConvertVolume {
            file,
            grid,
            scale,
            format,
            z_up,
        } => {
            let options = VolumeOptions {
                value_scale: scale,
                world_to_new_world: if z_up { y_up_to_z_up() } else { Mat4::IDENTITY },
                format: VolumeFormat::try_from(format)?,
            };
            let output = convert_volume_file(&file, &grid, &options)?;
            log::info!("Wrote {}", output.display());
        }
        Command::InspectVolume { path } => {
            let volume = read_volume(&path)?;
            println!("extent: {:?}", volume.extent);
            println!("format: {:?} ({})", volume.format, volume.format.code());
            for row in &volume.texel_to_world {
                println!("{:?}", row);
            }
            let dense = volume.to_dense();
            if let Some((min, max)) = dense.value_range() {
                println!("values: {} to {}", min, max);
            }
        }
    }

    Ok(())
}
