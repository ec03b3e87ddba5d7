/// Default output file of the light exporter
pub const LIGHTS_FILE_NAME: &str = "scene.lights";

/// Bytes per light record: float[3] position and float radius
pub const LIGHT_RECORD_SIZE: usize = 4 * 4;

/// Name of the unit sphere mesh whose instances mark spherical lights
pub const SPHERICAL_LIGHT_MESH: &str = "spherical_light";
