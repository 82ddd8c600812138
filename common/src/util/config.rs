use crate::db::core::LayerDirection;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub clock_tree: ClockTreeConfig,
    #[serde(default)]
    pub cell_gauge: CellGaugeConfig,
    #[serde(default)]
    pub routing_gauge: RoutingGaugeConfig,
    #[serde(default)]
    pub input: InputConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            clock_tree: ClockTreeConfig::default(),
            cell_gauge: CellGaugeConfig::default(),
            routing_gauge: RoutingGaugeConfig::default(),
            input: InputConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClockTreeConfig {
    /// Lambda. Quadrants are split while both half sides reach this value.
    #[serde(default = "default_minimum_side")]
    pub minimum_side: f64,
    #[serde(default = "default_buffer")]
    pub buffer: String,
    #[serde(default = "default_tie_cell")]
    pub tie_cell: String,
    #[serde(default = "default_route_trunks")]
    pub route_trunks: bool,
    /// `[xmin, ymin, xmax, ymax]` in lambda; the top cell abutment box when absent.
    #[serde(default)]
    pub area: Option<[f64; 4]>,
    #[serde(default)]
    pub clock_net: Option<String>,
}

impl Default for ClockTreeConfig {
    fn default() -> Self {
        Self {
            minimum_side: default_minimum_side(),
            buffer: default_buffer(),
            tie_cell: default_tie_cell(),
            route_trunks: default_route_trunks(),
            area: None,
            clock_net: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CellGaugeConfig {
    #[serde(default = "default_slice_step")]
    pub slice_step: f64,
    #[serde(default = "default_slice_height")]
    pub slice_height: f64,
}

impl Default for CellGaugeConfig {
    fn default() -> Self {
        Self {
            slice_step: default_slice_step(),
            slice_height: default_slice_height(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LayerConfig {
    pub name: String,
    pub direction: LayerDirection,
    pub pitch: f64,
    #[serde(default)]
    pub offset: f64,
    #[serde(default = "default_wire_width")]
    pub width: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RoutingGaugeConfig {
    #[serde(default = "default_layers")]
    pub layers: Vec<LayerConfig>,
    #[serde(default = "default_horizontal_depth")]
    pub horizontal_depth: u8,
    #[serde(default = "default_vertical_depth")]
    pub vertical_depth: u8,
    #[serde(default = "default_horizontal_deep_depth")]
    pub horizontal_deep_depth: u8,
    #[serde(default = "default_vertical_deep_depth")]
    pub vertical_deep_depth: u8,
}

impl Default for RoutingGaugeConfig {
    fn default() -> Self {
        Self {
            layers: default_layers(),
            horizontal_depth: default_horizontal_depth(),
            vertical_depth: default_vertical_depth(),
            horizontal_deep_depth: default_horizontal_deep_depth(),
            vertical_deep_depth: default_vertical_deep_depth(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct InputConfig {
    #[serde(default = "default_design_file")]
    pub design_file: String,
    #[serde(default)]
    pub top_cell: Option<String>,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            design_file: default_design_file(),
            top_cell: None,
            output_dir: default_output_dir(),
        }
    }
}

fn default_minimum_side() -> f64 {
    300.0
}

fn default_buffer() -> String {
    "buf_x2".to_string()
}

fn default_tie_cell() -> String {
    "rowend_x0".to_string()
}

fn default_route_trunks() -> bool {
    true
}

fn default_slice_step() -> f64 {
    5.0
}

fn default_slice_height() -> f64 {
    50.0
}

fn default_wire_width() -> f64 {
    2.0
}

fn layer(name: &str, direction: LayerDirection, pitch: f64) -> LayerConfig {
    LayerConfig {
        name: name.to_string(),
        direction,
        pitch,
        offset: 0.0,
        width: default_wire_width(),
    }
}

fn default_layers() -> Vec<LayerConfig> {
    vec![
        layer("METAL1", LayerDirection::Vertical, 5.0),
        layer("METAL2", LayerDirection::Horizontal, 5.0),
        layer("METAL3", LayerDirection::Vertical, 5.0),
        layer("METAL4", LayerDirection::Horizontal, 5.0),
        layer("METAL5", LayerDirection::Vertical, 10.0),
        layer("METAL6", LayerDirection::Horizontal, 10.0),
    ]
}

fn default_horizontal_depth() -> u8 {
    1
}

fn default_vertical_depth() -> u8 {
    2
}

fn default_horizontal_deep_depth() -> u8 {
    3
}

fn default_vertical_deep_depth() -> u8 {
    4
}

fn default_design_file() -> String {
    "inputs/design.toml".to_string()
}

fn default_output_dir() -> String {
    "output".to_string()
}
