use crate::db::core::{Design, Direction, NetType, PlacementStatus};
use crate::geom::dbu::from_lambda;
use crate::geom::rect::Rect;
use crate::geom::transform::{Orientation, Transformation};
use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
struct DesignFile {
    #[serde(default)]
    library: Vec<LibraryCellDef>,
    #[serde(default)]
    cells: Vec<CellDef>,
}

#[derive(Debug, Deserialize)]
struct LibraryCellDef {
    name: String,
    width: f64,
    height: f64,
    #[serde(default)]
    pins: Vec<PinDef>,
}

#[derive(Debug, Deserialize)]
struct PinDef {
    name: String,
    #[serde(default)]
    direction: Direction,
    #[serde(default)]
    kind: NetType,
    #[serde(default)]
    global: bool,
    /// `[xmin, ymin, xmax, ymax]` in lambda, master coordinates.
    #[serde(default)]
    rect: Option<[f64; 4]>,
}

#[derive(Debug, Deserialize)]
struct CellDef {
    name: String,
    abutment_box: [f64; 4],
    #[serde(default)]
    nets: Vec<NetDef>,
    #[serde(default)]
    instances: Vec<InstanceDef>,
}

#[derive(Debug, Deserialize)]
struct NetDef {
    name: String,
    #[serde(default)]
    kind: NetType,
    #[serde(default)]
    external: bool,
    #[serde(default)]
    global: bool,
    #[serde(default)]
    direction: Direction,
}

#[derive(Debug, Deserialize)]
struct InstanceDef {
    name: String,
    master: String,
    #[serde(default)]
    position: Option<[f64; 2]>,
    #[serde(default)]
    orientation: Orientation,
    #[serde(default)]
    status: Option<PlacementStatus>,
    /// Master net name to local net name.
    #[serde(default)]
    connections: BTreeMap<String, String>,
}

fn to_rect(r: &[f64; 4]) -> Rect {
    Rect::from_coords(
        from_lambda(r[0]),
        from_lambda(r[1]),
        from_lambda(r[2]),
        from_lambda(r[3]),
    )
}

pub fn parse(db: &mut Design, path: &str) -> Result<()> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
    parse_str(db, &text)
}

pub fn parse_str(db: &mut Design, text: &str) -> Result<()> {
    let file: DesignFile = toml::from_str(text)?;

    for lib in &file.library {
        let ab = Rect::from_coords(0, 0, from_lambda(lib.width), from_lambda(lib.height));
        let cell = db.add_cell(&lib.name, ab, true)?;
        for pin in &lib.pins {
            let net = db.create_net(cell, &pin.name)?;
            let data = db.net_mut(net);
            data.is_external = true;
            data.is_global = pin.global;
            data.direction = pin.direction;
            data.net_type = pin.kind;
            if let Some(r) = &pin.rect {
                data.pins.push(to_rect(r));
            }
        }
    }

    for cell in &file.cells {
        db.add_cell(&cell.name, to_rect(&cell.abutment_box), false)?;
    }

    for cell_def in &file.cells {
        let cell = db
            .cell_by_name(&cell_def.name)
            .ok_or_else(|| anyhow!("cell {} vanished", cell_def.name))?;
        for net_def in &cell_def.nets {
            let net = db.create_net(cell, &net_def.name)?;
            let data = db.net_mut(net);
            data.net_type = net_def.kind;
            data.is_external = net_def.external;
            data.is_global = net_def.global;
            data.direction = net_def.direction;
        }
    }

    for cell_def in &file.cells {
        let cell = db
            .cell_by_name(&cell_def.name)
            .ok_or_else(|| anyhow!("cell {} vanished", cell_def.name))?;
        for inst_def in &cell_def.instances {
            let master = db
                .cell_by_name(&inst_def.master)
                .ok_or_else(|| anyhow!("instance {}: unknown master {}", inst_def.name, inst_def.master))?;
            let inst = db.create_instance(cell, &inst_def.name, master)?;
            if let Some([x, y]) = inst_def.position {
                db.set_transformation(
                    inst,
                    Transformation::new(from_lambda(x), from_lambda(y), inst_def.orientation),
                );
                db.set_placement_status(inst, inst_def.status.unwrap_or(PlacementStatus::Placed));
            } else if let Some(status) = inst_def.status {
                db.set_placement_status(inst, status);
            }
            for (master_net, local_net) in &inst_def.connections {
                let plug = db.plug_by_name(inst, master_net).ok_or_else(|| {
                    anyhow!(
                        "instance {}: master {} has no external net {}",
                        inst_def.name,
                        inst_def.master,
                        master_net
                    )
                })?;
                let net = db.net_by_name(cell, local_net).ok_or_else(|| {
                    anyhow!("cell {}: unknown net {}", cell_def.name, local_net)
                })?;
                db.set_plug_net(plug, Some(net))?;
            }
        }
    }

    log::info!(
        "Loaded {} cells ({} library), {} instances, {} nets.",
        db.num_cells(),
        file.library.len(),
        db.instances.len(),
        db.nets.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL: &str = r#"
[[library]]
name = "sff1_x4"
width = 30.0
height = 50.0
pins = [
  { name = "ck", direction = "in", kind = "clock", rect = [5.0, 20.0, 7.0, 30.0] },
  { name = "q", direction = "out", rect = [25.0, 20.0, 27.0, 30.0] },
  { name = "vdd", direction = "in", kind = "power", global = true },
]

[[cells]]
name = "top"
abutment_box = [0.0, 0.0, 500.0, 500.0]
nets = [{ name = "ck", kind = "clock", external = true, direction = "in" }]
instances = [
  { name = "r0", master = "sff1_x4", position = [100.0, 50.0], orientation = "FS", connections = { ck = "ck" } },
]
"#;

    #[test]
    fn parses_library_and_hierarchy() {
        let mut db = Design::new();
        parse_str(&mut db, SMALL).unwrap();
        let top = db.cell_by_name("top").unwrap();
        let ck = db.net_by_name(top, "ck").unwrap();
        assert_eq!(db.net(ck).net_type, NetType::Clock);
        let r0 = db.instance_by_name(top, "r0").unwrap();
        let data = db.instance(r0);
        assert_eq!(data.transformation.tx, 10_000);
        assert_eq!(data.transformation.orientation, Orientation::My);
        assert_eq!(data.status, PlacementStatus::Placed);
        assert_eq!(db.net(ck).plugs.len(), 1);
        let lib = db.cell_by_name("sff1_x4").unwrap();
        assert!(db.cell(lib).is_terminal);
        let vdd = db.net_by_name(lib, "vdd").unwrap();
        assert!(db.net(vdd).is_global);
    }

    #[test]
    fn unknown_master_is_reported() {
        let mut db = Design::new();
        let text = r#"
[[cells]]
name = "top"
abutment_box = [0.0, 0.0, 10.0, 10.0]
instances = [{ name = "x", master = "nope" }]
"#;
        let err = parse_str(&mut db, text).unwrap_err();
        assert!(err.to_string().contains("unknown master nope"));
    }
}
