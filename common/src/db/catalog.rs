use crate::db::core::{ComponentKind, Design, Direction, PlacementStatus};
use crate::db::indices::CellId;
use crate::geom::dbu::UNITS_PER_LAMBDA;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Views {
    pub physical: bool,
    pub logical: bool,
}

impl Views {
    pub const PHYSICAL: Views = Views {
        physical: true,
        logical: false,
    };
    pub const ALL: Views = Views {
        physical: true,
        logical: true,
    };
}

/// Persistence of cell views.
pub trait Catalog {
    fn save_cell(&mut self, db: &Design, cell: CellId, views: Views) -> std::io::Result<()>;
}

/// Records saves without touching the filesystem.
#[derive(Default)]
pub struct MemoryCatalog {
    pub saved: Vec<(String, Views)>,
}

impl Catalog for MemoryCatalog {
    fn save_cell(&mut self, db: &Design, cell: CellId, views: Views) -> std::io::Result<()> {
        self.saved.push((db.cell(cell).name.clone(), views));
        Ok(())
    }
}

/// Writes `<cell>.def` for the physical view and `<cell>.v` for the logical one.
pub struct FileCatalog {
    pub dir: PathBuf,
}

impl FileCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn write_physical(&self, db: &Design, cell: CellId) -> std::io::Result<()> {
        let data = db.cell(cell);
        let path = self.dir.join(format!("{}.def", data.name));
        let mut file = BufWriter::new(File::create(path)?);

        writeln!(file, "VERSION 5.8 ;")?;
        writeln!(file, "DIVIDERCHAR \"/\" ;")?;
        writeln!(file, "BUSBITCHARS \"[]\" ;")?;
        writeln!(file, "DESIGN {} ;", data.name)?;
        writeln!(file, "UNITS DISTANCE MICRONS {} ;", UNITS_PER_LAMBDA)?;

        let ab = data.abutment_box;
        writeln!(
            file,
            "DIEAREA ( {} {} ) ( {} {} ) ;",
            ab.xmin(),
            ab.ymin(),
            ab.xmax(),
            ab.ymax()
        )?;

        writeln!(file, "COMPONENTS {} ;", data.instances.len())?;
        for &inst in &data.instances {
            let inst = db.instance(inst);
            let t = inst.transformation;
            let status = match inst.status {
                PlacementStatus::Fixed => "FIXED",
                PlacementStatus::Placed => "PLACED",
                PlacementStatus::Unplaced => "UNPLACED",
            };
            if inst.status == PlacementStatus::Unplaced {
                writeln!(
                    file,
                    "- {} {} + UNPLACED ;",
                    inst.name,
                    db.cell(inst.master).name
                )?;
            } else {
                writeln!(
                    file,
                    "- {} {} + {} ( {} {} ) {} ;",
                    inst.name,
                    db.cell(inst.master).name,
                    status,
                    t.tx,
                    t.ty,
                    t.orientation.def_name()
                )?;
            }
        }
        writeln!(file, "END COMPONENTS")?;

        writeln!(file, "NETS {} ;", data.nets.len())?;
        for &net_id in &data.nets {
            let net = db.net(net_id);
            write!(file, "- {} ", net.name)?;
            if net.is_external {
                write!(file, "( PIN {} ) ", net.name)?;
            }
            for plug in &net.plugs {
                write!(
                    file,
                    "( {} {} ) ",
                    db.instance(plug.instance).name,
                    db.net(plug.master_net).name
                )?;
            }
            writeln!(file)?;

            for &comp in &net.components {
                let component = db.component(comp);
                if !component.alive {
                    continue;
                }
                match &component.kind {
                    ComponentKind::Horizontal { source, target, y, layer } => {
                        let x1 = db.component_position(*source).x;
                        let x2 = db.component_position(*target).x;
                        writeln!(file, "  + ROUTED M{} ( {} {} ) ( {} {} )", layer + 1, x1, y, x2, y)?;
                    }
                    ComponentKind::Vertical { source, target, x, layer } => {
                        let y1 = db.component_position(*source).y;
                        let y2 = db.component_position(*target).y;
                        writeln!(file, "  + ROUTED M{} ( {} {} ) ( {} {} )", layer + 1, x, y1, x, y2)?;
                    }
                    ComponentKind::Contact { position, layer } => {
                        writeln!(
                            file,
                            "  + ROUTED M{} ( {} {} ) VIA_M{}_M{}",
                            layer + 1,
                            position.x,
                            position.y,
                            layer + 1,
                            layer + 2
                        )?;
                    }
                    ComponentKind::RoutingPad { .. } => {}
                }
            }
            writeln!(file, "  ;")?;
        }
        writeln!(file, "END NETS")?;
        writeln!(file, "END DESIGN")?;
        file.flush()
    }

    fn write_logical(&self, db: &Design, cell: CellId) -> std::io::Result<()> {
        let data = db.cell(cell);
        let path = self.dir.join(format!("{}.v", data.name));
        let mut file = BufWriter::new(File::create(path)?);

        let ports: Vec<_> = data
            .nets
            .iter()
            .map(|&n| db.net(n))
            .filter(|n| n.is_external)
            .collect();
        writeln!(
            file,
            "module {} ({});",
            data.name,
            ports
                .iter()
                .map(|n| n.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )?;
        for net in &ports {
            let dir = match net.direction {
                Direction::In => "input",
                Direction::Out => "output",
                _ => "inout",
            };
            writeln!(file, "  {} {};", dir, net.name)?;
        }
        for &net in &data.nets {
            let net = db.net(net);
            if !net.is_external {
                writeln!(file, "  wire {};", net.name)?;
            }
        }
        for &inst in &data.instances {
            let inst_data = db.instance(inst);
            let master = db.cell(inst_data.master);
            let mut connections: Vec<String> = master
                .nets
                .iter()
                .filter_map(|&m| {
                    let net = inst_data.connections.get(&m)?;
                    Some(format!(".{}({})", db.net(m).name, db.net(*net).name))
                })
                .collect();
            connections.sort();
            writeln!(
                file,
                "  {} {} ({});",
                master.name,
                inst_data.name,
                connections.join(", ")
            )?;
        }
        writeln!(file, "endmodule")?;
        file.flush()
    }
}

impl Catalog for FileCatalog {
    fn save_cell(&mut self, db: &Design, cell: CellId, views: Views) -> std::io::Result<()> {
        log::debug!("Saving cell \"{}\" ({:?})", db.cell(cell).name, views);
        if views.physical {
            self.write_physical(db, cell)?;
        }
        if views.logical {
            self.write_logical(db, cell)?;
        }
        Ok(())
    }
}
