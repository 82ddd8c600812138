use crate::db::indices::*;
use crate::db::occurrence::{Occurrence, Path};
use crate::geom::dbu::DbU;
use crate::geom::point::Point;
use crate::geom::rect::Rect;
use crate::geom::transform::Transformation;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DbError {
    #[error("cell \"{0}\" already exists")]
    DuplicateCell(String),
    #[error("net \"{net}\" already exists in cell \"{cell}\"")]
    DuplicateNet { cell: String, net: String },
    #[error("instance \"{instance}\" already exists in cell \"{cell}\"")]
    DuplicateInstance { cell: String, instance: String },
    #[error("unknown cell \"{0}\"")]
    UnknownCell(String),
    #[error("instance \"{instance}\" has no plug \"{plug}\"")]
    UnknownPlug { instance: String, plug: String },
    #[error("plug \"{plug}\" of instance \"{instance}\" is not connected")]
    UnconnectedPlug { instance: String, plug: String },
    #[error("net \"{net}\" does not belong to cell \"{cell}\"")]
    ForeignNet { cell: String, net: String },
    #[error("{0} has been destroyed")]
    Destroyed(String),
    #[error("component {0:?} is not a contact")]
    NotAContact(CompId),
    #[error("an update session is already open")]
    SessionAlreadyOpen,
}

pub type DbResult<T> = Result<T, DbError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerDirection {
    Vertical,
    Horizontal,
    Unknown,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetType {
    #[default]
    Logical,
    Clock,
    Power,
    Ground,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Undefined,
    In,
    Out,
    InOut,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlacementStatus {
    #[default]
    Unplaced,
    Placed,
    Fixed,
}

/// The connection point of an external net of `instance`'s master cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Plug {
    pub instance: InstId,
    pub master_net: NetId,
}

#[derive(Clone, Debug)]
pub struct CellData {
    pub name: String,
    pub abutment_box: Rect,
    pub is_terminal: bool,
    pub nets: Vec<NetId>,
    pub instances: Vec<InstId>,
    pub net_name_map: HashMap<String, NetId>,
    pub instance_name_map: HashMap<String, InstId>,
}

#[derive(Clone, Debug)]
pub struct NetData {
    pub name: String,
    pub cell: CellId,
    pub net_type: NetType,
    pub direction: Direction,
    pub is_external: bool,
    pub is_global: bool,
    /// Terminal geometry in master coordinates.
    pub pins: Vec<Rect>,
    pub plugs: Vec<Plug>,
    pub components: Vec<CompId>,
}

#[derive(Clone, Debug)]
pub struct InstanceData {
    pub name: String,
    pub owner: CellId,
    pub master: CellId,
    pub transformation: Transformation,
    pub status: PlacementStatus,
    /// Master net to owner net.
    pub connections: HashMap<NetId, NetId>,
    pub alive: bool,
}

#[derive(Clone, Debug)]
pub enum ComponentKind {
    RoutingPad {
        occurrence: Occurrence,
        bbox: Rect,
    },
    Contact {
        position: Point<DbU>,
        layer: u8,
    },
    Horizontal {
        source: CompId,
        target: CompId,
        y: DbU,
        layer: u8,
    },
    Vertical {
        source: CompId,
        target: CompId,
        x: DbU,
        layer: u8,
    },
}

#[derive(Clone, Debug)]
pub struct ComponentData {
    pub net: NetId,
    pub kind: ComponentKind,
    pub alive: bool,
}

#[derive(Clone, Default)]
pub struct Design {
    pub cells: Vec<CellData>,
    pub nets: Vec<NetData>,
    pub instances: Vec<InstanceData>,
    pub components: Vec<ComponentData>,
    pub cell_name_map: HashMap<String, CellId>,
    pub(crate) session_open: bool,
}

impl Design {
    pub fn new() -> Self {
        Self {
            cells: Vec::with_capacity(64),
            nets: Vec::with_capacity(1000),
            instances: Vec::with_capacity(1000),
            components: Vec::with_capacity(5000),
            cell_name_map: HashMap::new(),
            session_open: false,
        }
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn cell(&self, id: CellId) -> &CellData {
        &self.cells[id.index()]
    }
    #[inline]
    pub fn net(&self, id: NetId) -> &NetData {
        &self.nets[id.index()]
    }
    #[inline]
    pub fn net_mut(&mut self, id: NetId) -> &mut NetData {
        &mut self.nets[id.index()]
    }
    #[inline]
    pub fn instance(&self, id: InstId) -> &InstanceData {
        &self.instances[id.index()]
    }
    #[inline]
    pub fn component(&self, id: CompId) -> &ComponentData {
        &self.components[id.index()]
    }

    pub fn cell_by_name(&self, name: &str) -> Option<CellId> {
        self.cell_name_map.get(name).copied()
    }

    pub fn net_by_name(&self, cell: CellId, name: &str) -> Option<NetId> {
        self.cell(cell).net_name_map.get(name).copied()
    }

    pub fn instance_by_name(&self, cell: CellId, name: &str) -> Option<InstId> {
        self.cell(cell).instance_name_map.get(name).copied()
    }

    pub fn add_cell(&mut self, name: &str, abutment_box: Rect, is_terminal: bool) -> DbResult<CellId> {
        if self.cell_name_map.contains_key(name) {
            return Err(DbError::DuplicateCell(name.to_string()));
        }
        let id = CellId::new(self.cells.len());
        self.cells.push(CellData {
            name: name.to_string(),
            abutment_box,
            is_terminal,
            nets: Vec::new(),
            instances: Vec::new(),
            net_name_map: HashMap::new(),
            instance_name_map: HashMap::new(),
        });
        self.cell_name_map.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn rename_cell(&mut self, cell: CellId, name: &str) -> DbResult<()> {
        if self.cell_name_map.contains_key(name) {
            return Err(DbError::DuplicateCell(name.to_string()));
        }
        let old = std::mem::replace(&mut self.cells[cell.index()].name, name.to_string());
        self.cell_name_map.remove(&old);
        self.cell_name_map.insert(name.to_string(), cell);
        Ok(())
    }

    pub fn create_net(&mut self, cell: CellId, name: &str) -> DbResult<NetId> {
        if self.cell(cell).net_name_map.contains_key(name) {
            return Err(DbError::DuplicateNet {
                cell: self.cell(cell).name.clone(),
                net: name.to_string(),
            });
        }
        let id = NetId::new(self.nets.len());
        self.nets.push(NetData {
            name: name.to_string(),
            cell,
            net_type: NetType::Logical,
            direction: Direction::Undefined,
            is_external: false,
            is_global: false,
            pins: Vec::new(),
            plugs: Vec::new(),
            components: Vec::new(),
        });
        let data = &mut self.cells[cell.index()];
        data.nets.push(id);
        data.net_name_map.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn create_instance(&mut self, owner: CellId, name: &str, master: CellId) -> DbResult<InstId> {
        if self.cell(owner).instance_name_map.contains_key(name) {
            return Err(DbError::DuplicateInstance {
                cell: self.cell(owner).name.clone(),
                instance: name.to_string(),
            });
        }
        let id = InstId::new(self.instances.len());
        self.instances.push(InstanceData {
            name: name.to_string(),
            owner,
            master,
            transformation: Transformation::default(),
            status: PlacementStatus::Unplaced,
            connections: HashMap::new(),
            alive: true,
        });
        let data = &mut self.cells[owner.index()];
        data.instances.push(id);
        data.instance_name_map.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn destroy_instance(&mut self, inst: InstId) -> DbResult<()> {
        let data = self.instance(inst);
        if !data.alive {
            return Err(DbError::Destroyed(data.name.clone()));
        }
        let owner = data.owner;
        let name = data.name.clone();
        let connections: Vec<(NetId, NetId)> =
            data.connections.iter().map(|(&m, &n)| (m, n)).collect();
        for (master_net, net) in connections {
            let plug = Plug {
                instance: inst,
                master_net,
            };
            self.nets[net.index()].plugs.retain(|p| *p != plug);
        }
        let cell = &mut self.cells[owner.index()];
        cell.instances.retain(|&i| i != inst);
        cell.instance_name_map.remove(&name);
        let data = &mut self.instances[inst.index()];
        data.connections.clear();
        data.alive = false;
        Ok(())
    }

    pub fn set_transformation(&mut self, inst: InstId, transformation: Transformation) {
        self.instances[inst.index()].transformation = transformation;
    }

    pub fn set_placement_status(&mut self, inst: InstId, status: PlacementStatus) {
        self.instances[inst.index()].status = status;
    }

    /// Abutment box of the instance in its owner's coordinates.
    pub fn instance_box(&self, inst: InstId) -> Rect {
        let data = self.instance(inst);
        data.transformation
            .apply_rect(&self.cell(data.master).abutment_box)
    }

    pub fn plug(&self, inst: InstId, master_net: NetId) -> Option<Plug> {
        let data = self.instance(inst);
        let net = self.net(master_net);
        if !data.alive || net.cell != data.master || !net.is_external {
            return None;
        }
        Some(Plug {
            instance: inst,
            master_net,
        })
    }

    pub fn plug_by_name(&self, inst: InstId, name: &str) -> Option<Plug> {
        let master = self.instance(inst).master;
        self.net_by_name(master, name)
            .and_then(|net| self.plug(inst, net))
    }

    /// First plug of `inst` (in master net order) connected to `net`.
    pub fn plug_by_net(&self, inst: InstId, net: NetId) -> Option<Plug> {
        let data = self.instance(inst);
        self.cell(data.master)
            .nets
            .iter()
            .copied()
            .find(|master_net| data.connections.get(master_net) == Some(&net))
            .and_then(|master_net| self.plug(inst, master_net))
    }

    pub fn plug_net(&self, plug: Plug) -> Option<NetId> {
        self.instance(plug.instance)
            .connections
            .get(&plug.master_net)
            .copied()
    }

    pub fn plug_name(&self, plug: Plug) -> String {
        format!(
            "{}.{}",
            self.instance(plug.instance).name,
            self.net(plug.master_net).name
        )
    }

    pub fn set_plug_net(&mut self, plug: Plug, net: Option<NetId>) -> DbResult<()> {
        let owner = self.instance(plug.instance).owner;
        if let Some(net) = net
            && self.net(net).cell != owner
        {
            return Err(DbError::ForeignNet {
                cell: self.cell(owner).name.clone(),
                net: self.net(net).name.clone(),
            });
        }
        let previous = match net {
            Some(net) => self.instances[plug.instance.index()]
                .connections
                .insert(plug.master_net, net),
            None => self.instances[plug.instance.index()]
                .connections
                .remove(&plug.master_net),
        };
        if let Some(previous) = previous {
            self.nets[previous.index()].plugs.retain(|p| *p != plug);
        }
        if let Some(net) = net {
            self.nets[net.index()].plugs.push(plug);
        }
        Ok(())
    }

    /// Driver plugs of a net: connected plugs whose master net is an output.
    pub fn net_drivers(&self, net: NetId) -> Vec<Plug> {
        self.net(net)
            .plugs
            .iter()
            .copied()
            .filter(|p| self.net(p.master_net).direction == Direction::Out)
            .collect()
    }

    fn push_component(&mut self, net: NetId, kind: ComponentKind) -> CompId {
        let id = CompId::new(self.components.len());
        self.components.push(ComponentData {
            net,
            kind,
            alive: true,
        });
        self.nets[net.index()].components.push(id);
        id
    }

    pub fn create_routing_pad(&mut self, net: NetId, occurrence: Occurrence) -> CompId {
        let bbox = self.occurrence_bbox(&occurrence);
        self.push_component(net, ComponentKind::RoutingPad { occurrence, bbox })
    }

    pub fn create_contact(&mut self, net: NetId, position: Point<DbU>, layer: u8) -> CompId {
        self.push_component(net, ComponentKind::Contact { position, layer })
    }

    pub fn create_horizontal(&mut self, source: CompId, target: CompId, y: DbU, layer: u8) -> CompId {
        let net = self.component(source).net;
        self.push_component(
            net,
            ComponentKind::Horizontal {
                source,
                target,
                y,
                layer,
            },
        )
    }

    pub fn create_vertical(&mut self, source: CompId, target: CompId, x: DbU, layer: u8) -> CompId {
        let net = self.component(source).net;
        self.push_component(
            net,
            ComponentKind::Vertical {
                source,
                target,
                x,
                layer,
            },
        )
    }

    /// Anchor position of a component. Wires report their midpoint on their axis.
    pub fn component_position(&self, id: CompId) -> Point<DbU> {
        match &self.component(id).kind {
            ComponentKind::RoutingPad { bbox, .. } => bbox.center(),
            ComponentKind::Contact { position, .. } => *position,
            ComponentKind::Horizontal {
                source, target, y, ..
            } => {
                let a = self.component_position(*source).x;
                let b = self.component_position(*target).x;
                Point::new(a + (b - a) / 2, *y)
            }
            ComponentKind::Vertical {
                source, target, x, ..
            } => {
                let a = self.component_position(*source).y;
                let b = self.component_position(*target).y;
                Point::new(*x, a + (b - a) / 2)
            }
        }
    }

    pub fn move_contact(&mut self, id: CompId, to: Point<DbU>) -> DbResult<()> {
        match &mut self.components[id.index()].kind {
            ComponentKind::Contact { position, .. } => {
                *position = to;
                Ok(())
            }
            _ => Err(DbError::NotAContact(id)),
        }
    }

    /// Moves the axis of a wire; contacts and pads are left untouched.
    pub fn set_wire_axis(&mut self, id: CompId, axis: DbU) {
        match &mut self.components[id.index()].kind {
            ComponentKind::Horizontal { y, .. } => *y = axis,
            ComponentKind::Vertical { x, .. } => *x = axis,
            _ => {}
        }
    }

    pub fn destroy_net_components(&mut self, net: NetId) {
        let components = std::mem::take(&mut self.nets[net.index()].components);
        for id in components {
            self.components[id.index()].alive = false;
        }
    }

    /// Box mapped from the innermost master of `path` up to the top cell.
    pub fn path_transform_rect(&self, path: &Path, r: &Rect) -> Rect {
        path.instances()
            .iter()
            .rev()
            .fold(*r, |r, &inst| self.instance(inst).transformation.apply_rect(&r))
    }

    /// Bounding box of the occurrence pin in top-cell coordinates. Falls back to
    /// the abutment box of the plugged instance when the master net has no pin.
    pub fn occurrence_bbox(&self, occurrence: &Occurrence) -> Rect {
        let inst = self.instance(occurrence.plug.instance);
        let pins = &self.net(occurrence.plug.master_net).pins;
        let local = match pins.split_first() {
            Some((first, rest)) => rest.iter().fold(*first, |acc, r| acc.merge(r)),
            None => self.cell(inst.master).abutment_box,
        };
        let in_owner = inst.transformation.apply_rect(&local);
        self.path_transform_rect(&occurrence.path, &in_owner)
    }

    /// Every plug of a terminal instance reachable from `net` by descending the
    /// hierarchy through external nets.
    pub fn terminal_plug_occurrences(&self, net: NetId) -> Vec<Occurrence> {
        let mut out = Vec::new();
        self.collect_terminal_plugs(net, &Path::new(), &mut out);
        out
    }

    fn collect_terminal_plugs(&self, net: NetId, path: &Path, out: &mut Vec<Occurrence>) {
        for plug in &self.net(net).plugs {
            let master = self.instance(plug.instance).master;
            if self.cell(master).is_terminal {
                out.push(Occurrence::new(path.clone(), *plug));
            } else {
                self.collect_terminal_plugs(plug.master_net, &path.child(plug.instance), out);
            }
        }
    }

    /// Net of the top cell carrying the occurrence, climbing through the plugs of
    /// the path instances. `None` when a level is disconnected.
    pub fn top_net_of(&self, occurrence: &Occurrence) -> Option<NetId> {
        let mut net = self.plug_net(occurrence.plug)?;
        for &inst in occurrence.path.instances().iter().rev() {
            let plug = self.plug(inst, net)?;
            net = self.plug_net(plug)?;
        }
        Some(net)
    }
}
