use bitflags::bitflags;
use eda_common::db::core::{ComponentKind, DbError, DbResult, Design, LayerDirection};
use eda_common::db::indices::{CompId, InstId, NetId};
use eda_common::db::occurrence::{Occurrence, Path};
use eda_common::geom::dbu::{DbU, from_lambda};
use eda_common::geom::point::Point;
use eda_common::geom::rect::Rect;
use eda_common::util::config::Config;

bitflags! {
    /// Options for access contacts and wire creation.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        /// The access contact is left by a horizontal wire.
        const H_ACCESS = 0x01;
        /// Use the deep routing layers.
        const DEEP_DEPTH = 0x02;
        const OFFSET_TOP1 = 0x04;
        const OFFSET_BOTTOM1 = 0x08;
        const OFFSET_LEFT1 = 0x10;
        const OFFSET_RIGHT1 = 0x20;
    }
}

#[derive(Clone, Copy, Debug)]
pub struct CellGauge {
    pub slice_step: DbU,
    pub slice_height: DbU,
}

#[derive(Clone, Debug)]
pub struct RoutingLayerGauge {
    pub name: String,
    pub direction: LayerDirection,
    pub depth: u8,
    pub pitch: DbU,
    pub offset: DbU,
    pub width: DbU,
}

impl RoutingLayerGauge {
    /// Track nearest to `v` on a grid anchored at `origin`.
    fn nearest_track(&self, origin: DbU, v: DbU) -> DbU {
        let origin = origin + self.offset;
        let k = (v - origin + self.pitch / 2).div_euclid(self.pitch);
        origin + k * self.pitch
    }

    /// Nearest track to `v` that lies in `[min, max]`, the grid anchored at `min`.
    fn nearest_track_in(&self, min: DbU, max: DbU, v: DbU) -> DbU {
        let origin = min + self.offset;
        let k = (v - origin + self.pitch / 2).div_euclid(self.pitch);
        let k_min = -(origin - min).div_euclid(self.pitch);
        let k_max = (max - origin).div_euclid(self.pitch);
        origin + k.max(k_min).min(k_max) * self.pitch
    }
}

pub struct GaugeConf {
    pub cell_gauge: CellGauge,
    pub layers: Vec<RoutingLayerGauge>,
    pub horizontal_depth: u8,
    pub vertical_depth: u8,
    pub horizontal_deep_depth: u8,
    pub vertical_deep_depth: u8,
}

impl GaugeConf {
    pub fn from_config(config: &Config) -> Result<Self, String> {
        let cg = &config.cell_gauge;
        let cell_gauge = CellGauge {
            slice_step: from_lambda(cg.slice_step),
            slice_height: from_lambda(cg.slice_height),
        };
        if cell_gauge.slice_step <= 0 || cell_gauge.slice_height <= 0 {
            return Err("Cell gauge slice step and height must be positive.".into());
        }

        let rg = &config.routing_gauge;
        let layers: Vec<RoutingLayerGauge> = rg
            .layers
            .iter()
            .enumerate()
            .map(|(depth, l)| RoutingLayerGauge {
                name: l.name.clone(),
                direction: l.direction,
                depth: depth as u8,
                pitch: from_lambda(l.pitch),
                offset: from_lambda(l.offset),
                width: from_lambda(l.width),
            })
            .collect();
        if let Some(l) = layers.iter().find(|l| l.pitch <= 0) {
            return Err(format!("Routing layer {} has a null pitch.", l.name));
        }

        let conf = Self {
            cell_gauge,
            layers,
            horizontal_depth: rg.horizontal_depth,
            vertical_depth: rg.vertical_depth,
            horizontal_deep_depth: rg.horizontal_deep_depth,
            vertical_deep_depth: rg.vertical_deep_depth,
        };
        for (depth, direction) in [
            (conf.horizontal_depth, LayerDirection::Horizontal),
            (conf.horizontal_deep_depth, LayerDirection::Horizontal),
            (conf.vertical_depth, LayerDirection::Vertical),
            (conf.vertical_deep_depth, LayerDirection::Vertical),
        ] {
            match conf.layers.get(depth as usize) {
                None => return Err(format!("Routing depth {} has no layer.", depth)),
                Some(l) if l.direction != direction => {
                    return Err(format!(
                        "Routing layer {} (depth {}) is not {:?}.",
                        l.name, depth, direction
                    ));
                }
                Some(_) => {}
            }
        }
        Ok(conf)
    }

    pub fn slice_step(&self) -> DbU {
        self.cell_gauge.slice_step
    }

    pub fn slice_height(&self) -> DbU {
        self.cell_gauge.slice_height
    }

    #[inline]
    pub fn to_x_cell_grid(&self, x: DbU) -> DbU {
        x - x.rem_euclid(self.cell_gauge.slice_step)
    }

    #[inline]
    pub fn to_y_cell_grid(&self, y: DbU) -> DbU {
        y - y.rem_euclid(self.cell_gauge.slice_height)
    }

    /// Manhattan distance with both Y snapped to their row.
    pub fn rp_distance(&self, p1: Point<DbU>, p2: Point<DbU>) -> DbU {
        let dx = (p1.x - p2.x).abs();
        let dy = (self.to_y_cell_grid(p1.y) - self.to_y_cell_grid(p2.y)).abs();
        dx + dy
    }

    pub fn layer_gauge(&self, depth: u8) -> &RoutingLayerGauge {
        &self.layers[depth as usize]
    }

    pub fn horizontal_layer(&self, flags: AccessFlags) -> u8 {
        if flags.contains(AccessFlags::DEEP_DEPTH) {
            self.horizontal_deep_depth
        } else {
            self.horizontal_depth
        }
    }

    pub fn vertical_layer(&self, flags: AccessFlags) -> u8 {
        if flags.contains(AccessFlags::DEEP_DEPTH) {
            self.vertical_deep_depth
        } else {
            self.vertical_depth
        }
    }

    pub fn horizontal_pitch(&self, flags: AccessFlags) -> DbU {
        self.layer_gauge(self.horizontal_layer(flags)).pitch
    }

    pub fn vertical_pitch(&self, flags: AccessFlags) -> DbU {
        self.layer_gauge(self.vertical_layer(flags)).pitch
    }

    pub fn get_nearest_vertical_track(&self, area: &Rect, x: DbU, flags: AccessFlags) -> DbU {
        self.layer_gauge(self.vertical_layer(flags))
            .nearest_track_in(area.xmin(), area.xmax(), x)
    }

    pub fn get_nearest_horizontal_track(&self, area: &Rect, y: DbU, flags: AccessFlags) -> DbU {
        self.layer_gauge(self.horizontal_layer(flags))
            .nearest_track_in(area.ymin(), area.ymax(), y)
    }

    /// Top-level pin box of `inst.<plug_name>`.
    pub fn rp_bb(&self, db: &Design, inst: InstId, plug_name: &str) -> DbResult<Rect> {
        let plug = db
            .plug_by_name(inst, plug_name)
            .ok_or_else(|| DbError::UnknownPlug {
                instance: db.instance(inst).name.clone(),
                plug: plug_name.to_string(),
            })?;
        Ok(db.occurrence_bbox(&Occurrence::new(Path::new(), plug)))
    }

    pub fn rp_by_occurrence(&self, db: &mut Design, occurrence: Occurrence, net: NetId) -> CompId {
        db.create_routing_pad(net, occurrence)
    }

    pub fn rp_by_plug_name(
        &self,
        db: &mut Design,
        inst: InstId,
        plug_name: &str,
        net: NetId,
    ) -> DbResult<CompId> {
        let plug = db
            .plug_by_name(inst, plug_name)
            .ok_or_else(|| DbError::UnknownPlug {
                instance: db.instance(inst).name.clone(),
                plug: plug_name.to_string(),
            })?;
        Ok(self.rp_by_occurrence(db, Occurrence::new(Path::new(), plug), net))
    }

    /// Where an access contact for a pin box lands: the pin center column,
    /// the horizontal track nearest to the middle of the pin row, then the
    /// requested one pitch offsets.
    pub fn access_position(&self, pin: &Rect, flags: AccessFlags) -> Point<DbU> {
        let center = pin.center();
        let h_gauge = self.layer_gauge(self.horizontal_layer(flags));
        let row_middle = self.to_y_cell_grid(center.y) + self.slice_height() / 2;
        let mut y = h_gauge.nearest_track(0, row_middle);
        if flags.contains(AccessFlags::OFFSET_TOP1) {
            y += h_gauge.pitch;
        }
        if flags.contains(AccessFlags::OFFSET_BOTTOM1) {
            y -= h_gauge.pitch;
        }

        let mut x = center.x;
        if flags.contains(AccessFlags::OFFSET_RIGHT1) {
            x += self.vertical_pitch(flags);
        }
        if flags.contains(AccessFlags::OFFSET_LEFT1) {
            x -= self.vertical_pitch(flags);
        }
        Point::new(x, y)
    }

    /// Layer an access contact stops on. With `H_ACCESS` the stack climbs to
    /// the horizontal layer, otherwise it ends on the vertical one.
    pub fn access_layer(&self, flags: AccessFlags) -> u8 {
        if flags.contains(AccessFlags::H_ACCESS) {
            self.horizontal_layer(flags)
        } else {
            self.vertical_layer(flags)
        }
    }

    /// Contact above a routing pad, tied to it by a vertical stub.
    pub fn rp_access(&self, db: &mut Design, rp: CompId, flags: AccessFlags) -> DbResult<CompId> {
        let (net, pin) = match &db.component(rp).kind {
            ComponentKind::RoutingPad { bbox, .. } => (db.component(rp).net, *bbox),
            _ => return Err(DbError::NotAContact(rp)),
        };
        let position = self.access_position(&pin, flags);
        let contact = db.create_contact(net, position, self.access_layer(flags));
        db.create_vertical(rp, contact, position.x, self.vertical_layer(flags));
        log::trace!(
            "Access of pad {} at ({}, {}) flags {:?}",
            rp,
            position.x,
            position.y,
            flags
        );
        Ok(contact)
    }

    pub fn rp_access_by_plug_name(
        &self,
        db: &mut Design,
        inst: InstId,
        plug_name: &str,
        net: NetId,
        flags: AccessFlags,
    ) -> DbResult<CompId> {
        let rp = self.rp_by_plug_name(db, inst, plug_name, net)?;
        self.rp_access(db, rp, flags)
    }

    pub fn create_contact(
        &self,
        db: &mut Design,
        net: NetId,
        x: DbU,
        y: DbU,
        flags: AccessFlags,
    ) -> CompId {
        let layer = self.horizontal_layer(flags).min(self.vertical_layer(flags));
        db.create_contact(net, Point::new(x, y), layer)
    }

    pub fn create_horizontal(
        &self,
        db: &mut Design,
        source: CompId,
        target: CompId,
        y: DbU,
        flags: AccessFlags,
    ) -> CompId {
        db.create_horizontal(source, target, y, self.horizontal_layer(flags))
    }

    pub fn create_vertical(
        &self,
        db: &mut Design,
        source: CompId,
        target: CompId,
        x: DbU,
        flags: AccessFlags,
    ) -> CompId {
        db.create_vertical(source, target, x, self.vertical_layer(flags))
    }

    /// Moves an access contact and realigns the stub joining it to its pad.
    pub fn set_stack_position(&self, db: &mut Design, contact: CompId, x: DbU, y: DbU) -> DbResult<()> {
        db.move_contact(contact, Point::new(x, y))?;
        let net = db.component(contact).net;
        let stubs: Vec<CompId> = db
            .net(net)
            .components
            .iter()
            .copied()
            .filter(|&c| match db.component(c).kind {
                ComponentKind::Vertical { source, target, .. } => {
                    target == contact
                        && matches!(db.component(source).kind, ComponentKind::RoutingPad { .. })
                }
                _ => false,
            })
            .collect();
        for stub in stubs {
            db.set_wire_axis(stub, x);
        }
        Ok(())
    }
}
