use crate::error::CtsError;
use crate::node::{HTreeNode, NodeId};
use eda_common::db::catalog::{Catalog, Views};
use eda_common::db::core::{Design, Direction, NetType, PlacementStatus, Plug};
use eda_common::db::indices::{CellId, InstId, NetId};
use eda_common::db::occurrence::{Occurrence, Path};
use eda_common::geom::dbu::{DbU, from_lambda, to_lambda};
use eda_common::geom::point::Point;
use eda_common::geom::rect::Rect;
use eda_common::geom::transform::{Orientation, Transformation};
use eda_common::util::config::ClockTreeConfig;
use eda_common::util::profiler::ScopedTimer;
use eda_router::algo::rsmt::SteinerSolver;
use eda_router::gauge::GaugeConf;
use std::collections::{BTreeSet, HashSet};

const MIN_ASPECT_RATIO: f64 = 0.5;
const MAX_ASPECT_RATIO: f64 = 1.5;
const MIN_SIDE_LAMBDA: f64 = 100.0;

/// An H-tree clock distribution over `area` of the top cell.
pub struct HTree {
    pub(crate) conf: GaugeConf,
    pub(crate) cell: CellId,
    pub(crate) area: Rect,
    pub(crate) min_side: DbU,
    pub(crate) buffer_cell: CellId,
    pub(crate) tie_cell: CellId,
    pub(crate) buffer_in: String,
    pub(crate) buffer_out: String,
    pub(crate) top_buffer: InstId,
    pub(crate) master_clock: NetId,
    /// X of the vertical tracks taken by buffer input accesses.
    pub(crate) used_v_tracks: BTreeSet<DbU>,
    /// Cells modified in place, top cell first.
    pub(crate) cloneds: Vec<CellId>,
    pub(crate) nodes: Vec<HTreeNode>,
    pub(crate) root: Option<NodeId>,
    feed_count: usize,
}

/// Tree state edited alongside the design during a stage.
struct Bookkeeping {
    used_v_tracks: BTreeSet<DbU>,
    cloneds: Vec<CellId>,
    nodes: Vec<HTreeNode>,
    root: Option<NodeId>,
    feed_count: usize,
}

/// Names of the IN and OUT non-global external nets of the buffer.
fn buffer_io(db: &Design, buffer: CellId) -> Result<(String, String), CtsError> {
    let mut inputs = Vec::new();
    let mut outputs = Vec::new();
    for &net in &db.cell(buffer).nets {
        let data = db.net(net);
        if !data.is_external || data.is_global {
            continue;
        }
        match data.direction {
            Direction::In => inputs.push(data.name.clone()),
            Direction::Out => outputs.push(data.name.clone()),
            _ => {}
        }
    }
    match (inputs.as_slice(), outputs.as_slice()) {
        ([i], [o]) => Ok((i.clone(), o.clone())),
        _ => Err(CtsError::Config(vec![
            format!(
                "Buffer cell \"{}\" must have exactly one input and one output ({} IN, {} OUT).",
                db.cell(buffer).name,
                inputs.len(),
                outputs.len()
            ),
        ])),
    }
}

impl HTree {
    /// Validates the request and allocates the top buffer and its output net.
    /// Nothing is created in the design when validation fails.
    pub fn new(
        db: &mut Design,
        conf: GaugeConf,
        settings: &ClockTreeConfig,
        cell: CellId,
        clock_net: Option<NetId>,
        area: Rect,
    ) -> Result<Self, CtsError> {
        if area.is_empty() {
            return Err(CtsError::InvalidRegion("The clock area is empty.".into()));
        }
        let aspect_ratio = area.width() as f64 / area.height() as f64;
        if !(MIN_ASPECT_RATIO..=MAX_ASPECT_RATIO).contains(&aspect_ratio) {
            return Err(CtsError::InvalidRegion(format!(
                "aspect ratio {:.6} is disproportionate, must be between {} and {}.",
                aspect_ratio, MIN_ASPECT_RATIO, MAX_ASPECT_RATIO
            )));
        }

        let min_side = from_lambda(settings.minimum_side);
        if min_side < from_lambda(MIN_SIDE_LAMBDA) {
            return Err(CtsError::Config(vec![format!(
                "clock_tree.minimum_side ({}) is less than {} lambda.",
                settings.minimum_side, MIN_SIDE_LAMBDA
            )]));
        }

        let buffer_cell = db.cell_by_name(&settings.buffer).ok_or_else(|| {
            CtsError::Config(vec![
                format!("Buffer cell \"{}\" not found in library,", settings.buffer),
                "please check the \"clock_tree.buffer\" configuration parameter.".to_string(),
            ])
        })?;
        let (buffer_in, buffer_out) = buffer_io(db, buffer_cell)?;

        let tie_cell = db.cell_by_name(&settings.tie_cell).ok_or_else(|| {
            CtsError::Config(vec![
                format!("Tie cell \"{}\" not found in library,", settings.tie_cell),
                "please check the \"clock_tree.tie_cell\" configuration parameter.".to_string(),
            ])
        })?;
        let buffer_width = db.cell(buffer_cell).abutment_box.width();
        let tie_width = db.cell(tie_cell).abutment_box.width();
        if tie_width <= 0 || buffer_width % tie_width != 0 {
            return Err(CtsError::Config(vec![format!(
                "Buffer width ({}) is not a multiple of the tie cell width ({}).",
                to_lambda(buffer_width),
                to_lambda(tie_width)
            )]));
        }

        let master_clock = match clock_net {
            Some(net) => net,
            None => db
                .cell(cell)
                .nets
                .iter()
                .copied()
                .find(|&n| db.net(n).net_type == NetType::Clock)
                .ok_or_else(|| CtsError::NoClockNet(db.cell(cell).name.clone()))?,
        };

        log::info!("Creating clock H-Tree for \"{}\".", db.cell(cell).name);
        log::info!("   - Clock is \"{}\"", db.net(master_clock).name);
        log::info!("   - Minimum side for clock area: {}", settings.minimum_side);
        log::trace!("bufferIn: <{}> bufferOut: <{}>", buffer_in, buffer_out);

        let mut tree = Self {
            conf,
            cell,
            area,
            min_side,
            buffer_cell,
            tie_cell,
            buffer_in,
            buffer_out,
            top_buffer: InstId::new(0),
            master_clock,
            used_v_tracks: BTreeSet::new(),
            cloneds: vec![cell],
            nodes: Vec::new(),
            root: None,
            feed_count: 0,
        };
        let top_buffer = db.update(|db| -> Result<InstId, CtsError> {
            let top_buffer = db.create_instance(cell, "ck_htree", buffer_cell)?;
            tree.create_child_net(db, top_buffer, "ck_htree")?;
            Ok(top_buffer)
        })?;
        tree.top_buffer = top_buffer;
        Ok(tree)
    }

    pub fn cell(&self) -> CellId {
        self.cell
    }

    pub fn area(&self) -> Rect {
        self.area
    }

    pub fn top_buffer(&self) -> InstId {
        self.top_buffer
    }

    pub fn master_clock(&self) -> NetId {
        self.master_clock
    }

    pub fn used_v_tracks(&self) -> &BTreeSet<DbU> {
        &self.used_v_tracks
    }

    pub fn cloneds(&self) -> &[CellId] {
        &self.cloneds
    }

    pub fn nodes(&self) -> &[HTreeNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> &HTreeNode {
        &self.nodes[id.index()]
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn gauge(&self) -> &GaugeConf {
        &self.conf
    }

    /// Every leaf occurrence attached so far.
    pub fn leafs(&self) -> impl Iterator<Item = &Occurrence> {
        self.nodes
            .iter()
            .flat_map(|n| n.leafs.iter())
            .flat_map(|l| l.iter())
    }

    /// Clock nets created for the tree, still carrying a driver.
    pub fn clock_nets(&self, db: &Design) -> Vec<NetId> {
        db.cell(self.cell)
            .nets
            .iter()
            .copied()
            .filter(|&n| {
                let net = db.net(n);
                net.net_type == NetType::Clock && net.name.starts_with("ck_htree")
            })
            .collect()
    }

    fn root_node(&self) -> Result<NodeId, CtsError> {
        self.root.ok_or_else(|| CtsError::NotBuilt("ck_htree".to_string()))
    }

    pub(crate) fn buffer_plug(&self, db: &Design, buffer: InstId, name: &str) -> Result<Plug, CtsError> {
        db.plug_by_name(buffer, name).ok_or_else(|| {
            CtsError::MissingConnection(format!(
                "Plug \"{}\" not found on instance \"{}\".",
                name,
                db.instance(buffer).name
            ))
        })
    }

    pub(crate) fn output_net(&self, db: &Design, buffer: InstId) -> Result<NetId, CtsError> {
        let plug = self.buffer_plug(db, buffer, &self.buffer_out)?;
        db.plug_net(plug).ok_or_else(|| {
            CtsError::MissingConnection(format!(
                "Output of \"{}\" is not connected.",
                db.instance(buffer).name
            ))
        })
    }

    pub(crate) fn create_child_net(
        &self,
        db: &mut Design,
        buffer: InstId,
        name: &str,
    ) -> Result<NetId, CtsError> {
        let net = db.create_net(self.cell, name)?;
        db.net_mut(net).net_type = NetType::Clock;
        let plug = self.buffer_plug(db, buffer, &self.buffer_out)?;
        db.set_plug_net(plug, Some(net))?;
        Ok(net)
    }

    fn bookkeeping(&self) -> Bookkeeping {
        Bookkeeping {
            used_v_tracks: self.used_v_tracks.clone(),
            cloneds: self.cloneds.clone(),
            nodes: self.nodes.clone(),
            root: self.root,
            feed_count: self.feed_count,
        }
    }

    fn restore(&mut self, saved: Bookkeeping) {
        self.used_v_tracks = saved.used_v_tracks;
        self.cloneds = saved.cloneds;
        self.nodes = saved.nodes;
        self.root = saved.root;
        self.feed_count = saved.feed_count;
    }

    /// Update session over both the design and the tree: when `edits` fails
    /// neither keeps any of its changes.
    fn session<T>(
        &mut self,
        db: &mut Design,
        edits: impl FnOnce(&mut Self, &mut Design) -> Result<T, CtsError>,
    ) -> Result<T, CtsError> {
        let saved = self.bookkeeping();
        let result = db.update(|db| edits(self, db));
        if result.is_err() {
            self.restore(saved);
        }
        result
    }

    fn next_feed(&mut self) -> usize {
        self.feed_count += 1;
        self.feed_count
    }

    /// Snaps to the cell grid. Rows of odd parity from the bottom of the
    /// tree area are mirrored, their origin moved to the row top edge.
    pub fn place_instance(&self, db: &mut Design, inst: InstId, x: DbU, y: DbU) {
        let slice_height = self.conf.slice_height();
        let x_slice = self.conf.to_x_cell_grid(x);
        let mut y_slice = self.conf.to_y_cell_grid(y);

        let mut orientation = Orientation::Id;
        if (y_slice - self.area.ymin()).div_euclid(slice_height).rem_euclid(2) != 0 {
            orientation = Orientation::My;
            y_slice += slice_height;
        }
        db.set_transformation(inst, Transformation::new(x_slice, y_slice, orientation));
        db.set_placement_status(inst, PlacementStatus::Fixed);
    }

    /// Removes `inst` and fills its footprint with tie cells.
    pub fn destroy_instance(&mut self, db: &mut Design, inst: InstId) -> Result<(), CtsError> {
        let transformation = db.instance(inst).transformation;
        let width = db.cell(db.instance(inst).master).abutment_box.width();
        let tie_width = db.cell(self.tie_cell).abutment_box.width();

        db.destroy_instance(inst)?;
        let mut x = transformation.tx;
        for _ in 0..width / tie_width {
            let name = format!("htree_feed_{}", self.next_feed());
            let feed = db.create_instance(self.cell, &name, self.tie_cell)?;
            db.set_transformation(
                feed,
                Transformation::new(x, transformation.ty, transformation.orientation),
            );
            db.set_placement_status(feed, PlacementStatus::Placed);
            x += tie_width;
        }
        Ok(())
    }

    pub fn build(&mut self, db: &mut Design) -> Result<(), CtsError> {
        let _timer = ScopedTimer::new("H-Tree build");
        let top_buffer = self.top_buffer;
        let area = self.area;
        let root = self.session(db, |tree, db| {
            tree.build_node(db, top_buffer, area, String::new())
        })?;
        self.root = Some(root);
        log::debug!("Built {} H-Tree nodes.", self.nodes.len());
        Ok(())
    }

    pub fn place(&mut self, db: &mut Design) -> Result<(), CtsError> {
        let _timer = ScopedTimer::new("H-Tree placement");
        let root = self.root_node()?;
        self.session(db, |tree, db| {
            let center = tree.area.center();
            tree.place_instance(db, tree.top_buffer, center.x, center.y);
            let pin = tree.conf.rp_bb(db, tree.top_buffer, &tree.buffer_in)?;
            tree.used_v_tracks.insert(pin.center().x);
            tree.place_node(db, root)
        })?;
        log::info!("   - H-Tree depth: {}", self.tree_depth());
        log::trace!("usedVTracks: {:?}", self.used_v_tracks);
        Ok(())
    }

    pub fn route(&self, db: &mut Design) -> Result<(), CtsError> {
        let _timer = ScopedTimer::new("H-Tree trunk routing");
        let root = self.root_node()?;
        db.update(|db| self.route_node(db, root))
    }

    /// Distributes the sinks of the master clock hyper-net over the leaf
    /// buffers, wires them, then feeds the top buffer from the master clock.
    pub fn connect_leaf(
        &mut self,
        db: &mut Design,
        solver: &dyn SteinerSolver,
    ) -> Result<(), CtsError> {
        let _timer = ScopedTimer::new("H-Tree leaf connection");
        let root = self.root_node()?;
        log::info!("   - Connecting leafs.");
        self.session(db, |tree, db| {
            let occurrences: Vec<Occurrence> = db
                .terminal_plug_occurrences(tree.master_clock)
                .into_iter()
                .filter(|o| db.net(o.plug.master_net).direction != Direction::Out)
                .collect();
            log::debug!("{} sinks on the master clock.", occurrences.len());
            for occurrence in occurrences {
                log::trace!("Adding leaf <{}>.", occurrence.name(db));
                let position = db.occurrence_bbox(&occurrence).center();
                tree.node_add_leaf(db, root, position, occurrence)?;
            }
            tree.connect_leafs_node(db, root, solver)?;

            let input = tree.buffer_plug(db, tree.top_buffer, &tree.buffer_in)?;
            db.set_plug_net(input, Some(tree.master_clock))?;
            Ok(())
        })
    }

    pub fn prune(&mut self, db: &mut Design) -> Result<(), CtsError> {
        let _timer = ScopedTimer::new("H-Tree pruning");
        let root = self.root_node()?;
        self.session(db, |tree, db| tree.prune_node(db, root))
    }

    /// Renames the modified cells with `_cts`, then saves `top` and every
    /// non-terminal master below it once.
    pub fn save(
        &self,
        db: &mut Design,
        catalog: &mut dyn Catalog,
        top: CellId,
    ) -> Result<(), CtsError> {
        let _timer = ScopedTimer::with_level("H-Tree save", log::Level::Debug);
        db.update(|db| -> Result<(), CtsError> {
            for &cell in &self.cloneds {
                let name = format!("{}_cts", db.cell(cell).name);
                db.rename_cell(cell, &name)?;
            }
            Ok(())
        })?;

        let mut saved = HashSet::new();
        self.rsave(db, catalog, top, &mut saved)
    }

    fn rsave(
        &self,
        db: &Design,
        catalog: &mut dyn Catalog,
        cell: CellId,
        saved: &mut HashSet<CellId>,
    ) -> Result<(), CtsError> {
        if !saved.insert(cell) {
            return Ok(());
        }
        let views = if db.cell(cell).name.ends_with("_cts") {
            Views::ALL
        } else {
            Views::PHYSICAL
        };
        catalog.save_cell(db, cell, views)?;

        for &inst in &db.cell(cell).instances {
            let master = db.instance(inst).master;
            if !db.cell(master).is_terminal {
                self.rsave(db, catalog, master, saved)?;
            }
        }
        Ok(())
    }

    fn add_cloned(&mut self, cell: CellId) {
        if !self.cloneds.contains(&cell) {
            self.cloneds.push(cell);
        }
    }

    /// Brings `net` down `path`, creating external clock nets in the masters
    /// as needed. Returns the plug of the innermost path instance, `None` for
    /// an empty path.
    pub fn add_deep_plug(
        &mut self,
        db: &mut Design,
        net: NetId,
        path: &Path,
    ) -> Result<Option<Plug>, CtsError> {
        self.session(db, |tree, db| tree.deep_plug(db, net, path))
    }

    pub(crate) fn deep_plug(
        &mut self,
        db: &mut Design,
        net: NetId,
        path: &Path,
    ) -> Result<Option<Plug>, CtsError> {
        let Some(head) = path.head_instance() else {
            return Ok(None);
        };
        let tail = path.tail_path();

        if let Some(plug) = db.plug_by_net(head, net) {
            if tail.is_empty() {
                return Ok(Some(plug));
            }
            return self.deep_plug(db, plug.master_net, &tail);
        }

        let master = db.instance(head).master;
        let name = db.net(net).name.clone();
        let master_net = match db.net_by_name(master, &name) {
            Some(existing) if db.net(existing).is_external => existing,
            Some(_) => {
                return Err(CtsError::MissingConnection(format!(
                    "Net \"{}\" already exists as an internal net of \"{}\".",
                    name,
                    db.cell(master).name
                )));
            }
            None => {
                let created = db.create_net(master, &name)?;
                let data = db.net_mut(created);
                data.is_external = true;
                data.net_type = NetType::Clock;
                data.direction = Direction::In;
                created
            }
        };
        let plug = db.plug(head, master_net).ok_or_else(|| {
            CtsError::MissingConnection(format!(
                "Plug not created for {} on instance {} of {}",
                name,
                db.instance(head).name,
                db.cell(master).name
            ))
        })?;
        db.set_plug_net(plug, Some(net))?;
        self.add_cloned(master);

        if tail.is_empty() {
            return Ok(Some(plug));
        }
        self.deep_plug(db, master_net, &tail)
    }

    /// Depth of the partition, 0 before `build`.
    pub fn tree_depth(&self) -> usize {
        self.root.map_or(0, |root| self.node_tree_depth(root))
    }

    pub fn has_leafs(&self) -> bool {
        self.root.is_some_and(|root| self.node_has_leafs(root))
    }

    pub fn leaf_buffer_under(&self, point: Point<DbU>) -> Option<InstId> {
        self.root.map(|root| self.node_leaf_buffer_under(root, point))
    }

    pub fn add_leaf(
        &mut self,
        db: &mut Design,
        point: Point<DbU>,
        occurrence: Occurrence,
    ) -> Result<(), CtsError> {
        let root = self.root_node()?;
        self.session(db, |tree, db| tree.node_add_leaf(db, root, point, occurrence))
    }
}
