use crate::error::CtsError;
use crate::htree::HTree;
use eda_common::db::core::Design;
use eda_common::db::indices::{InstId, NetId};
use eda_common::db::occurrence::Occurrence;
use eda_common::define_index;
use eda_common::geom::dbu::DbU;
use eda_common::geom::point::Point;
use eda_common::geom::rect::{Quadrant, Rect};
use eda_router::algo::rsmt::SteinerSolver;
use eda_router::gauge::AccessFlags;
use eda_router::leaf;

define_index!(NodeId);

/// One level of the H-tree: four buffers, one per quadrant of `area`, fed by
/// `ck_net`. A node either has four children or holds the leaf lists.
#[derive(Clone, Debug)]
pub struct HTreeNode {
    pub prefix: String,
    pub area: Rect,
    pub source_buffer: InstId,
    /// Output net of `source_buffer`, input of the four buffers.
    pub ck_net: NetId,
    /// Indexed by `Quadrant::index()`.
    pub buffers: [InstId; 4],
    pub children: Option<[NodeId; 4]>,
    pub leafs: [Vec<Occurrence>; 4],
    pub pruned: bool,
}

impl HTreeNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    pub fn buffer(&self, q: Quadrant) -> InstId {
        self.buffers[q.index()]
    }
}

impl HTree {
    pub(crate) fn build_node(
        &mut self,
        db: &mut Design,
        source_buffer: InstId,
        area: Rect,
        prefix: String,
    ) -> Result<NodeId, CtsError> {
        let ck_net = self.output_net(db, source_buffer)?;

        let mut buffers = [source_buffer; 4];
        for q in Quadrant::ALL {
            let name = format!("ck_htree{}_{}_ins", prefix, q.suffix());
            let buffer = db.create_instance(self.cell, &name, self.buffer_cell)?;
            let input = self.buffer_plug(db, buffer, &self.buffer_in)?;
            db.set_plug_net(input, Some(ck_net))?;
            buffers[q.index()] = buffer;
        }
        for q in Quadrant::ALL {
            let name = format!("ck_htree{}_{}", prefix, q.suffix());
            self.create_child_net(db, buffers[q.index()], &name)?;
        }

        let id = NodeId::new(self.nodes.len());
        self.nodes.push(HTreeNode {
            prefix: prefix.clone(),
            area,
            source_buffer,
            ck_net,
            buffers,
            children: None,
            leafs: Default::default(),
            pruned: false,
        });
        log::trace!("Built node \"{}\" over {:?}", prefix, area);

        if area.half_width() >= self.min_side && area.half_height() >= self.min_side {
            let mut children = [id; 4];
            for q in Quadrant::ALL {
                let child_prefix = format!("{}_{}", prefix, q.suffix());
                children[q.index()] =
                    self.build_node(db, buffers[q.index()], area.quadrant(q), child_prefix)?;
            }
            self.nodes[id.index()].children = Some(children);
        }
        Ok(id)
    }

    pub(crate) fn node_tree_depth(&self, id: NodeId) -> usize {
        match self.nodes[id.index()].children {
            Some(children) => 1 + self.node_tree_depth(children[0]),
            None => 1,
        }
    }

    pub(crate) fn node_has_leafs(&self, id: NodeId) -> bool {
        let node = &self.nodes[id.index()];
        match node.children {
            Some(children) => children.iter().any(|&c| self.node_has_leafs(c)),
            None => node.leafs.iter().any(|l| !l.is_empty()),
        }
    }

    pub(crate) fn node_leaf_buffer_under(&self, id: NodeId, point: Point<DbU>) -> InstId {
        let node = &self.nodes[id.index()];
        let q = node.area.quadrant_of(point);
        match node.children {
            Some(children) => self.node_leaf_buffer_under(children[q.index()], point),
            None => node.buffer(q),
        }
    }

    pub(crate) fn node_add_leaf(
        &mut self,
        db: &mut Design,
        id: NodeId,
        point: Point<DbU>,
        occurrence: Occurrence,
    ) -> Result<(), CtsError> {
        let node = &self.nodes[id.index()];
        let q = node.area.quadrant_of(point);
        if let Some(children) = node.children {
            return self.node_add_leaf(db, children[q.index()], point, occurrence);
        }

        let leaf_buffer = node.buffer(q);
        let mut leaf_ck = self.output_net(db, leaf_buffer)?;
        if let Some(deep_plug) = self.deep_plug(db, leaf_ck, &occurrence.path)? {
            leaf_ck = deep_plug.master_net;
        }
        db.set_plug_net(occurrence.plug, Some(leaf_ck))?;
        log::trace!(
            "Leaf clock of <{}> set to <{}>.",
            occurrence.name(db),
            db.net(leaf_ck).name
        );
        self.nodes[id.index()].leafs[q.index()].push(occurrence);
        Ok(())
    }

    pub(crate) fn place_node(&mut self, db: &mut Design, id: NodeId) -> Result<(), CtsError> {
        let node = self.nodes[id.index()].clone();
        if node.pruned {
            return Ok(());
        }
        let x = node.area.xmin() + node.area.width() / 4;
        let y = node.area.ymin() + node.area.height() / 4;
        let hw = node.area.half_width();
        let hh = node.area.half_height();

        self.place_instance(db, node.buffer(Quadrant::BottomLeft), x, y);
        self.place_instance(db, node.buffer(Quadrant::BottomRight), x + hw, y);
        self.place_instance(db, node.buffer(Quadrant::TopLeft), x, y + hh);
        self.place_instance(db, node.buffer(Quadrant::TopRight), x + hw, y + hh);

        for q in [Quadrant::BottomLeft, Quadrant::BottomRight] {
            let pin = self.conf.rp_bb(db, node.buffer(q), &self.buffer_in)?;
            let access = self.conf.access_position(&pin, AccessFlags::empty());
            self.used_v_tracks.insert(access.x);
        }

        if let Some(children) = node.children {
            for child in children {
                self.place_node(db, child)?;
            }
        }
        Ok(())
    }

    pub(crate) fn route_node(&self, db: &mut Design, id: NodeId) -> Result<(), CtsError> {
        let node = &self.nodes[id.index()];
        if node.pruned {
            return Ok(());
        }
        let conf = &self.conf;
        let net = node.ck_net;
        let source_flags = AccessFlags::H_ACCESS | AccessFlags::OFFSET_BOTTOM1;

        let source_rp = conf.rp_by_plug_name(db, node.source_buffer, &self.buffer_out, net)?;
        let left_source = conf.rp_access(db, source_rp, source_flags)?;
        let right_source = conf.rp_access(db, source_rp, source_flags)?;
        let mut access = [left_source; 4];
        for q in Quadrant::ALL {
            access[q.index()] = conf.rp_access_by_plug_name(
                db,
                node.buffer(q),
                &self.buffer_in,
                net,
                AccessFlags::empty(),
            )?;
        }
        let [bl, br, tl, tr] = access;

        let left_source_at = db.component_position(left_source);
        let right_source_at = db.component_position(right_source);
        let bl_at = db.component_position(bl);
        let br_at = db.component_position(br);
        let tl_at = db.component_position(tl);
        let none = AccessFlags::empty();
        let left = conf.create_contact(db, net, bl_at.x, left_source_at.y, none);
        let right = conf.create_contact(db, net, br_at.x, right_source_at.y, none);

        let area = &self.area;
        let left_source_x = conf.get_nearest_vertical_track(area, left_source_at.x, none);
        let left_source_y = conf.get_nearest_horizontal_track(area, left_source_at.y, none);
        let right_source_x = conf.get_nearest_vertical_track(area, right_source_at.x, none);
        let right_source_y = conf.get_nearest_horizontal_track(area, right_source_at.y, none);
        let left_x = conf.get_nearest_vertical_track(area, bl_at.x, none);
        let right_x = conf.get_nearest_vertical_track(area, br_at.x, none);
        let tl_y = conf.get_nearest_horizontal_track(area, tl_at.y, none);
        let bl_y = conf.get_nearest_horizontal_track(area, bl_at.y, none);

        conf.set_stack_position(db, left_source, left_source_x, left_source_y)?;
        conf.set_stack_position(db, right_source, right_source_x, right_source_y)?;
        conf.set_stack_position(db, tl, left_x, tl_y)?;
        conf.set_stack_position(db, bl, left_x, bl_y)?;
        conf.set_stack_position(db, tr, right_x, tl_y)?;
        conf.set_stack_position(db, br, right_x, bl_y)?;
        db.move_contact(left, Point::new(left_x, left_source_y))?;
        db.move_contact(right, Point::new(right_x, right_source_y))?;

        conf.create_horizontal(db, left, left_source, left_source_y, none);
        conf.create_horizontal(db, right_source, right, right_source_y, none);
        conf.create_vertical(db, left, bl, left_x, none);
        conf.create_vertical(db, tl, left, left_x, none);
        conf.create_vertical(db, right, br, right_x, none);
        conf.create_vertical(db, tr, right, right_x, none);

        if let Some(children) = node.children {
            for child in children {
                self.route_node(db, child)?;
            }
        }
        Ok(())
    }

    pub(crate) fn connect_leafs_node(
        &self,
        db: &mut Design,
        id: NodeId,
        solver: &dyn SteinerSolver,
    ) -> Result<(), CtsError> {
        let node = &self.nodes[id.index()];
        if !self.node_has_leafs(id) {
            log::trace!("Node \"{}\" has no leafs.", node.prefix);
        }
        if let Some(children) = node.children {
            for child in children {
                self.connect_leafs_node(db, child, solver)?;
            }
            return Ok(());
        }
        for q in Quadrant::ALL {
            let leafs = &node.leafs[q.index()];
            if leafs.is_empty() {
                continue;
            }
            leaf::connect_leafs(
                db,
                &self.conf,
                solver,
                &self.used_v_tracks,
                node.buffer(q),
                &self.buffer_out,
                leafs,
            )?;
        }
        Ok(())
    }

    pub(crate) fn prune_node(&mut self, db: &mut Design, id: NodeId) -> Result<(), CtsError> {
        if let Some(children) = self.nodes[id.index()].children {
            for child in children {
                self.prune_node(db, child)?;
            }
        }
        let node = &self.nodes[id.index()];
        if node.pruned || self.node_has_leafs(id) {
            return Ok(());
        }
        log::debug!("Pruning node \"{}\".", node.prefix);
        let (ck_net, buffers) = (node.ck_net, node.buffers);
        db.destroy_net_components(ck_net);
        for buffer in buffers {
            self.destroy_instance(db, buffer)?;
        }
        self.nodes[id.index()].pruned = true;
        Ok(())
    }
}
