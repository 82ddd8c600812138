use crate::algo::rsmt::{SteinerNodeKind, SteinerSolver, SteinerTerminal, SteinerTree};
use crate::gauge::{AccessFlags, GaugeConf};
use eda_common::db::core::{DbError, DbResult, Design};
use eda_common::db::indices::{InstId, NetId};
use eda_common::db::occurrence::Occurrence;
use eda_common::geom::dbu::DbU;
use std::collections::BTreeSet;

/// Wires the output of `leaf_buffer` to every leaf occurrence along a
/// rectilinear Steiner tree on the deep routing layers.
pub fn connect_leafs(
    db: &mut Design,
    conf: &GaugeConf,
    solver: &dyn SteinerSolver,
    used_v_tracks: &BTreeSet<DbU>,
    leaf_buffer: InstId,
    buffer_out: &str,
    leafs: &[Occurrence],
) -> DbResult<SteinerTree> {
    let plug = db
        .plug_by_name(leaf_buffer, buffer_out)
        .ok_or_else(|| DbError::UnknownPlug {
            instance: db.instance(leaf_buffer).name.clone(),
            plug: buffer_out.to_string(),
        })?;
    let leaf_ck = db.plug_net(plug).ok_or_else(|| DbError::UnconnectedPlug {
        instance: db.instance(leaf_buffer).name.clone(),
        plug: buffer_out.to_string(),
    })?;
    log::debug!(
        "Buffer <{}> has {} leafs.",
        db.instance(leaf_buffer).name,
        leafs.len()
    );

    let mut terminals = Vec::with_capacity(leafs.len() + 1);
    let buffer_rp = conf.rp_by_plug_name(db, leaf_buffer, buffer_out, leaf_ck)?;
    let center = db.component_position(buffer_rp);
    terminals.push(SteinerTerminal {
        x: center.x,
        y: conf.to_y_cell_grid(center.y),
        component: Some(buffer_rp),
    });
    for leaf in leafs {
        let rp = conf.rp_by_occurrence(db, leaf.clone(), leaf_ck);
        let center = db.component_position(rp);
        terminals.push(SteinerTerminal {
            x: center.x,
            y: conf.to_y_cell_grid(center.y),
            component: Some(rp),
        });
    }

    let name = db.net(leaf_ck).name.clone();
    let mut tree = solver.solve(&name, &terminals);
    log::trace!(
        "Steiner tree of \"{}\": {} Steiner points, length {}.",
        name,
        tree.steiner_count(),
        tree.length()
    );
    steiner_to_layout(db, conf, used_v_tracks, &mut tree, leaf_ck)?;
    Ok(tree)
}

/// Turns the abstract tree into contacts and wires of `net`. Terminal nodes
/// are replaced by their access contacts.
pub fn steiner_to_layout(
    db: &mut Design,
    conf: &GaugeConf,
    used_v_tracks: &BTreeSet<DbU>,
    tree: &mut SteinerTree,
    net: NetId,
) -> DbResult<()> {
    let deep = AccessFlags::DEEP_DEPTH;
    let deep_v_pitch = conf.vertical_pitch(deep);
    let deep_h_pitch = conf.horizontal_pitch(deep);

    for i in 0..tree.nodes.len() {
        let node = &tree.nodes[i];
        match (node.kind, node.component) {
            (SteinerNodeKind::Steiner, _) | (_, None) => {
                let mut x = node.x;
                if used_v_tracks.contains(&x) {
                    x += deep_v_pitch;
                }
                let y = node.y + conf.slice_height() / 2 - deep_h_pitch;
                log::trace!("Steiner contact of \"{}\" at ({}, {})", tree.net_name, x, y);
                let contact = conf.create_contact(db, net, x, y, deep);
                tree.nodes[i].component = Some(contact);
            }
            (SteinerNodeKind::Terminal, Some(rp)) => {
                let vertical_reach = node.edges.iter().any(|&e| {
                    let edge = &tree.edges[e];
                    !tree.is_horizontal(edge) && (edge.source == i || tree.is_vertical(edge))
                });
                let mut flags = AccessFlags::H_ACCESS | deep;
                if vertical_reach {
                    flags.remove(AccessFlags::H_ACCESS);
                }
                flags |= AccessFlags::OFFSET_TOP1;
                if used_v_tracks.contains(&node.x) {
                    flags |= AccessFlags::OFFSET_RIGHT1;
                }
                let contact = conf.rp_access(db, rp, flags)?;
                tree.nodes[i].component = Some(contact);
            }
        }
    }

    for edge in tree.edges.clone() {
        let (Some(source), Some(target)) = (
            tree.nodes[edge.source].component,
            tree.nodes[edge.target].component,
        ) else {
            continue;
        };
        let sp = db.component_position(source);
        let tp = db.component_position(target);
        if tree.is_horizontal(&edge) {
            conf.create_horizontal(db, source, target, tp.y, deep);
        } else if tree.is_vertical(&edge) {
            conf.create_vertical(db, source, target, sp.x, deep);
        } else {
            let turn = conf.create_contact(db, net, sp.x, tp.y, deep);
            conf.create_vertical(db, source, turn, sp.x, deep);
            conf.create_horizontal(db, turn, target, tp.y, deep);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::rsmt::Rsmt;
    use eda_common::db::core::{ComponentKind, Direction, NetType};
    use eda_common::db::occurrence::Path;
    use eda_common::geom::point::Point;
    use eda_common::geom::rect::Rect;
    use eda_common::geom::transform::Transformation;
    use eda_common::util::config::Config;

    /// A buffer at the origin and two registers on the same row.
    fn row_design() -> (Design, InstId, Vec<Occurrence>) {
        let mut db = Design::new();
        let buf = db.add_cell("buf_x2", Rect::from_coords(0, 0, 2000, 5000), true).unwrap();
        for (name, dir, x) in [("i", Direction::In, 400), ("q", Direction::Out, 1400)] {
            let n = db.create_net(buf, name).unwrap();
            let data = db.net_mut(n);
            data.is_external = true;
            data.direction = dir;
            data.pins.push(Rect::from_coords(x, 1000, x + 200, 4000));
        }
        let dff = db.add_cell("sff1_x4", Rect::from_coords(0, 0, 6000, 5000), true).unwrap();
        let ck = db.create_net(dff, "ck").unwrap();
        {
            let data = db.net_mut(ck);
            data.is_external = true;
            data.direction = Direction::In;
            data.net_type = NetType::Clock;
            data.pins.push(Rect::from_coords(500, 2000, 700, 3000));
        }

        let top = db.add_cell("top", Rect::from_coords(0, 0, 100_000, 100_000), false).unwrap();
        let leaf_ck = db.create_net(top, "ck_htree_bl").unwrap();
        let b = db.create_instance(top, "ck_htree_bl_ins", buf).unwrap();
        db.set_transformation(b, Transformation::translation(10_000, 20_000));
        db.set_plug_net(db.plug_by_name(b, "q").unwrap(), Some(leaf_ck)).unwrap();

        let mut leafs = Vec::new();
        for (i, x) in [30_000, 60_000].into_iter().enumerate() {
            let r = db.create_instance(top, &format!("r{}", i), dff).unwrap();
            db.set_transformation(r, Transformation::translation(x, 20_000));
            let plug = db.plug(r, ck).unwrap();
            db.set_plug_net(plug, Some(leaf_ck)).unwrap();
            leafs.push(Occurrence::new(Path::new(), plug));
        }
        (db, b, leafs)
    }

    /// Buffer and r1 on row 20000 at both ends, r0 two rows up in the middle.
    fn t_design() -> (Design, InstId, Vec<Occurrence>) {
        let (mut db, buffer, leafs) = row_design();
        db.set_transformation(leafs[0].plug.instance, Transformation::translation(30_900, 40_000));
        db.set_transformation(leafs[1].plug.instance, Transformation::translation(50_900, 20_000));
        (db, buffer, leafs)
    }

    fn contact_layer(db: &Design, contact: eda_common::db::indices::CompId) -> u8 {
        match db.component(contact).kind {
            ComponentKind::Contact { layer, .. } => layer,
            ref other => panic!("not a contact: {:?}", other),
        }
    }

    #[test]
    fn same_row_leafs_use_horizontal_wires_only() {
        let (mut db, buffer, leafs) = row_design();
        let conf = GaugeConf::from_config(&Config::default()).unwrap();
        let tree = connect_leafs(&mut db, &conf, &Rsmt, &BTreeSet::new(), buffer, "q", &leafs).unwrap();

        assert_eq!(tree.edges.len(), 2);
        assert!(tree.edges.iter().all(|e| tree.is_horizontal(e)));

        let net = db.component(tree.nodes[0].component.unwrap()).net;
        let mut horizontals = 0;
        let mut corners = 0;
        for &c in &db.net(net).components {
            match db.component(c).kind {
                ComponentKind::Horizontal { layer, .. } => {
                    assert_eq!(layer, conf.horizontal_deep_depth);
                    horizontals += 1;
                }
                ComponentKind::Vertical { source, .. } => {
                    // Only pad stubs are vertical.
                    assert!(matches!(db.component(source).kind, ComponentKind::RoutingPad { .. }));
                }
                ComponentKind::Contact { .. } => corners += 1,
                ComponentKind::RoutingPad { .. } => {}
            }
        }
        assert_eq!(horizontals, 2);
        assert_eq!(corners, 3);
        assert!(eda_common::util::check::check_opens(&db, &[net]).is_ok());
    }

    #[test]
    fn used_track_shifts_terminal_access_right() {
        let (mut db, buffer, leafs) = row_design();
        let conf = GaugeConf::from_config(&Config::default()).unwrap();
        let first = db.occurrence_bbox(&leafs[0]).center().x;
        let used: BTreeSet<DbU> = [first].into_iter().collect();
        let tree = connect_leafs(&mut db, &conf, &Rsmt, &used, buffer, "q", &leafs).unwrap();
        let access = db.component_position(tree.nodes[1].component.unwrap());
        assert_eq!(access.x, first + conf.vertical_pitch(AccessFlags::DEEP_DEPTH));
    }

    #[test]
    fn diagonal_edge_gets_a_turn_contact() {
        let (mut db, buffer, mut leafs) = row_design();
        leafs.truncate(1);
        let r0 = leafs[0].plug.instance;
        db.set_transformation(r0, Transformation::translation(30_000, 40_000));
        let conf = GaugeConf::from_config(&Config::default()).unwrap();
        let tree = connect_leafs(&mut db, &conf, &Rsmt, &BTreeSet::new(), buffer, "q", &leafs).unwrap();
        assert_eq!(tree.edges.len(), 1);
        let e = tree.edges[0];
        assert!(!tree.is_horizontal(&e) && !tree.is_vertical(&e));

        let source = db.component_position(tree.nodes[e.source].component.unwrap());
        let target = db.component_position(tree.nodes[e.target].component.unwrap());
        let net = db.component(tree.nodes[0].component.unwrap()).net;
        let turn = db.net(net).components.iter().copied().find(|&c| {
            matches!(db.component(c).kind, ComponentKind::Contact { .. })
                && db.component_position(c) == eda_common::geom::point::Point::new(source.x, target.y)
        });
        assert!(turn.is_some());
        assert!(eda_common::util::check::check_opens(&db, &[net]).is_ok());
    }

    #[test]
    fn steiner_contact_sits_below_the_row_middle() {
        let (mut db, buffer, leafs) = t_design();
        let conf = GaugeConf::from_config(&Config::default()).unwrap();
        let tree = connect_leafs(&mut db, &conf, &Rsmt, &BTreeSet::new(), buffer, "q", &leafs).unwrap();
        assert_eq!(tree.steiner_count(), 1);
        let steiner = &tree.nodes[3];
        assert_eq!((steiner.x, steiner.y), (31_500, 20_000));

        let contact = steiner.component.unwrap();
        let deep_h_pitch = conf.horizontal_pitch(AccessFlags::DEEP_DEPTH);
        assert_eq!(
            db.component_position(contact),
            Point::new(31_500, 20_000 + conf.slice_height() / 2 - deep_h_pitch)
        );
        let net = db.component(contact).net;
        assert!(eda_common::util::check::check_opens(&db, &[net]).is_ok());
    }

    #[test]
    fn steiner_contact_moves_off_a_used_track() {
        let (mut db, buffer, leafs) = t_design();
        let conf = GaugeConf::from_config(&Config::default()).unwrap();
        let used: BTreeSet<DbU> = [31_500].into_iter().collect();
        let tree = connect_leafs(&mut db, &conf, &Rsmt, &used, buffer, "q", &leafs).unwrap();
        let contact = tree.nodes[3].component.unwrap();
        assert_eq!(db.component_position(contact), Point::new(32_500, 22_000));
        let net = db.component(contact).net;
        assert!(eda_common::util::check::check_opens(&db, &[net]).is_ok());
    }

    #[test]
    fn vertical_edge_drops_horizontal_access() {
        let (mut db, buffer, leafs) = t_design();
        let conf = GaugeConf::from_config(&Config::default()).unwrap();
        let tree = connect_leafs(&mut db, &conf, &Rsmt, &BTreeSet::new(), buffer, "q", &leafs).unwrap();

        // r0 hangs from the Steiner point by a vertical edge, r1 and the
        // buffer are reached horizontally.
        let top = tree.nodes[1].component.unwrap();
        let side = tree.nodes[2].component.unwrap();
        let source = tree.nodes[0].component.unwrap();
        assert_eq!(contact_layer(&db, top), conf.vertical_deep_depth);
        assert_eq!(contact_layer(&db, side), conf.horizontal_deep_depth);
        assert_eq!(contact_layer(&db, source), conf.horizontal_deep_depth);
    }
}
