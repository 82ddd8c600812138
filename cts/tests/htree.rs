use eda_common::db::catalog::{FileCatalog, MemoryCatalog, Views};
use eda_common::db::core::{Design, Direction, NetType, PlacementStatus};
use eda_common::db::indices::{CellId, NetId};
use eda_common::db::occurrence::{Occurrence, Path};
use eda_common::geom::dbu::from_lambda;
use eda_common::geom::point::Point;
use eda_common::geom::rect::Rect;
use eda_common::geom::transform::{Orientation, Transformation};
use eda_common::util::check;
use eda_common::util::config::Config;
use eda_common::util::message::Severity;
use eda_cts::error::CtsError;
use eda_cts::htree::HTree;
use eda_router::algo::rsmt::Rsmt;
use eda_router::gauge::GaugeConf;

fn pin(db: &mut Design, cell: CellId, name: &str, direction: Direction, rect: Option<Rect>) -> NetId {
    let net = db.create_net(cell, name).unwrap();
    let data = db.net_mut(net);
    data.is_external = true;
    data.direction = direction;
    if let Some(rect) = rect {
        data.pins.push(rect);
    }
    net
}

/// buf_x2 (20 x 50), rowend_x0 (5 x 50) and sff1_x4 (60 x 50).
fn library(db: &mut Design) {
    let buf = db.add_cell("buf_x2", Rect::from_coords(0, 0, 2000, 5000), true).unwrap();
    pin(db, buf, "i", Direction::In, Some(Rect::from_coords(400, 1000, 600, 4000)));
    pin(db, buf, "q", Direction::Out, Some(Rect::from_coords(1400, 1000, 1600, 4000)));
    let vdd = pin(db, buf, "vdd", Direction::In, None);
    db.net_mut(vdd).is_global = true;

    db.add_cell("rowend_x0", Rect::from_coords(0, 0, 500, 5000), true).unwrap();

    let dff = db.add_cell("sff1_x4", Rect::from_coords(0, 0, 6000, 5000), true).unwrap();
    let ck = pin(db, dff, "ck", Direction::In, Some(Rect::from_coords(500, 2000, 700, 3000)));
    db.net_mut(ck).net_type = NetType::Clock;
    pin(db, dff, "q", Direction::Out, Some(Rect::from_coords(5000, 2000, 5200, 3000)));
}

fn square_design(side: f64, with_clock: bool) -> (Design, CellId, Option<NetId>) {
    let mut db = Design::new();
    library(&mut db);
    let s = from_lambda(side);
    let top = db.add_cell("top", Rect::from_coords(0, 0, s, s), false).unwrap();
    let ck = with_clock.then(|| {
        let ck = db.create_net(top, "ck").unwrap();
        db.net_mut(ck).net_type = NetType::Clock;
        ck
    });
    (db, top, ck)
}

fn add_register(db: &mut Design, owner: CellId, name: &str, x: i64, y: i64, ck: NetId) -> Occurrence {
    let dff = db.cell_by_name("sff1_x4").unwrap();
    let master_ck = db.net_by_name(dff, "ck").unwrap();
    let reg = db.create_instance(owner, name, dff).unwrap();
    db.set_transformation(reg, Transformation::translation(x, y));
    db.set_placement_status(reg, PlacementStatus::Placed);
    let plug = db.plug(reg, master_ck).unwrap();
    db.set_plug_net(plug, Some(ck)).unwrap();
    Occurrence::new(Path::new(), plug)
}

fn config(minimum_side: f64) -> Config {
    let mut config = Config::default();
    config.clock_tree.minimum_side = minimum_side;
    config
}

fn new_tree(db: &mut Design, config: &Config, top: CellId) -> Result<HTree, CtsError> {
    let conf = GaugeConf::from_config(config).unwrap();
    let area = db.cell(top).abutment_box;
    HTree::new(db, conf, &config.clock_tree, top, None, area)
}

fn count_prefixed(db: &Design, cell: CellId, prefix: &str) -> usize {
    db.cell(cell)
        .instances
        .iter()
        .filter(|&&i| db.instance(i).name.starts_with(prefix))
        .count()
}

#[test]
fn thousand_lambda_square_builds_three_levels() {
    let (mut db, top, _) = square_design(1000.0, true);
    let mut tree = new_tree(&mut db, &config(200.0), top).unwrap();
    tree.build(&mut db).unwrap();

    assert_eq!(tree.tree_depth(), 3);
    assert_eq!(tree.nodes().len(), 21);
    assert_eq!(count_prefixed(&db, top, "ck_htree"), 85);
    assert!(db.instance_by_name(top, "ck_htree_bl_tr_br_ins").is_some());
    let leaf_net = db.net_by_name(top, "ck_htree_tr_tr_tr").unwrap();
    assert_eq!(db.net(leaf_net).net_type, NetType::Clock);

    let root = tree.node(tree.root().unwrap());
    assert_eq!(root.prefix, "");
    let children = root.children.unwrap();
    assert_eq!(tree.node(children[1]).area, Rect::from_coords(50_000, 0, 100_000, 50_000));
    let grandchild = tree.node(tree.node(children[0]).children.unwrap()[0]);
    assert!(grandchild.is_leaf());
    assert_eq!(grandchild.prefix, "_bl_bl");
}

#[test]
fn subdivision_stops_below_twice_the_minimum_side() {
    let (mut db, top, _) = square_design(400.0, true);
    let mut tree = new_tree(&mut db, &config(200.0), top).unwrap();
    tree.build(&mut db).unwrap();
    assert_eq!(tree.tree_depth(), 2);

    let (mut db, top, _) = square_design(398.0, true);
    let mut tree = new_tree(&mut db, &config(200.0), top).unwrap();
    assert_eq!(tree.tree_depth(), 0);
    tree.build(&mut db).unwrap();
    assert_eq!(tree.tree_depth(), 1);
    assert_eq!(count_prefixed(&db, top, "ck_htree"), 5);
}

#[test]
fn disproportionate_area_is_rejected_without_edits() {
    let (mut db, top, ck) = square_design(2000.0, true);
    let conf = GaugeConf::from_config(&Config::default()).unwrap();
    let area = Rect::from_coords(0, 0, from_lambda(2000.0), from_lambda(1000.0));
    let err = HTree::new(&mut db, conf, &config(200.0).clock_tree, top, ck, area)
        .err()
        .unwrap();
    assert!(matches!(err, CtsError::InvalidRegion(_)));
    assert!(err.to_string().contains("disproportionate"));
    assert!(db.cell(top).instances.is_empty());
    assert!(db.net_by_name(top, "ck_htree").is_none());
}

#[test]
fn configuration_errors_are_fatal() {
    let (mut db, top, _) = square_design(1000.0, true);
    let err = new_tree(&mut db, &config(50.0), top).err().unwrap();
    assert!(matches!(err, CtsError::Config(_)));

    let mut missing_buffer = config(200.0);
    missing_buffer.clock_tree.buffer = "buf_x9".to_string();
    let err = new_tree(&mut db, &missing_buffer, top).err().unwrap();
    let msg = err.message();
    assert_eq!(msg.severity, Severity::Fatal);
    assert_eq!(msg.lines.len(), 2);
    assert!(msg.lines[0].contains("buf_x9"));

    db.add_cell("tie_x7", Rect::from_coords(0, 0, 700, 5000), true).unwrap();
    let mut odd_tie = config(200.0);
    odd_tie.clock_tree.tie_cell = "tie_x7".to_string();
    let err = new_tree(&mut db, &odd_tie, top).err().unwrap();
    assert!(matches!(err, CtsError::Config(_)));
    assert!(err.to_string().contains("multiple"));

    assert!(db.cell(top).instances.is_empty());
}

#[test]
fn missing_clock_net_is_reported() {
    let (mut db, top, _) = square_design(1000.0, false);
    let err = new_tree(&mut db, &config(200.0), top).err().unwrap();
    assert!(matches!(err, CtsError::NoClockNet(ref cell) if cell == "top"));
}

#[test]
fn stages_require_a_built_tree() {
    let (mut db, top, ck) = square_design(1000.0, true);
    let occ = add_register(&mut db, top, "r0", 3000, 5000, ck.unwrap());
    let mut tree = new_tree(&mut db, &config(200.0), top).unwrap();
    assert!(tree.leaf_buffer_under(Point::new(0, 0)).is_none());
    assert!(matches!(tree.place(&mut db), Err(CtsError::NotBuilt(_))));
    assert!(matches!(
        tree.add_leaf(&mut db, Point::new(3600, 7500), occ),
        Err(CtsError::NotBuilt(_))
    ));
}

#[test]
fn leaf_goes_to_the_buffer_under_its_point() {
    let (mut db, top, ck) = square_design(1000.0, true);
    let occ = add_register(&mut db, top, "r0", 3000, 5000, ck.unwrap());
    let mut tree = new_tree(&mut db, &config(200.0), top).unwrap();
    tree.build(&mut db).unwrap();

    let point = db.occurrence_bbox(&occ).center();
    assert_eq!(point, Point::new(3600, 7500));
    tree.add_leaf(&mut db, point, occ.clone()).unwrap();

    let buffer = db.instance_by_name(top, "ck_htree_bl_bl_bl_ins").unwrap();
    assert_eq!(tree.leaf_buffer_under(point), Some(buffer));
    let leaf_ck = db.net_by_name(top, "ck_htree_bl_bl_bl").unwrap();
    assert_eq!(db.plug_net(occ.plug), Some(leaf_ck));
    assert!(tree.has_leafs());
    assert_eq!(tree.leafs().count(), 1);

    // Outside the area everything falls into the top-right chain.
    let far = db.instance_by_name(top, "ck_htree_tr_tr_tr_ins").unwrap();
    assert_eq!(tree.leaf_buffer_under(Point::new(-1, 500_000)), Some(far));
}

#[test]
fn placement_mirrors_odd_rows() {
    let (mut db, top, _) = square_design(1000.0, true);
    let mut tree = new_tree(&mut db, &config(200.0), top).unwrap();
    tree.build(&mut db).unwrap();
    tree.place(&mut db).unwrap();

    let top_buffer = db.instance(tree.top_buffer());
    assert_eq!(
        top_buffer.transformation,
        Transformation::new(50_000, 50_000, Orientation::Id)
    );
    assert_eq!(top_buffer.status, PlacementStatus::Fixed);
    assert!(tree.used_v_tracks().contains(&50_500));

    let bl = db.instance_by_name(top, "ck_htree_bl_ins").unwrap();
    assert_eq!(
        db.instance(bl).transformation,
        Transformation::new(25_000, 30_000, Orientation::My)
    );
    let bl_bl = db.instance_by_name(top, "ck_htree_bl_bl_ins").unwrap();
    assert_eq!(
        db.instance(bl_bl).transformation,
        Transformation::new(12_500, 10_000, Orientation::Id)
    );

    let buffers = check::run_placement_check(&db, top, &["ck_htree"]);
    assert!(buffers.is_ok());
}

#[test]
fn trunks_are_connected_after_route() {
    let (mut db, top, _) = square_design(1000.0, true);
    let mut tree = new_tree(&mut db, &config(200.0), top).unwrap();
    tree.build(&mut db).unwrap();
    tree.place(&mut db).unwrap();
    tree.route(&mut db).unwrap();

    let root_net = tree.node(tree.root().unwrap()).ck_net;
    assert_eq!(db.net(root_net).name, "ck_htree");
    // One source pad and four child pads.
    let pads = db
        .net(root_net)
        .components
        .iter()
        .filter(|&&c| {
            matches!(
                db.component(c).kind,
                eda_common::db::core::ComponentKind::RoutingPad { .. }
            )
        })
        .count();
    assert_eq!(pads, 5);
    assert!(check::check_opens(&db, &tree.clock_nets(&db)).is_ok());
}

#[test]
fn flat_flow_drives_every_register() {
    let (mut db, top, ck) = square_design(1000.0, true);
    let ck = ck.unwrap();
    let positions = [
        (3_000, 5_000),
        (9_000, 15_000),
        (40_000, 20_000),
        (70_000, 80_000),
        (85_000, 90_000),
        (60_000, 35_000),
    ];
    let sinks: Vec<Occurrence> = positions
        .iter()
        .enumerate()
        .map(|(i, &(x, y))| add_register(&mut db, top, &format!("r{}", i), x, y, ck))
        .collect();

    // A driver on the master clock is not a sink.
    let buf = db.cell_by_name("buf_x2").unwrap();
    let source = db.create_instance(top, "ck_src", buf).unwrap();
    let q = db.plug_by_name(source, "q").unwrap();
    db.set_plug_net(q, Some(ck)).unwrap();

    let mut tree = new_tree(&mut db, &config(200.0), top).unwrap();
    assert_eq!(tree.master_clock(), ck);
    tree.build(&mut db).unwrap();
    tree.place(&mut db).unwrap();
    tree.route(&mut db).unwrap();
    tree.connect_leaf(&mut db, &Rsmt).unwrap();
    tree.prune(&mut db).unwrap();

    assert_eq!(tree.leafs().count(), sinks.len());
    assert_eq!(db.plug_net(q), Some(ck));
    let input = db.plug_by_name(tree.top_buffer(), "i").unwrap();
    assert_eq!(db.plug_net(input), Some(ck));

    for sink in &sinks {
        let chain = check::trace_driver_chain(&db, sink, ck).unwrap();
        assert_eq!(chain.len(), tree.tree_depth() + 1);
        assert_eq!(chain.last(), Some(&tree.top_buffer()));
    }
    assert!(check::run(&db, &tree.clock_nets(&db), &sinks, ck).is_ok());
    assert!(check::run_placement_check(&db, top, &["ck_htree", "htree_feed_"]).is_ok());
}

#[test]
fn prune_backfills_with_ties_and_is_idempotent() {
    let (mut db, top, ck) = square_design(1000.0, true);
    add_register(&mut db, top, "r0", 3000, 5000, ck.unwrap());
    let mut tree = new_tree(&mut db, &config(200.0), top).unwrap();
    tree.build(&mut db).unwrap();
    tree.place(&mut db).unwrap();
    tree.route(&mut db).unwrap();
    tree.connect_leaf(&mut db, &Rsmt).unwrap();

    let destroyed = db.instance_by_name(top, "ck_htree_tr_bl_ins").unwrap();
    let at = db.instance(destroyed).transformation;
    tree.prune(&mut db).unwrap();

    // Only root, _bl and _bl_bl keep their buffers.
    assert_eq!(tree.nodes().iter().filter(|n| n.pruned).count(), 18);
    assert_eq!(count_prefixed(&db, top, "ck_htree"), 13);
    assert_eq!(count_prefixed(&db, top, "htree_feed_"), 18 * 4 * 4);
    assert!(db.instance_by_name(top, "ck_htree_tr_bl_ins").is_none());
    assert!(db.instance_by_name(top, "ck_htree_tr_ins").is_some());
    assert!(db.instance_by_name(top, "htree_feed_1").is_some());
    assert!(db.net(db.net_by_name(top, "ck_htree_tr").unwrap()).components.is_empty());

    let feeds: Vec<_> = db
        .cell(top)
        .instances
        .iter()
        .map(|&i| db.instance(i))
        .filter(|i| i.name.starts_with("htree_feed_") && i.transformation.ty == at.ty)
        .filter(|i| (at.tx..at.tx + 2000).contains(&i.transformation.tx))
        .collect();
    assert_eq!(feeds.len(), 4);
    for feed in feeds {
        assert_eq!(feed.status, PlacementStatus::Placed);
        assert_eq!(feed.transformation.orientation, at.orientation);
    }

    let count = db.cell(top).instances.len();
    tree.prune(&mut db).unwrap();
    assert_eq!(db.cell(top).instances.len(), count);
    assert!(db.instance_by_name(top, &format!("htree_feed_{}", 18 * 16 + 1)).is_none());
}

/// Top with one flat register and a `block_0` instance holding two more.
fn hierarchical_design() -> (Design, CellId, CellId, NetId, Vec<Occurrence>) {
    let (mut db, top, ck) = square_design(1000.0, true);
    let ck = ck.unwrap();
    let block = db
        .add_cell("block_0", Rect::from_coords(0, 0, 30_000, 10_000), false)
        .unwrap();
    let block_ck = pin(&mut db, block, "ck", Direction::In, None);
    db.net_mut(block_ck).net_type = NetType::Clock;
    let r0 = add_register(&mut db, block, "reg_0", 0, 0, block_ck);
    let r1 = add_register(&mut db, block, "reg_1", 20_000, 0, block_ck);

    let blk = db.create_instance(top, "blk_0", block).unwrap();
    db.set_transformation(blk, Transformation::translation(10_000, 10_000));
    db.set_placement_status(blk, PlacementStatus::Placed);
    db.set_plug_net(db.plug(blk, block_ck).unwrap(), Some(ck)).unwrap();

    let path = Path::from_instances(vec![blk]);
    let mut sinks = vec![
        Occurrence::new(path.clone(), r0.plug),
        Occurrence::new(path, r1.plug),
    ];
    sinks.push(add_register(&mut db, top, "r_0", 70_000, 70_000, ck));
    (db, top, block, ck, sinks)
}

#[test]
fn deep_plugs_bring_leaf_clocks_into_blocks() {
    let (mut db, top, block, ck, sinks) = hierarchical_design();
    assert_eq!(db.terminal_plug_occurrences(ck).len(), 3);

    let mut catalog = MemoryCatalog::default();
    let tree = eda_cts::run(&mut db, &config(200.0), top, &mut catalog).unwrap();

    assert_eq!(tree.cloneds(), &[top, block]);
    assert_eq!(db.cell(top).name, "top_cts");
    assert_eq!(db.cell(block).name, "block_0_cts");
    for name in ["ck_htree_bl_bl_bl", "ck_htree_bl_br_bl"] {
        let net = db.net_by_name(block, name).unwrap();
        assert!(db.net(net).is_external);
        assert_eq!(db.net(net).direction, Direction::In);
    }
    assert_eq!(
        catalog.saved,
        vec![
            ("top_cts".to_string(), Views::ALL),
            ("block_0_cts".to_string(), Views::ALL),
        ]
    );
    for sink in &sinks {
        assert!(check::trace_driver_chain(&db, sink, ck).is_ok());
    }
    assert!(check::run(&db, &tree.clock_nets(&db), &sinks, ck).is_ok());
}

#[test]
fn deep_plug_reuses_and_rejects_names() {
    let (mut db, top, block, _, _) = hierarchical_design();
    let mut tree = new_tree(&mut db, &config(200.0), top).unwrap();
    let ck_htree = db.net_by_name(top, "ck_htree").unwrap();
    let blk = db.instance_by_name(top, "blk_0").unwrap();

    assert!(tree.add_deep_plug(&mut db, ck_htree, &Path::new()).unwrap().is_none());

    let internal = db.create_net(block, "ck_htree").unwrap();
    let path = Path::from_instances(vec![blk]);
    let err = tree.add_deep_plug(&mut db, ck_htree, &path).unwrap_err();
    assert!(matches!(err, CtsError::MissingConnection(_)));
    assert_eq!(err.message().severity, Severity::Fatal);

    db.net_mut(internal).is_external = true;
    let plug = tree.add_deep_plug(&mut db, ck_htree, &path).unwrap().unwrap();
    assert_eq!(plug.master_net, internal);
    assert_eq!(db.plug_net(plug), Some(ck_htree));
    assert_eq!(tree.cloneds(), &[top, block]);

    let again = tree.add_deep_plug(&mut db, ck_htree, &path).unwrap();
    assert_eq!(again, Some(plug));
    assert_eq!(tree.cloneds().len(), 2);
}

#[test]
fn failed_leaf_connection_leaves_tree_and_design_untouched() {
    let (mut db, top, block, ck, _) = hierarchical_design();
    db.create_net(block, "ck_htree_bl_br_bl").unwrap();
    let mut tree = new_tree(&mut db, &config(200.0), top).unwrap();
    tree.build(&mut db).unwrap();
    tree.place(&mut db).unwrap();

    let err = tree.connect_leaf(&mut db, &Rsmt).unwrap_err();
    assert!(matches!(err, CtsError::MissingConnection(_)));
    assert_eq!(tree.leafs().count(), 0);
    assert!(!tree.has_leafs());
    assert_eq!(tree.cloneds(), &[top]);
    assert!(db.net_by_name(block, "ck_htree_bl_bl_bl").is_none());
    assert_eq!(db.terminal_plug_occurrences(ck).len(), 3);

    let mut catalog = MemoryCatalog::default();
    tree.save(&mut db, &mut catalog, top).unwrap();
    assert_eq!(db.cell(block).name, "block_0");
    assert_eq!(
        catalog.saved,
        vec![
            ("top_cts".to_string(), Views::ALL),
            ("block_0".to_string(), Views::PHYSICAL),
        ]
    );
}

#[test]
fn file_catalog_writes_both_views() {
    let (mut db, top, ck) = square_design(1000.0, true);
    add_register(&mut db, top, "r0", 3000, 5000, ck.unwrap());
    let dir = tempfile::tempdir().unwrap();
    let mut catalog = FileCatalog::new(dir.path()).unwrap();
    eda_cts::run(&mut db, &config(200.0), top, &mut catalog).unwrap();

    let def = std::fs::read_to_string(dir.path().join("top_cts.def")).unwrap();
    assert!(def.contains("ck_htree_bl_bl_bl_ins"));
    assert!(dir.path().join("top_cts.v").exists());
    assert!(!dir.path().join("sff1_x4.def").exists());
}
