use crate::db::core::{ComponentKind, Design, Direction, PlacementStatus};
use crate::db::indices::{CellId, CompId, InstId, NetId};
use crate::db::occurrence::Occurrence;
use crate::geom::rtree::SpatialIndex;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

const MAX_CHAIN_LENGTH: usize = 64;

/// Instances whose name starts with one of `prefixes` must lie inside the cell
/// abutment box and must not overlap each other.
pub fn run_placement_check(db: &Design, cell: CellId, prefixes: &[&str]) -> Result<(), String> {
    log::info!("Starting Placement Verification...");
    let ab = db.cell(cell).abutment_box;

    let selected: Vec<InstId> = db
        .cell(cell)
        .instances
        .iter()
        .copied()
        .filter(|&i| {
            let inst = db.instance(i);
            inst.status != PlacementStatus::Unplaced
                && prefixes.iter().any(|p| inst.name.starts_with(p))
        })
        .collect();

    let index = SpatialIndex::bulk_load(
        selected
            .iter()
            .enumerate()
            .map(|(slot, &inst)| (db.instance_box(inst), slot)),
    );

    let valid = AtomicBool::new(true);
    selected.par_iter().enumerate().for_each(|(slot, &inst)| {
        let r = db.instance_box(inst);
        if !ab.contains_rect(&r) {
            log::error!("FAIL: Instance '{}' out of bounds.", db.instance(inst).name);
            valid.store(false, Ordering::Relaxed);
        }
        for other in index.query_overlapping(&r) {
            if other > slot {
                log::error!(
                    "FAIL: Instance Overlap '{}' and '{}'",
                    db.instance(inst).name,
                    db.instance(selected[other]).name
                );
                valid.store(false, Ordering::Relaxed);
            }
        }
    });

    if valid.load(Ordering::Relaxed) {
        log::info!("\x1b[32mPASS\x1b[0m: Placement is valid ({} instances).", selected.len());
        Ok(())
    } else {
        Err("Placement verification failed.".to_string())
    }
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        parent[ra] = rb;
    }
}

/// Every net with two or more routing pads must join them through its wires.
pub fn check_opens(db: &Design, nets: &[NetId]) -> Result<(), String> {
    let error_found = AtomicBool::new(false);
    let error_msg = Arc::new(Mutex::new(String::new()));

    nets.par_iter().for_each(|&net_id| {
        if error_found.load(Ordering::Relaxed) {
            return;
        }
        let net = db.net(net_id);
        let alive: Vec<CompId> = net
            .components
            .iter()
            .copied()
            .filter(|&c| db.component(c).alive)
            .collect();
        let slot: HashMap<CompId, usize> = alive.iter().enumerate().map(|(i, &c)| (c, i)).collect();

        let pads: Vec<usize> = alive
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(db.component(**c).kind, ComponentKind::RoutingPad { .. }))
            .map(|(i, _)| i)
            .collect();
        if pads.len() < 2 {
            return;
        }

        let mut parent: Vec<usize> = (0..alive.len()).collect();
        let mut wires = 0;
        for (i, &c) in alive.iter().enumerate() {
            let (source, target) = match db.component(c).kind {
                ComponentKind::Horizontal { source, target, .. }
                | ComponentKind::Vertical { source, target, .. } => (source, target),
                _ => continue,
            };
            wires += 1;
            for end in [source, target] {
                if let Some(&j) = slot.get(&end) {
                    union(&mut parent, i, j);
                }
            }
        }

        let msg = if wires == 0 {
            Some(format!("Net '{}': Unrouted (No segments)", net.name))
        } else {
            let root = find(&mut parent, pads[0]);
            pads.iter()
                .any(|&p| find(&mut parent, p) != root)
                .then(|| format!("Net '{}': Broken connectivity (Split net).", net.name))
        };
        if let Some(msg) = msg
            && !error_found.swap(true, Ordering::Relaxed)
        {
            *error_msg.lock().unwrap() = msg;
        }
    });

    if error_found.load(Ordering::Relaxed) {
        Err(error_msg.lock().unwrap().clone())
    } else {
        Ok(())
    }
}

/// Walks from a sink up to `root` through single-driver nets and returns the
/// driving instances, closest first.
pub fn trace_driver_chain(db: &Design, sink: &Occurrence, root: NetId) -> Result<Vec<InstId>, String> {
    let mut net = db
        .top_net_of(sink)
        .ok_or_else(|| format!("Sink '{}' is not connected to the top cell.", sink.name(db)))?;
    let mut chain = Vec::new();
    while net != root {
        if chain.len() >= MAX_CHAIN_LENGTH {
            return Err(format!("Sink '{}': driver chain too long.", sink.name(db)));
        }
        let drivers = db.net_drivers(net);
        if drivers.len() != 1 {
            return Err(format!(
                "Net '{}' has {} drivers, expected exactly one.",
                db.net(net).name,
                drivers.len()
            ));
        }
        let driver = drivers[0].instance;
        let master = db.instance(driver).master;
        let input = db
            .cell(master)
            .nets
            .iter()
            .copied()
            .find(|&n| {
                let data = db.net(n);
                data.is_external && !data.is_global && data.direction == Direction::In
            })
            .and_then(|n| db.plug(driver, n))
            .and_then(|p| db.plug_net(p))
            .ok_or_else(|| format!("Driver '{}' has no connected input.", db.instance(driver).name))?;
        chain.push(driver);
        net = input;
    }
    Ok(chain)
}

pub fn run(db: &Design, clock_nets: &[NetId], sinks: &[Occurrence], root: NetId) -> Result<(), String> {
    log::info!("Starting Clock Tree Verification");

    let (opens_result, chains_result) = rayon::join(
        || check_opens(db, clock_nets),
        || {
            sinks
                .par_iter()
                .map(|s| trace_driver_chain(db, s, root).map(|_| ()))
                .collect::<Result<Vec<()>, String>>()
        },
    );

    let mut msgs = Vec::new();
    match opens_result {
        Err(e) => {
            log::error!("\x1b[31mFAIL\x1b[0m: Open Net (Disconnected) Detected");
            log::error!("{}", e);
            msgs.push(e);
        }
        Ok(_) => log::info!("\x1b[32mPASS\x1b[0m: All clock nets are fully connected."),
    }
    match chains_result {
        Err(e) => {
            log::error!("\x1b[31mFAIL\x1b[0m: Sink Not Driven By The Tree");
            log::error!("{}", e);
            msgs.push(e);
        }
        Ok(_) => log::info!(
            "\x1b[32mPASS\x1b[0m: {} sinks reach the master clock through one buffer chain.",
            sinks.len()
        ),
    }

    if msgs.is_empty() {
        log::info!("\x1b[32mSUCCESS\x1b[0m: VALID CLOCK TREE");
        Ok(())
    } else {
        log::error!(
            "\x1b[31mFAILURE\x1b[0m: INVALID CLOCK TREE ({} Errors)",
            msgs.len()
        );
        Err(msgs.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::occurrence::Path;
    use crate::geom::point::Point;
    use crate::geom::rect::Rect;
    use crate::geom::transform::Transformation;

    fn pad_design() -> (Design, NetId, CompId, CompId) {
        let mut db = Design::new();
        let lib = db.add_cell("buf", Rect::from_coords(0, 0, 100, 100), true).unwrap();
        let a = db.create_net(lib, "a").unwrap();
        db.net_mut(a).is_external = true;
        db.net_mut(a).pins.push(Rect::from_coords(10, 10, 20, 20));
        let top = db.add_cell("top", Rect::from_coords(0, 0, 1000, 1000), false).unwrap();
        let net = db.create_net(top, "n").unwrap();
        let i0 = db.create_instance(top, "i0", lib).unwrap();
        let i1 = db.create_instance(top, "i1", lib).unwrap();
        db.set_transformation(i1, Transformation::translation(500, 0));
        let p0 = db.create_routing_pad(net, Occurrence::new(Path::new(), db.plug(i0, a).unwrap()));
        let p1 = db.create_routing_pad(net, Occurrence::new(Path::new(), db.plug(i1, a).unwrap()));
        (db, net, p0, p1)
    }

    #[test]
    fn detects_unrouted_and_split_nets() {
        let (mut db, net, p0, p1) = pad_design();
        assert!(check_opens(&db, &[net]).unwrap_err().contains("Unrouted"));

        let c = db.create_contact(net, Point::new(15, 15), 1);
        db.create_vertical(p0, c, 15, 1);
        assert!(check_opens(&db, &[net]).unwrap_err().contains("Split"));

        db.create_horizontal(c, p1, 15, 1);
        assert!(check_opens(&db, &[net]).is_ok());
    }

    #[test]
    fn overlapping_instances_fail_placement_check() {
        let (mut db, ..) = pad_design();
        let top = db.cell_by_name("top").unwrap();
        for name in ["i0", "i1"] {
            let i = db.instance_by_name(top, name).unwrap();
            db.set_placement_status(i, PlacementStatus::Placed);
        }
        assert!(run_placement_check(&db, top, &["i"]).is_ok());
        let i1 = db.instance_by_name(top, "i1").unwrap();
        db.set_transformation(i1, Transformation::translation(50, 50));
        assert!(run_placement_check(&db, top, &["i"]).is_err());
    }
}
