pub mod error;
pub mod htree;
pub mod node;

use crate::error::CtsError;
use crate::htree::HTree;
use eda_common::db::catalog::Catalog;
use eda_common::db::core::Design;
use eda_common::db::indices::CellId;
use eda_common::geom::dbu::from_lambda;
use eda_common::geom::rect::Rect;
use eda_common::util::config::Config;
use eda_router::algo::rsmt::Rsmt;
use eda_router::gauge::GaugeConf;

/// Full clock tree flow on `cell`: build, place, route, connect the sinks,
/// prune and save through `catalog`.
pub fn run(
    db: &mut Design,
    config: &Config,
    cell: CellId,
    catalog: &mut dyn Catalog,
) -> Result<HTree, CtsError> {
    let settings = &config.clock_tree;
    let conf = GaugeConf::from_config(config).map_err(|e| CtsError::Config(vec![e]))?;

    let area = match settings.area {
        Some([xmin, ymin, xmax, ymax]) => Rect::from_coords(
            from_lambda(xmin),
            from_lambda(ymin),
            from_lambda(xmax),
            from_lambda(ymax),
        ),
        None => db.cell(cell).abutment_box,
    };
    let clock_net = match &settings.clock_net {
        Some(name) => Some(db.net_by_name(cell, name).ok_or_else(|| {
            CtsError::NoClockNet(format!("{} (net \"{}\")", db.cell(cell).name, name))
        })?),
        None => None,
    };

    let mut tree = HTree::new(db, conf, settings, cell, clock_net, area)?;
    tree.build(db)?;
    tree.place(db)?;
    if settings.route_trunks {
        tree.route(db)?;
    } else {
        log::info!("   - Trunk routing disabled.");
    }
    tree.connect_leaf(db, &Rsmt)?;
    tree.prune(db)?;
    tree.save(db, catalog, cell)?;
    Ok(tree)
}
