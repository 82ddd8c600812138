use crate::db::core::{ComponentKind, Design};
use crate::db::indices::CellId;
use crate::geom::dbu::DbU;
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect as ImageRect;
use std::path::Path;

const LAYER_COLORS: [Rgba<u8>; 6] = [
    // M1 (Vertical): Blue
    Rgba([0, 110, 255, 90]),
    // M2 (Horizontal): Red
    Rgba([255, 20, 80, 160]),
    // M3 (Vertical): Green
    Rgba([0, 255, 100, 170]),
    // M4 (Horizontal): Gold
    Rgba([255, 215, 0, 170]),
    // M5 (Vertical): Violet
    Rgba([180, 50, 255, 190]),
    // M6 (Horizontal): Cyan
    Rgba([0, 240, 255, 190]),
];

/// Renders the instances of `cell` and the wiring of its nets.
/// Tree buffers are drawn in orange, fillers in grey.
pub fn draw_clock_tree(
    db: &Design,
    cell: CellId,
    filename: &str,
    width: u32,
    height: u32,
) -> image::ImageResult<()> {
    let mut img = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]));

    let ab = db.cell(cell).abutment_box;
    if ab.is_empty() {
        return img.save(Path::new(filename));
    }

    let scale_x = width as f64 / ab.width() as f64;
    let scale_y = height as f64 / ab.height() as f64;
    let map = |x: DbU, y: DbU| {
        (
            (x - ab.xmin()) as f64 * scale_x,
            height as f64 - (y - ab.ymin()) as f64 * scale_y,
        )
    };

    let data = db.cell(cell);
    for &inst in &data.instances {
        let name = &db.instance(inst).name;
        let color = if name.starts_with("ck_htree") {
            Rgba([230, 140, 30, 255])
        } else if name.starts_with("htree_feed_") {
            Rgba([90, 90, 90, 255])
        } else {
            Rgba([35, 35, 40, 255])
        };
        let r = db.instance_box(inst);
        let (x, y_top) = map(r.xmin(), r.ymax());
        let w = (r.width() as f64 * scale_x).max(1.0);
        let h = (r.height() as f64 * scale_y).max(1.0);
        draw_filled_rect_mut(
            &mut img,
            ImageRect::at(x as i32, y_top as i32).of_size(w as u32, h as u32),
            color,
        );
    }

    let mut segments = Vec::new();
    let mut vias = Vec::new();
    for &net in &data.nets {
        for &comp in &db.net(net).components {
            let component = db.component(comp);
            if !component.alive {
                continue;
            }
            match component.kind {
                ComponentKind::Horizontal { source, target, y, layer } => {
                    let x1 = db.component_position(source).x;
                    let x2 = db.component_position(target).x;
                    segments.push((layer, map(x1, y), map(x2, y)));
                }
                ComponentKind::Vertical { source, target, x, layer } => {
                    let y1 = db.component_position(source).y;
                    let y2 = db.component_position(target).y;
                    segments.push((layer, map(x, y1), map(x, y2)));
                }
                ComponentKind::Contact { position, .. } => vias.push(map(position.x, position.y)),
                ComponentKind::RoutingPad { .. } => {}
            }
        }
    }
    segments.sort_by_key(|s| s.0);

    for (layer, (x1, y1), (x2, y2)) in segments {
        let color = LAYER_COLORS[(layer as usize).min(LAYER_COLORS.len() - 1)];
        draw_line_segment_mut(&mut img, (x1 as f32, y1 as f32), (x2 as f32, y2 as f32), color);
        if layer >= 2 {
            draw_line_segment_mut(
                &mut img,
                ((x1 + 0.5) as f32, (y1 + 0.5) as f32),
                ((x2 + 0.5) as f32, (y2 + 0.5) as f32),
                color,
            );
        }
    }

    for (x, y) in vias {
        let rect = ImageRect::at(x as i32 - 1, y as i32 - 1).of_size(3, 3);
        draw_filled_rect_mut(&mut img, rect, Rgba([255, 255, 255, 200]));
    }

    img.save(Path::new(filename))
}
