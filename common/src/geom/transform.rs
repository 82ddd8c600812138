use super::dbu::DbU;
use super::point::Point;
use super::rect::Rect;
use serde::Deserialize;

/// Orientation names follow DEF: `N` identity, `S` half turn, `FN` mirrored
/// about the Y axis, `FS` mirrored about the X axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
pub enum Orientation {
    #[default]
    #[serde(rename = "N")]
    Id,
    #[serde(rename = "S")]
    R2,
    #[serde(rename = "FN")]
    Mx,
    #[serde(rename = "FS")]
    My,
}

impl Orientation {
    pub fn def_name(self) -> &'static str {
        match self {
            Orientation::Id => "N",
            Orientation::R2 => "S",
            Orientation::Mx => "FN",
            Orientation::My => "FS",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Transformation {
    pub tx: DbU,
    pub ty: DbU,
    pub orientation: Orientation,
}

impl Transformation {
    pub fn new(tx: DbU, ty: DbU, orientation: Orientation) -> Self {
        Self {
            tx,
            ty,
            orientation,
        }
    }

    pub fn translation(tx: DbU, ty: DbU) -> Self {
        Self::new(tx, ty, Orientation::Id)
    }

    pub fn apply(&self, p: Point<DbU>) -> Point<DbU> {
        let (x, y) = match self.orientation {
            Orientation::Id => (p.x, p.y),
            Orientation::R2 => (-p.x, -p.y),
            Orientation::Mx => (-p.x, p.y),
            Orientation::My => (p.x, -p.y),
        };
        Point::new(x + self.tx, y + self.ty)
    }

    pub fn apply_rect(&self, r: &Rect) -> Rect {
        let a = self.apply(r.min);
        let b = self.apply(r.max);
        Rect::from_coords(a.x, a.y, b.x, b.y)
    }
}
