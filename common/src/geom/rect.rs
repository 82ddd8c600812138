use super::dbu::DbU;
use super::point::Point;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Quadrant {
    BottomLeft,
    BottomRight,
    TopLeft,
    TopRight,
}

impl Quadrant {
    /// Creation and visiting order of the four quadrants.
    pub const ALL: [Quadrant; 4] = [
        Quadrant::BottomLeft,
        Quadrant::BottomRight,
        Quadrant::TopLeft,
        Quadrant::TopRight,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Quadrant::BottomLeft => "bl",
            Quadrant::BottomRight => "br",
            Quadrant::TopLeft => "tl",
            Quadrant::TopRight => "tr",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub min: Point<DbU>,
    pub max: Point<DbU>,
}

impl Rect {
    pub fn new(min: Point<DbU>, max: Point<DbU>) -> Self {
        Self { min, max }
    }

    pub fn from_coords(xmin: DbU, ymin: DbU, xmax: DbU, ymax: DbU) -> Self {
        Self::new(
            Point::new(xmin.min(xmax), ymin.min(ymax)),
            Point::new(xmin.max(xmax), ymin.max(ymax)),
        )
    }

    pub fn xmin(&self) -> DbU {
        self.min.x
    }
    pub fn ymin(&self) -> DbU {
        self.min.y
    }
    pub fn xmax(&self) -> DbU {
        self.max.x
    }
    pub fn ymax(&self) -> DbU {
        self.max.y
    }

    pub fn width(&self) -> DbU {
        self.max.x - self.min.x
    }
    pub fn height(&self) -> DbU {
        self.max.y - self.min.y
    }
    pub fn half_width(&self) -> DbU {
        self.width() / 2
    }
    pub fn half_height(&self) -> DbU {
        self.height() / 2
    }
    pub fn area(&self) -> DbU {
        self.width() * self.height()
    }

    pub fn center(&self) -> Point<DbU> {
        Point::new(
            self.min.x + self.half_width(),
            self.min.y + self.half_height(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    pub fn overlaps(&self, other: &Rect) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
    }

    /// Inclusive on all four edges.
    pub fn contains(&self, p: Point<DbU>) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        self.contains(other.min) && self.contains(other.max)
    }

    pub fn merge(&self, other: &Rect) -> Rect {
        Rect::new(
            Point::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            Point::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        )
    }

    /// One of the four sub-rectangles obtained by bisecting at the half width and
    /// half height. With odd sides the left/bottom quadrants get the smaller half.
    pub fn quadrant(&self, q: Quadrant) -> Rect {
        let xmid = self.min.x + self.half_width();
        let ymid = self.min.y + self.half_height();
        match q {
            Quadrant::BottomLeft => Rect::from_coords(self.min.x, self.min.y, xmid, ymid),
            Quadrant::BottomRight => Rect::from_coords(xmid, self.min.y, self.max.x, ymid),
            Quadrant::TopLeft => Rect::from_coords(self.min.x, ymid, xmid, self.max.y),
            Quadrant::TopRight => Rect::from_coords(xmid, ymid, self.max.x, self.max.y),
        }
    }

    pub fn quadrants(&self) -> [Rect; 4] {
        Quadrant::ALL.map(|q| self.quadrant(q))
    }

    /// Ordered containment: bottom-left, bottom-right, top-left are tested in that
    /// order, top-right catches everything else (shared edges and outside points).
    pub fn quadrant_of(&self, p: Point<DbU>) -> Quadrant {
        if self.quadrant(Quadrant::BottomLeft).contains(p) {
            Quadrant::BottomLeft
        } else if self.quadrant(Quadrant::BottomRight).contains(p) {
            Quadrant::BottomRight
        } else if self.quadrant(Quadrant::TopLeft).contains(p) {
            Quadrant::TopLeft
        } else {
            Quadrant::TopRight
        }
    }
}
