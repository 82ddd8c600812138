use super::dbu::DbU;
use super::rect::Rect;
use rstar::{AABB, RTree, RTreeObject};

/// Boxes keyed by a copyable id, for overlap queries.
pub struct SpatialIndex<T> {
    tree: RTree<Entry<T>>,
}

struct Entry<T> {
    rect: Rect,
    id: T,
}

fn envelope_of(rect: &Rect) -> AABB<[DbU; 2]> {
    AABB::from_corners([rect.min.x, rect.min.y], [rect.max.x, rect.max.y])
}

impl<T> RTreeObject for Entry<T> {
    type Envelope = AABB<[DbU; 2]>;

    fn envelope(&self) -> Self::Envelope {
        envelope_of(&self.rect)
    }
}

impl<T: Copy> SpatialIndex<T> {
    pub fn bulk_load(items: impl IntoIterator<Item = (Rect, T)>) -> Self {
        let entries = items.into_iter().map(|(rect, id)| Entry { rect, id }).collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Ids whose box shares a non-zero area with `rect`. Abutting boxes are
    /// not reported.
    pub fn query_overlapping(&self, rect: &Rect) -> Vec<T> {
        self.tree
            .locate_in_envelope_intersecting(&envelope_of(rect))
            .filter(|entry| entry.rect.overlaps(rect))
            .map(|entry| entry.id)
            .collect()
    }
}
