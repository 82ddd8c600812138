use crate::db::core::{Design, Plug};
use crate::db::indices::InstId;

/// Instance path from the top cell downwards.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Path(Vec<InstId>);

impl Path {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_instances(instances: Vec<InstId>) -> Self {
        Self(instances)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn instances(&self) -> &[InstId] {
        &self.0
    }

    pub fn head_instance(&self) -> Option<InstId> {
        self.0.first().copied()
    }

    pub fn tail_path(&self) -> Path {
        Path(self.0.iter().skip(1).copied().collect())
    }

    pub fn child(&self, inst: InstId) -> Path {
        let mut instances = self.0.clone();
        instances.push(inst);
        Path(instances)
    }

    pub fn name(&self, db: &Design) -> String {
        self.0
            .iter()
            .map(|&i| db.instance(i).name.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// A plug seen through an instance path.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Occurrence {
    pub path: Path,
    pub plug: Plug,
}

impl Occurrence {
    pub fn new(path: Path, plug: Plug) -> Self {
        Self { path, plug }
    }

    pub fn name(&self, db: &Design) -> String {
        if self.path.is_empty() {
            db.plug_name(self.plug)
        } else {
            format!("{}.{}", self.path.name(db), db.plug_name(self.plug))
        }
    }
}
