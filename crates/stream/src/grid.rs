use std::collections::HashMap;
use std::rc::Rc;

use glam::Vec3;

use crate::index::WorldIndex;
use crate::object::{remove_if_exists, ObjectRef};

/// A 2D cell coordinate in the world grid (ignoring Y axis for partitioning).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellCoord {
    pub x: i32,
    pub z: i32,
}

impl CellCoord {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }
}

/// Fixed-size XZ grid over object positions.
///
/// Queries visit every cell that could hold an object whose reach covers the
/// query point, then filter by exact 3D distance. Reach is bounded by the
/// largest rendering distance ever inserted.
pub struct GridIndex {
    cell_size: f32,
    cells: HashMap<CellCoord, Vec<ObjectRef>>,
    max_rendering_distance: f32,
    count: usize,
}

impl GridIndex {
    /// Create a new grid index with the given cell size.
    pub fn new(cell_size: f32) -> Self {
        assert!(cell_size > 0.0, "cell_size must be positive");
        Self {
            cell_size,
            cells: HashMap::new(),
            max_rendering_distance: 0.0,
            count: 0,
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Convert a world position to a cell coordinate.
    pub fn position_to_cell(&self, pos: Vec3) -> CellCoord {
        CellCoord {
            x: (pos.x / self.cell_size).floor() as i32,
            z: (pos.z / self.cell_size).floor() as i32,
        }
    }

    /// Objects indexed in a specific cell.
    pub fn objects_in_cell(&self, coord: CellCoord) -> &[ObjectRef] {
        self.cells.get(&coord).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of non-empty cells.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    fn remove_from_cell(&mut self, coord: CellCoord, obj: &ObjectRef) -> bool {
        let Some(list) = self.cells.get_mut(&coord) else {
            return false;
        };
        let removed = remove_if_exists(list, obj);
        if list.is_empty() {
            self.cells.remove(&coord);
        }
        removed
    }

    fn remove_anywhere(&mut self, obj: &ObjectRef) -> bool {
        let coord = self
            .cells
            .iter()
            .find(|(_, list)| list.iter().any(|o| Rc::ptr_eq(o, obj)))
            .map(|(c, _)| *c);
        match coord {
            Some(c) => self.remove_from_cell(c, obj),
            None => false,
        }
    }
}

impl WorldIndex for GridIndex {
    fn insert(&mut self, obj: &ObjectRef) {
        let coord = self.position_to_cell(obj.position());
        self.cells.entry(coord).or_default().push(Rc::clone(obj));
        self.max_rendering_distance = self.max_rendering_distance.max(obj.rendering_distance());
        self.count += 1;
    }

    fn remove(&mut self, obj: &ObjectRef) {
        let coord = self.position_to_cell(obj.position());
        if self.remove_from_cell(coord, obj) || self.remove_anywhere(obj) {
            self.count -= 1;
        }
    }

    fn relocate(&mut self, obj: &ObjectRef, old_position: Vec3) {
        let old = self.position_to_cell(old_position);
        let new = self.position_to_cell(obj.position());
        if old == new {
            return;
        }
        if self.remove_from_cell(old, obj) || self.remove_anywhere(obj) {
            self.cells.entry(new).or_default().push(Rc::clone(obj));
        }
    }

    fn objects_near(&self, point: Vec3, prediction_step: f32, factor: f32) -> Vec<ObjectRef> {
        let mut result = Vec::new();
        if self.count == 0 {
            return result;
        }
        let reach = self.max_rendering_distance * factor + prediction_step;
        let radius = (reach / self.cell_size).ceil() as i64;
        let hits = |o: &&ObjectRef| {
            let r = o.rendering_distance() * factor + prediction_step;
            o.distance2(point) < r * r
        };

        // Scanning the square costs (2r+1)^2 lookups; past the number of
        // occupied cells it is cheaper to walk them all.
        let span = 2 * radius + 1;
        if span.saturating_mul(span) > self.cells.len() as i64 {
            for list in self.cells.values() {
                result.extend(list.iter().filter(hits).cloned());
            }
            return result;
        }

        let center = self.position_to_cell(point);
        let radius = radius as i32;
        for dx in -radius..=radius {
            for dz in -radius..=radius {
                let coord = CellCoord::new(center.x + dx, center.z + dz);
                if let Some(list) = self.cells.get(&coord) {
                    result.extend(list.iter().filter(hits).cloned());
                }
            }
        }
        result
    }

    fn len(&self) -> usize {
        self.count
    }
}
