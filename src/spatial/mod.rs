//! Spatial hash grid for broad-phase neighbor queries.
//!
//! Uniform grid over the square `[-half_extent, half_extent]²`. Each cell is
//! the head of an intrusive singly-linked list threaded through a fixed node
//! pool, one node per (entity, cell) pair, so an entity straddling several
//! cells is reachable from every one of them. Nothing here allocates after
//! construction.
//!
//! Ordering contract: within a tick, [`SpatialGrid::rebuild`] runs after
//! physics integration and before any collision query.

use thiserror::Error;
use tracing::warn;

use crate::ecs::{EntityIndex, World};

/// Node pool sizing: an entity no wider than one cell touches at most four.
pub const MAX_CELLS_PER_ENTITY: usize = 4;

const NIL: i32 = -1;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SpatialError {
    #[error("spatial grid node pool exhausted ({capacity} nodes) while inserting entity {entity}")]
    NodePoolFull { entity: EntityIndex, capacity: usize },
}

/// Inclusive cell range an entity was inserted into.
#[derive(Debug, Clone, Copy, Default)]
struct CellSpan {
    min_cx: usize,
    min_cy: usize,
    max_cx: usize,
    max_cy: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildStats {
    pub inserted: usize,
    pub overflowed: usize,
}

pub struct SpatialGrid {
    cell_size: f32,
    inv_cell_size: f32,
    half_extent: f32,
    cols: usize,
    rows: usize,
    cell_head: Vec<i32>,
    node_entity: Vec<i32>,
    node_next: Vec<i32>,
    node_cursor: usize,
    /// Entity is indexed iff `indexed_epoch[e] == epoch`.
    epoch: u32,
    indexed_epoch: Vec<u32>,
    spans: Vec<CellSpan>,
    /// Position and radius recorded at insert time.
    bounds: Vec<[f32; 3]>,
    is_static: Vec<bool>,
    static_list: Vec<EntityIndex>,
    visit_stamp: Vec<u32>,
    stamp: u32,
}

impl SpatialGrid {
    /// Grid covering a circular arena of `world_radius`.
    pub fn new(capacity: usize, world_radius: f32, cell_size: f32) -> Self {
        let half_extent = world_radius.max(cell_size);
        let cols = ((half_extent * 2.0) / cell_size).ceil().max(1.0) as usize;
        let rows = cols;
        let node_capacity = capacity * MAX_CELLS_PER_ENTITY;
        Self {
            cell_size,
            inv_cell_size: 1.0 / cell_size,
            half_extent,
            cols,
            rows,
            cell_head: vec![NIL; cols * rows],
            node_entity: vec![NIL; node_capacity],
            node_next: vec![NIL; node_capacity],
            node_cursor: 0,
            epoch: 1,
            indexed_epoch: vec![0; capacity],
            spans: vec![CellSpan::default(); capacity],
            bounds: vec![[0.0; 3]; capacity],
            is_static: vec![false; capacity],
            static_list: Vec::with_capacity(capacity),
            visit_stamp: vec![0; capacity],
            stamp: 0,
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.cols, self.rows)
    }

    pub fn cell_count(&self) -> usize {
        self.cell_head.len()
    }

    pub fn node_capacity(&self) -> usize {
        self.node_entity.len()
    }

    pub fn nodes_in_use(&self) -> usize {
        self.node_cursor
    }

    pub fn is_indexed(&self, idx: EntityIndex) -> bool {
        self.indexed_epoch[idx] == self.epoch
    }

    fn cell_coord(&self, value: f32, limit: usize) -> usize {
        let cell = ((value + self.half_extent) * self.inv_cell_size).floor();
        if cell <= 0.0 {
            0
        } else {
            (cell as usize).min(limit - 1)
        }
    }

    fn span_for(&self, x: f32, y: f32, r: f32) -> CellSpan {
        CellSpan {
            min_cx: self.cell_coord(x - r, self.cols),
            min_cy: self.cell_coord(y - r, self.rows),
            max_cx: self.cell_coord(x + r, self.cols),
            max_cy: self.cell_coord(y + r, self.rows),
        }
    }

    /// Empty every cell. O(cells); stale nodes become unreachable garbage.
    pub fn clear(&mut self) {
        self.cell_head.fill(NIL);
        self.node_cursor = 0;
        self.epoch = self.epoch.wrapping_add(1);
        if self.epoch == 0 {
            self.indexed_epoch.fill(0);
            self.epoch = 1;
        }
    }

    /// Rebuild keeping only entities marked static, from their recorded bounds.
    pub fn clear_dynamic(&mut self) {
        self.clear();
        for i in 0..self.static_list.len() {
            let idx = self.static_list[i];
            let [x, y, r] = self.bounds[idx];
            if let Err(err) = self.insert(idx, x, y, r) {
                warn!(%err, "static entity only partially indexed");
            }
        }
    }

    pub fn mark_static(&mut self, idx: EntityIndex) {
        if !self.is_static[idx] {
            self.is_static[idx] = true;
            self.static_list.push(idx);
        }
    }

    pub fn unmark_static(&mut self, idx: EntityIndex) {
        if self.is_static[idx] {
            self.is_static[idx] = false;
            if let Some(pos) = self.static_list.iter().position(|&s| s == idx) {
                self.static_list.swap_remove(pos);
            }
        }
    }

    pub fn is_static(&self, idx: EntityIndex) -> bool {
        self.is_static[idx]
    }

    /// Link `idx` into every cell overlapped by its bounding box. An entity
    /// that is already indexed is unlinked first.
    ///
    /// On pool exhaustion the entity stays linked into the cells processed so
    /// far and the error is returned; other entities are unaffected.
    pub fn insert(
        &mut self,
        idx: EntityIndex,
        x: f32,
        y: f32,
        r: f32,
    ) -> Result<(), SpatialError> {
        if self.is_indexed(idx) {
            self.unlink_all(idx);
        }
        let span = self.span_for(x, y, r);
        self.spans[idx] = span;
        self.bounds[idx] = [x, y, r];
        self.indexed_epoch[idx] = self.epoch;

        for cy in span.min_cy..=span.max_cy {
            for cx in span.min_cx..=span.max_cx {
                if self.node_cursor == self.node_entity.len() {
                    return Err(SpatialError::NodePoolFull {
                        entity: idx,
                        capacity: self.node_entity.len(),
                    });
                }
                let node = self.node_cursor;
                self.node_cursor += 1;
                let cell = cy * self.cols + cx;
                self.node_entity[node] = idx as i32;
                self.node_next[node] = self.cell_head[cell];
                self.cell_head[cell] = node as i32;
            }
        }
        Ok(())
    }

    /// Insert using the entity's current transform and radius.
    pub fn insert_entity(&mut self, world: &World, idx: EntityIndex) -> Result<(), SpatialError> {
        let (x, y) = world.transform.position(idx);
        self.insert(idx, x, y, world.physics.radius(idx))
    }

    /// Unlink `idx` from the cells it was inserted into. The grid remembers
    /// those cells, so moving the entity before removing it is fine. Unlinked
    /// nodes are reclaimed by the next [`clear`](Self::clear).
    pub fn remove(&mut self, idx: EntityIndex) -> bool {
        if !self.is_indexed(idx) {
            return false;
        }
        self.unlink_all(idx);
        self.unmark_static(idx);
        true
    }

    fn unlink_all(&mut self, idx: EntityIndex) {
        let span = self.spans[idx];
        for cy in span.min_cy..=span.max_cy {
            for cx in span.min_cx..=span.max_cx {
                self.unlink(cy * self.cols + cx, idx as i32);
            }
        }
        self.indexed_epoch[idx] = self.epoch.wrapping_sub(1);
    }

    fn unlink(&mut self, cell: usize, entity: i32) {
        let mut prev = NIL;
        let mut node = self.cell_head[cell];
        while node != NIL {
            let next = self.node_next[node as usize];
            if self.node_entity[node as usize] == entity {
                if prev == NIL {
                    self.cell_head[cell] = next;
                } else {
                    self.node_next[prev as usize] = next;
                }
            } else {
                prev = node;
            }
            node = next;
        }
    }

    /// Clear dynamic entries and index every live, non-static entity.
    pub fn rebuild(&mut self, world: &World) -> RebuildStats {
        self.clear_dynamic();
        let mut stats = RebuildStats::default();
        for idx in 0..world.capacity().min(self.is_static.len()) {
            if !world.is_alive(idx) || self.is_static[idx] {
                continue;
            }
            match self.insert_entity(world, idx) {
                Ok(()) => stats.inserted += 1,
                Err(_) => stats.overflowed += 1,
            }
        }
        if stats.overflowed > 0 {
            warn!(
                overflowed = stats.overflowed,
                capacity = self.node_capacity(),
                "spatial grid node pool exhausted during rebuild"
            );
        }
        stats
    }

    /// Entities whose circle overlaps the query circle, written into `out`
    /// (cleared first). Entities spanning several cells may appear more than
    /// once.
    pub fn query_radius_into(&self, x: f32, y: f32, r: f32, out: &mut Vec<EntityIndex>) {
        out.clear();
        let span = self.span_for(x, y, r);
        for cy in span.min_cy..=span.max_cy {
            for cx in span.min_cx..=span.max_cx {
                let mut node = self.cell_head[cy * self.cols + cx];
                while node != NIL {
                    let entity = self.node_entity[node as usize] as EntityIndex;
                    if self.overlaps(entity, x, y, r) {
                        out.push(entity);
                    }
                    node = self.node_next[node as usize];
                }
            }
        }
    }

    /// Like [`query_radius_into`](Self::query_radius_into) but each entity is
    /// reported once.
    pub fn query_radius_unique_into(
        &mut self,
        x: f32,
        y: f32,
        r: f32,
        out: &mut Vec<EntityIndex>,
    ) {
        out.clear();
        self.stamp = self.stamp.wrapping_add(1);
        if self.stamp == 0 {
            self.visit_stamp.fill(0);
            self.stamp = 1;
        }
        let span = self.span_for(x, y, r);
        for cy in span.min_cy..=span.max_cy {
            for cx in span.min_cx..=span.max_cx {
                let mut node = self.cell_head[cy * self.cols + cx];
                while node != NIL {
                    let entity = self.node_entity[node as usize] as EntityIndex;
                    if self.visit_stamp[entity] != self.stamp {
                        self.visit_stamp[entity] = self.stamp;
                        if self.overlaps(entity, x, y, r) {
                            out.push(entity);
                        }
                    }
                    node = self.node_next[node as usize];
                }
            }
        }
    }

    fn overlaps(&self, entity: EntityIndex, x: f32, y: f32, r: f32) -> bool {
        let [ex, ey, er] = self.bounds[entity];
        let dx = ex - x;
        let dy = ey - y;
        let reach = r + er;
        dx * dx + dy * dy <= reach * reach
    }
}
