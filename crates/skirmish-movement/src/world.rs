//! Static collision world: axis-aligned boxes in square columns.

use std::collections::HashMap;

use glam::Vec3;

/// Column edge length in world units.
pub const CHUNK_SIZE: f32 = 50.0;

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn from_center_size(center: Vec3, size: Vec3) -> Self {
        let half = size.abs() * 0.5;
        Self::new(center - half, center + half)
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Distance along `dir` at which a ray from `origin` enters this box,
    /// if that happens within `far`.
    ///
    /// Slab test. A ray starting inside the box does not hit it: only
    /// entering surfaces count.
    pub fn ray_distance(&self, origin: Vec3, dir: Vec3, far: f32) -> Option<f32> {
        let inv = dir.recip();
        let t1 = (self.min - origin) * inv;
        let t2 = (self.max - origin) * inv;
        let t_enter = t1.min(t2).max_element();
        let t_exit = t1.max(t2).min_element();

        if t_enter < 0.0 || t_enter > t_exit || t_enter > far {
            return None;
        }
        Some(t_enter)
    }
}

/// Column coordinates of a horizontal position.
pub type ChunkKey = (i32, i32);

/// Static level geometry for collision probes.
#[derive(Debug, Clone)]
pub struct CollisionWorld {
    boxes: Vec<Aabb>,
    chunks: HashMap<ChunkKey, Vec<usize>>,
    chunk_size: f32,
}

impl Default for CollisionWorld {
    fn default() -> Self {
        Self::new(CHUNK_SIZE)
    }
}

impl CollisionWorld {
    pub fn new(chunk_size: f32) -> Self {
        Self {
            boxes: Vec::new(),
            chunks: HashMap::new(),
            chunk_size,
        }
    }

    /// Adds a box, bucketed by the column its centre falls in.
    pub fn insert(&mut self, aabb: Aabb) -> usize {
        let index = self.boxes.len();
        let key = self.chunk_of(aabb.center());
        self.boxes.push(aabb);
        self.chunks.entry(key).or_default().push(index);
        index
    }

    pub fn chunk_of(&self, position: Vec3) -> ChunkKey {
        (
            (position.x / self.chunk_size).floor() as i32,
            (position.z / self.chunk_size).floor() as i32,
        )
    }

    /// Collision candidates around `position`.
    ///
    /// A box qualifies when its column is within `render_distance`
    /// columns (Chebyshev distance) of the player's column and its centre
    /// is closer than `sqrt(radius_sq)`.
    pub fn nearby(
        &self,
        position: Vec3,
        render_distance: i32,
        radius_sq: f32,
    ) -> Vec<&Aabb> {
        let (cx, cz) = self.chunk_of(position);
        let span = -render_distance..=render_distance;
        span.clone()
            .flat_map(|dx| span.clone().map(move |dz| (cx + dx, cz + dz)))
            .filter_map(|key| self.chunks.get(&key))
            .flat_map(|indices| indices.iter().map(|&i| &self.boxes[i]))
            .filter(|b| b.center().distance_squared(position) < radius_sq)
            .collect()
    }

    /// Nearest hit distance among `candidates`.
    pub fn cast(
        candidates: &[&Aabb],
        origin: Vec3,
        dir: Vec3,
        far: f32,
    ) -> Option<f32> {
        candidates
            .iter()
            .filter_map(|b| b.ray_distance(origin, dir, far))
            .min_by(f32::total_cmp)
    }

    /// Nearest hit distance against every box in the world.
    pub fn cast_all(&self, origin: Vec3, dir: Vec3, far: f32) -> Option<f32> {
        self.boxes
            .iter()
            .filter_map(|b| b.ray_distance(origin, dir, far))
            .min_by(f32::total_cmp)
    }

    /// Eye position for (re)spawning: straight down from `(0, from_y, 0)`
    /// onto the first surface, raised by `eye_height`. With nothing
    /// below, the eye sits `eye_height` above the origin.
    pub fn spawn_point(&self, from_y: f32, eye_height: f32) -> Vec3 {
        let origin = Vec3::new(0.0, from_y, 0.0);
        match self.cast_all(origin, Vec3::NEG_Y, f32::INFINITY) {
            Some(d) => Vec3::new(0.0, from_y - d + eye_height, 0.0),
            None => Vec3::new(0.0, eye_height, 0.0),
        }
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}
