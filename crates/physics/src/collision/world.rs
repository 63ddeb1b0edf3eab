//! Broad phase and the collision world.
//!
//! Movement code never walks geometry directly. It asks a [`BroadPhase`] for
//! the collidables whose bounds touch a query volume and then tests each one.
//! [`CollisionWorld`] is a simple broad phase that stores everything in a
//! flat list and scans it; real games plug in their own spatial index.

use glam::{Quat, Vec3};

use super::collidable::{Brush, Collidable, CollisionError};
use super::flags::CollisionMask;
use super::hit::CollidableId;
use super::shape::Aabb;

/// Spatial index queried by the sweep engine.
///
/// Implementations must be safe to read from many units at once; the
/// movement core takes no locks of its own.
pub trait BroadPhase {
    /// Append every collidable whose bounds intersect `bounds` and whose
    /// group intersects `mask`.
    fn query<'a>(
        &'a self,
        bounds: &Aabb,
        mask: CollisionMask,
        out: &mut Vec<(CollidableId, &'a dyn Collidable)>,
    );
}

enum Body {
    Brush(Brush),
    External(Box<dyn Collidable>),
}

impl Body {
    fn collidable(&self) -> &dyn Collidable {
        match self {
            Body::Brush(brush) => brush,
            Body::External(collidable) => collidable.as_ref(),
        }
    }
}

struct Entry {
    id: CollidableId,
    bounds: Aabb,
    mask: CollisionMask,
    body: Body,
}

/// A flat list of collidables.
///
/// Supports:
/// - Box brushes (axis-aligned and oriented)
/// - Convex hull brushes
/// - Triangle mesh brushes
/// - Any external [`Collidable`] with caller-supplied bounds
///
/// # Thread Safety
///
/// Queries take `&self`, so a world can be shared across threads while
/// units sweep through it. Moving a dynamic brush needs `&mut self`.
#[derive(Default)]
pub struct CollisionWorld {
    entries: Vec<Entry>,
    next_id: u32,
}

impl std::fmt::Debug for CollisionWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollisionWorld")
            .field("collidables", &self.entries.len())
            .finish()
    }
}

impl CollisionWorld {
    /// Create an empty collision world.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
        }
    }

    /// Add an axis-aligned box.
    ///
    /// # Arguments
    ///
    /// * `center` - Center position of the box in world space
    /// * `half_extents` - Half-size in each axis (x, y, z)
    /// * `mask` - Collision group of the box
    pub fn add_box(&mut self, center: Vec3, half_extents: Vec3, mask: CollisionMask) -> CollidableId {
        self.add_brush(Brush::cuboid(center, half_extents), mask)
    }

    /// Add a convex hull built from world-space points.
    pub fn add_convex_hull(
        &mut self,
        points: &[Vec3],
        mask: CollisionMask,
    ) -> Result<CollidableId, CollisionError> {
        let brush = Brush::convex_hull(points)?;
        Ok(self.add_brush(brush, mask))
    }

    /// Add a triangle mesh.
    ///
    /// # Arguments
    ///
    /// * `vertices` - Mesh vertex positions
    /// * `indices` - Triangle indices (3 per triangle)
    /// * `mask` - Collision group of the mesh
    pub fn add_triangle_mesh(
        &mut self,
        vertices: &[Vec3],
        indices: &[[u32; 3]],
        mask: CollisionMask,
    ) -> Result<CollidableId, CollisionError> {
        let brush = Brush::triangle_mesh(vertices, indices)?;
        Ok(self.add_brush(brush, mask))
    }

    /// Add a prepared brush.
    pub fn add_brush(&mut self, brush: Brush, mask: CollisionMask) -> CollidableId {
        let bounds = brush.bounds();
        self.push(bounds, mask, Body::Brush(brush))
    }

    /// Add any collidable. `bounds` must enclose everything it can report.
    pub fn add_collidable(
        &mut self,
        collidable: Box<dyn Collidable>,
        bounds: Aabb,
        mask: CollisionMask,
    ) -> CollidableId {
        self.push(bounds, mask, Body::External(collidable))
    }

    /// Move a brush (doors, lifts). Bounds are refreshed.
    pub fn set_brush_pose(
        &mut self,
        id: CollidableId,
        position: Vec3,
        rotation: Quat,
    ) -> Result<(), CollisionError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(CollisionError::UnknownCollidable(id.0))?;

        match &mut entry.body {
            Body::Brush(brush) => {
                brush.set_pose(position, rotation);
                entry.bounds = brush.bounds();
                Ok(())
            }
            Body::External(_) => Err(CollisionError::NotABrush(id.0)),
        }
    }

    /// Remove a collidable. Returns false if it was not present.
    pub fn remove(&mut self, id: CollidableId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    /// Remove all collision geometry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Get the number of collidables.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the world holds no geometry.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bounds of a registered collidable.
    pub fn bounds_of(&self, id: CollidableId) -> Option<Aabb> {
        self.entries.iter().find(|e| e.id == id).map(|e| e.bounds)
    }

    fn push(&mut self, bounds: Aabb, mask: CollisionMask, body: Body) -> CollidableId {
        let id = CollidableId(self.next_id);
        self.next_id += 1;
        self.entries.push(Entry {
            id,
            bounds,
            mask,
            body,
        });
        id
    }
}

impl BroadPhase for CollisionWorld {
    fn query<'a>(
        &'a self,
        bounds: &Aabb,
        mask: CollisionMask,
        out: &mut Vec<(CollidableId, &'a dyn Collidable)>,
    ) {
        out.extend(
            self.entries
                .iter()
                .filter(|e| mask.intersects(e.mask) && e.bounds.intersects(bounds))
                .map(|e| (e.id, e.body.collidable())),
        );
    }
}

// ============================================================================
// Tests
// ============================================================================
