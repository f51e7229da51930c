/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Wall geometry snapshot types.
//!
//! The wall is one logical canvas described by the polygon formed by its
//! point list.  How that polygon is computed (layout files, scaling to
//! screen pixels) is owned elsewhere; this module only carries the result
//! and derives the fingerprint used to namespace per-run resources.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

// ── Point / Rect ──────────────────────────────────────────────────────────────

/// A vertex of the wall polygon.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    /// Stable textual form, `"x,y,w,h"`.
    pub fn serialize(&self) -> String {
        format!("{},{},{},{}", self.x, self.y, self.w, self.h)
    }
}

// ── WallGeometry ──────────────────────────────────────────────────────────────

/// Read-only snapshot of the wall's shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WallGeometry {
    pub points: Vec<Point>,
}

impl WallGeometry {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// A single 1x1 screen.  Used when no geometry is configured.
    pub fn unit() -> Self {
        Self::new(vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 1.0),
        ])
    }

    /// Bounding box of all points.  An empty polygon has zero extents.
    pub fn extents(&self) -> Rect {
        let Some(first) = self.points.first() else {
            return Rect::default();
        };
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &self.points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Rect {
            x: min_x,
            y: min_y,
            w: max_x - min_x,
            h: max_y - min_y,
        }
    }

    pub fn fingerprint(&self) -> GeometryFingerprint {
        GeometryFingerprint(self.extents().serialize())
    }
}

impl Default for WallGeometry {
    fn default() -> Self {
        Self::unit()
    }
}

/// Serialized extents of a [`WallGeometry`].
///
/// Two layouts with the same extents share a fingerprint; the deadline in
/// [`InstantiationId`](crate::resources::InstantiationId) keeps runs apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryFingerprint(String);

impl GeometryFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GeometryFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── GeometrySource ────────────────────────────────────────────────────────────

/// Provides the geometry currently in effect.
pub trait GeometrySource: Send + Sync {
    fn current(&self) -> WallGeometry;
}

/// Geometry holder that can be swapped while the server runs.
#[derive(Debug, Clone, Default)]
pub struct SharedGeometry {
    inner: Arc<RwLock<WallGeometry>>,
}

impl SharedGeometry {
    pub fn new(geometry: WallGeometry) -> Self {
        Self {
            inner: Arc::new(RwLock::new(geometry)),
        }
    }

    /// Replace the geometry used by every subsequent snapshot.
    pub fn use_geometry(&self, geometry: WallGeometry) {
        *self.inner.write() = geometry;
    }
}

impl GeometrySource for SharedGeometry {
    fn current(&self) -> WallGeometry {
        self.inner.read().clone()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
