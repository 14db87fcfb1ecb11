//! Zone geometry and containment.
//!
//! Zones are named polygons in frame pixel coordinates. They are built once
//! from configuration and never mutated afterwards. Overlapping zones are
//! allowed: a point is tested against each zone independently.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::error::EngineError;

/// Integer pixel coordinate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

/// Simple polygon with at least three vertices.
///
/// Vertices are private so a polygon cannot change after validation.
/// Self-intersecting input is accepted but containment results for it are
/// not meaningful.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Polygon {
    vertices: Vec<Point>,
}

impl Polygon {
    pub fn new(vertices: Vec<Point>) -> Result<Self, EngineError> {
        if vertices.len() < 3 {
            return Err(EngineError::malformed_zone(
                "<polygon>",
                format!("polygon needs at least 3 vertices, got {}", vertices.len()),
            ));
        }
        Ok(Self { vertices })
    }

    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    /// Boundary-inclusive containment test.
    ///
    /// Points on an edge or vertex are inside. Everything is computed in
    /// `i64` so the result is exact for any `i32` input.
    pub fn contains(&self, p: Point) -> bool {
        let n = self.vertices.len();
        let mut inside = false;
        for i in 0..n {
            let a = self.vertices[i];
            let b = self.vertices[(i + 1) % n];
            if on_segment(p, a, b) {
                return true;
            }
            if (a.y > p.y) != (b.y > p.y) {
                // Crossing test for a ray cast towards +x, rearranged to avoid division.
                let lhs = (p.x as i64 - a.x as i64) * (b.y as i64 - a.y as i64);
                let rhs = (b.x as i64 - a.x as i64) * (p.y as i64 - a.y as i64);
                let crosses = if b.y > a.y { lhs < rhs } else { lhs > rhs };
                if crosses {
                    inside = !inside;
                }
            }
        }
        inside
    }
}

fn on_segment(p: Point, a: Point, b: Point) -> bool {
    let cross = (b.x as i64 - a.x as i64) * (p.y as i64 - a.y as i64)
        - (b.y as i64 - a.y as i64) * (p.x as i64 - a.x as i64);
    cross == 0
        && p.x >= a.x.min(b.x)
        && p.x <= a.x.max(b.x)
        && p.y >= a.y.min(b.y)
        && p.y <= a.y.max(b.y)
}

/// Zone names are human labels ("Zone A", "loading-bay") shown in logs.
pub fn validate_zone_name(name: &str) -> Result<()> {
    static ZONE_NAME_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = ZONE_NAME_RE.get_or_init(|| {
        regex::Regex::new(r"^[A-Za-z0-9][A-Za-z0-9 _:-]{0,63}$").expect("zone name pattern")
    });
    if !re.is_match(name) {
        return Err(EngineError::malformed_zone(
            name,
            "zone name must match ^[A-Za-z0-9][A-Za-z0-9 _:-]{0,63}$",
        )
        .into());
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Zone {
    name: String,
    polygon: Polygon,
}

impl Zone {
    pub fn new(name: &str, vertices: Vec<Point>) -> Result<Self> {
        validate_zone_name(name)?;
        let polygon = Polygon::new(vertices).map_err(|err| err.for_zone(name))?;
        Ok(Self {
            name: name.to_string(),
            polygon,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn polygon(&self) -> &Polygon {
        &self.polygon
    }

    pub fn contains(&self, p: Point) -> bool {
        self.polygon.contains(p)
    }
}

/// Single-zone containment.
pub fn classify(point: Point, zone: &Zone) -> bool {
    zone.contains(point)
}

/// Ordered collection of uniquely named zones.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ZoneSet {
    zones: Vec<Zone>,
}

impl ZoneSet {
    pub fn new(zones: Vec<Zone>) -> Result<Self> {
        for (i, zone) in zones.iter().enumerate() {
            if zones[..i].iter().any(|prev| prev.name == zone.name) {
                return Err(EngineError::malformed_zone(zone.name(), "duplicate zone name").into());
            }
        }
        Ok(Self { zones })
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Zone> {
        self.zones.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Zone> {
        self.zones.iter().find(|zone| zone.name == name)
    }

    /// Names of every zone containing `point`, in configuration order.
    pub fn classify_many(&self, point: Point) -> Vec<&str> {
        self.zones
            .iter()
            .filter(|zone| zone.contains(point))
            .map(|zone| zone.name())
            .collect()
    }

    /// Per-zone occupancy. A point inside several zones counts toward each.
    pub fn tally(&self, points: &[Point]) -> ZoneCounts {
        let counts = self
            .zones
            .iter()
            .map(|zone| {
                let count = points.iter().filter(|p| zone.contains(**p)).count();
                (zone.name.clone(), count)
            })
            .collect();
        ZoneCounts { counts }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ZoneCounts {
    counts: Vec<(String, usize)>,
}

impl ZoneCounts {
    pub fn get(&self, name: &str) -> Option<usize> {
        self.counts
            .iter()
            .find(|(zone, _)| zone == name)
            .map(|(_, count)| *count)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.counts.iter().map(|(zone, count)| (zone.as_str(), *count))
    }

    pub fn summary(&self) -> String {
        self.iter()
            .map(|(zone, count)| format!("{zone}={count}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
