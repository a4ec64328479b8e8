//! Planar geometry primitives used by the spatial layer.
//!
//! Coordinates are treated as planar (lon/lat degrees or projected units);
//! containment only needs a consistent coordinate system between layers.

// ---------------------------------------------------------------------------
// Points and boxes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    fn distance(&self, other: &Point) -> f64 {
        ((other.x - self.x).powi(2) + (other.y - self.y).powi(2)).sqrt()
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Returns `None` for an empty point set.
    pub fn of_points<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Point>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bbox = BoundingBox {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        for p in iter {
            bbox.min_x = bbox.min_x.min(p.x);
            bbox.min_y = bbox.min_y.min(p.y);
            bbox.max_x = bbox.max_x.max(p.x);
            bbox.max_y = bbox.max_y.max(p.y);
        }
        Some(bbox)
    }

    pub fn contains(&self, p: &Point) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }

    fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }
}

// ---------------------------------------------------------------------------
// Polygons
// ---------------------------------------------------------------------------

/// A polygon with one exterior ring and zero or more holes. Rings may be
/// closed (first == last) or open; both are handled.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub exterior: Vec<Point>,
    pub holes: Vec<Vec<Point>>,
}

impl Polygon {
    pub fn new(exterior: Vec<Point>, holes: Vec<Vec<Point>>) -> Self {
        Polygon { exterior, holes }
    }

    /// Axis-aligned rectangle, mostly useful for fixtures.
    pub fn rectangle(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Polygon::new(
            vec![
                Point::new(min_x, min_y),
                Point::new(max_x, min_y),
                Point::new(max_x, max_y),
                Point::new(min_x, max_y),
                Point::new(min_x, min_y),
            ],
            Vec::new(),
        )
    }

    pub fn contains(&self, p: &Point) -> bool {
        ring_contains(&self.exterior, p) && !self.holes.iter().any(|hole| ring_contains(hole, p))
    }
}

/// Even-odd ray casting test. Points exactly on an edge may land on either
/// side; a watershed boundary is shared by two polygons, so one of them
/// wins consistently for a given edge.
fn ring_contains(ring: &[Point], p: &Point) -> bool {
    if ring.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let (a, b) = (ring[i], ring[j]);
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
            if p.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Signed area and area-weighted centroid sums of a ring.
fn ring_moments(ring: &[Point]) -> (f64, f64, f64) {
    let mut area = 0.0;
    let mut cx = 0.0;
    let mut cy = 0.0;
    if ring.len() < 3 {
        return (0.0, 0.0, 0.0);
    }
    for i in 0..ring.len() {
        let a = ring[i];
        let b = ring[(i + 1) % ring.len()];
        let cross = a.x * b.y - b.x * a.y;
        area += cross;
        cx += (a.x + b.x) * cross;
        cy += (a.y + b.y) * cross;
    }
    (area / 2.0, cx / 6.0, cy / 6.0)
}

// ---------------------------------------------------------------------------
// Regions (multi-polygons)
// ---------------------------------------------------------------------------

/// One or more polygons treated as a single shape (GeoJSON Polygon or
/// MultiPolygon). Caches its bounding box.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    polygons: Vec<Polygon>,
    bbox: Option<BoundingBox>,
}

impl Region {
    pub fn new(polygons: Vec<Polygon>) -> Self {
        let bbox = polygons
            .iter()
            .filter_map(|poly| BoundingBox::of_points(&poly.exterior))
            .reduce(|a, b| a.union(&b));
        Region { polygons, bbox }
    }

    pub fn polygons(&self) -> &[Polygon] {
        &self.polygons
    }

    pub fn bbox(&self) -> Option<BoundingBox> {
        self.bbox
    }

    pub fn contains(&self, p: &Point) -> bool {
        match self.bbox {
            Some(bbox) if bbox.contains(p) => self.polygons.iter().any(|poly| poly.contains(p)),
            _ => false,
        }
    }

    /// Area-weighted centroid across all polygons (holes subtracted). Falls
    /// back to the mean exterior vertex for degenerate shapes.
    pub fn centroid(&self) -> Option<Point> {
        let mut area = 0.0;
        let mut cx = 0.0;
        let mut cy = 0.0;
        for poly in &self.polygons {
            let (a, x, y) = ring_moments(&poly.exterior);
            // Normalize orientation so exteriors add and holes subtract.
            let sign = if a < 0.0 { -1.0 } else { 1.0 };
            area += a * sign;
            cx += x * sign;
            cy += y * sign;
            for hole in &poly.holes {
                let (ha, hx, hy) = ring_moments(hole);
                let hsign = if ha < 0.0 { -1.0 } else { 1.0 };
                area -= ha * hsign;
                cx -= hx * hsign;
                cy -= hy * hsign;
            }
        }

        if area.abs() > f64::EPSILON {
            return Some(Point::new(cx / area, cy / area));
        }

        let vertices: Vec<&Point> = self.polygons.iter().flat_map(|p| p.exterior.iter()).collect();
        if vertices.is_empty() {
            return None;
        }
        let n = vertices.len() as f64;
        Some(Point::new(
            vertices.iter().map(|p| p.x).sum::<f64>() / n,
            vertices.iter().map(|p| p.y).sum::<f64>() / n,
        ))
    }
}

// ---------------------------------------------------------------------------
// Lines
// ---------------------------------------------------------------------------

/// Point halfway along the total length of one or more line parts, walked in
/// order. Zero-length lines resolve to their first vertex.
pub fn midpoint_along(parts: &[Vec<Point>]) -> Option<Point> {
    let first = parts.iter().find_map(|part| part.first().copied())?;
    let total: f64 = parts.iter().map(|part| line_length(part)).sum();
    if total <= 0.0 {
        return Some(first);
    }

    let mut remaining = total / 2.0;
    for part in parts {
        for pair in part.windows(2) {
            let seg_len = pair[0].distance(&pair[1]);
            if seg_len <= 0.0 {
                continue;
            }
            if remaining <= seg_len {
                let t = remaining / seg_len;
                return Some(Point::new(
                    pair[0].x + (pair[1].x - pair[0].x) * t,
                    pair[0].y + (pair[1].y - pair[0].y) * t,
                ));
            }
            remaining -= seg_len;
        }
    }

    parts.iter().rev().find_map(|part| part.last().copied())
}

fn line_length(line: &[Point]) -> f64 {
    line.windows(2).map(|pair| pair[0].distance(&pair[1])).sum()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
