//! Geographic coordinate type and spatial utilities.
//!
//! `GeoPoint` uses `f64` latitude/longitude.  Route progress is computed
//! from cumulative along-route distances that reach tens of kilometres, and
//! single precision would leave metre-scale jitter in the projection.

use serde::{Deserialize, Serialize};

/// Mean Earth radius, metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS-84 geographic coordinate.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Result of projecting a point onto one polyline segment `a → b`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SegmentProjection {
    /// Position of the foot of the perpendicular along the segment, `[0, 1]`.
    pub t: f64,
    /// Distance in metres from the projected point to the foot.
    pub distance_m: f64,
    /// The foot itself.
    pub foot: GeoPoint,
}

impl GeoPoint {
    #[inline]
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// `true` if both coordinates are finite and inside the WGS-84 range.
    pub fn is_valid(self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    /// Haversine great-circle distance in metres.
    pub fn distance_m(self, other: GeoPoint) -> f64 {
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lon = (other.lon - self.lon).to_radians();

        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();

        let a = (d_lat * 0.5).sin().powi(2)
            + lat1.cos() * lat2.cos() * (d_lon * 0.5).sin().powi(2);

        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_M * c
    }

    /// Linear interpolation between `self` and `other` in degree space.
    /// Adequate for the sub-kilometre segments of a bus route polyline.
    #[inline]
    pub fn lerp(self, other: GeoPoint, t: f64) -> GeoPoint {
        GeoPoint {
            lat: self.lat + (other.lat - self.lat) * t,
            lon: self.lon + (other.lon - self.lon) * t,
        }
    }

    /// East/north offset of `self` from `origin` in metres, using an
    /// equirectangular approximation centred on `origin`.
    #[inline]
    pub fn local_offset_m(self, origin: GeoPoint) -> (f64, f64) {
        let x = (self.lon - origin.lon).to_radians() * EARTH_RADIUS_M * origin.lat.to_radians().cos();
        let y = (self.lat - origin.lat).to_radians() * EARTH_RADIUS_M;
        (x, y)
    }

    /// Perpendicular projection of `self` onto the segment `a → b`, clamped
    /// to the segment's end points.
    pub fn project_onto_segment(self, a: GeoPoint, b: GeoPoint) -> SegmentProjection {
        let (bx, by) = b.local_offset_m(a);
        let (px, py) = self.local_offset_m(a);

        let len2 = bx * bx + by * by;
        let t = if len2 <= f64::EPSILON {
            0.0
        } else {
            ((px * bx + py * by) / len2).clamp(0.0, 1.0)
        };

        let foot = a.lerp(b, t);
        SegmentProjection {
            t,
            distance_m: self.distance_m(foot),
            foot,
        }
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lon)
    }
}
