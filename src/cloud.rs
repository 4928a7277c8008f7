use bevy::prelude::*;
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::error::DecodeError;


/// Axis aligned box and bounding sphere of a decoded cloud.
#[derive(Clone, Copy, Debug, PartialEq, Reflect)]
pub struct PointBounds {
    pub min: Vec3,
    pub max: Vec3,
    pub center: Vec3,
    pub radius: f32,
}

impl PointBounds {
    pub fn from_positions(positions: &[f32]) -> Option<Self> {
        let mut points = positions
            .chunks_exact(3)
            .map(|p| Vec3::new(p[0], p[1], p[2]));

        let first = points.next()?;
        let (min, max) = points.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));

        let center = (min + max) * 0.5;
        let radius = positions
            .chunks_exact(3)
            .map(|p| center.distance_squared(Vec3::new(p[0], p[1], p[2])))
            .fold(0.0_f32, f32::max)
            .sqrt();

        Some(Self {
            min,
            max,
            center,
            radius,
        })
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }
}


/// Decoded point cloud: flattened xyz positions with optional unit-range
/// colors and normals of matching length.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointBuffer {
    positions: Vec<f32>,
    colors: Option<Vec<f32>>,
    normals: Option<Vec<f32>>,
    bounds: Option<PointBounds>,
}

impl PointBuffer {
    pub fn new(
        positions: Vec<f32>,
        colors: Option<Vec<f32>>,
        normals: Option<Vec<f32>>,
    ) -> Result<Self, DecodeError> {
        if positions.len() % 3 != 0 {
            return Err(DecodeError::AttributeLength {
                attribute: "positions",
                expected: positions.len() - positions.len() % 3,
                found: positions.len(),
            });
        }

        for (attribute, values) in [("colors", &colors), ("normals", &normals)] {
            if let Some(values) = values {
                if values.len() != positions.len() {
                    return Err(DecodeError::AttributeLength {
                        attribute,
                        expected: positions.len(),
                        found: values.len(),
                    });
                }
            }
        }

        let bounds = PointBounds::from_positions(&positions);

        Ok(Self {
            positions,
            colors,
            normals,
            bounds,
        })
    }

    // strided copies of a validated buffer keep attribute parity
    pub(crate) fn from_sampled(
        positions: Vec<f32>,
        colors: Option<Vec<f32>>,
        normals: Option<Vec<f32>>,
    ) -> Self {
        Self {
            bounds: PointBounds::from_positions(&positions),
            positions,
            colors,
            normals,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[f32] {
        &self.positions
    }

    pub fn colors(&self) -> Option<&[f32]> {
        self.colors.as_deref()
    }

    pub fn normals(&self) -> Option<&[f32]> {
        self.normals.as_deref()
    }

    pub fn bounds(&self) -> Option<&PointBounds> {
        self.bounds.as_ref()
    }

    pub fn position(&self, index: usize) -> [f32; 3] {
        let i = index * 3;
        [self.positions[i], self.positions[i + 1], self.positions[i + 2]]
    }
}


/// Seeded random cloud with colors and unit normals, used by benches and tests.
pub fn random_points(count: usize, seed: u64) -> PointBuffer {
    let mut rng = StdRng::seed_from_u64(seed);

    let mut positions: Vec<f32> = Vec::with_capacity(count * 3);
    let mut colors = Vec::with_capacity(count * 3);
    let mut normals = Vec::with_capacity(count * 3);

    for _ in 0..count {
        positions.extend([
            rng.gen_range(-10.0..10.0),
            rng.gen_range(-10.0..10.0),
            rng.gen_range(-10.0..10.0),
        ]);
        colors.extend([rng.r#gen::<f32>(), rng.r#gen::<f32>(), rng.r#gen::<f32>()]);

        let normal = Vec3::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        )
        .try_normalize()
        .unwrap_or(Vec3::Y);
        normals.extend(normal.to_array());
    }

    PointBuffer {
        bounds: PointBounds::from_positions(&positions),
        positions,
        colors: Some(colors),
        normals: Some(normals),
    }
}
