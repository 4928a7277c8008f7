use std::borrow::Cow;

use bevy::log::warn;

use crate::cloud::PointBuffer;


/// Source stride for a resolution factor, never below 1.
pub fn sample_step(resolution: f32) -> usize {
    if !resolution.is_finite() || resolution <= 0.0 {
        warn!(resolution, "invalid resolution factor, sampling at full resolution");
        return 1;
    }

    ((1.0 / resolution).floor() as usize).max(1)
}

/// Number of points kept from `vertex_count` points at `resolution`.
pub fn sampled_count(vertex_count: usize, resolution: f32) -> usize {
    if resolution == 1.0 {
        return vertex_count;
    }

    vertex_count / sample_step(resolution)
}

fn stride(values: &[f32], step: usize, count: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(count * 3);
    for i in 0..count {
        let source = i * step * 3;
        out.extend_from_slice(&values[source..source + 3]);
    }
    out
}

/// Deterministic stride sub-sampling of every attribute of `buffer`.
///
/// A resolution of exactly `1.0` borrows the input untouched; factors above
/// one degrade to full resolution rather than upsampling.
pub fn sample(buffer: &PointBuffer, resolution: f32) -> Cow<'_, PointBuffer> {
    if resolution == 1.0 {
        return Cow::Borrowed(buffer);
    }

    let step = sample_step(resolution);
    let count = buffer.vertex_count() / step;

    let positions = stride(buffer.positions(), step, count);
    let colors = buffer.colors().map(|colors| stride(colors, step, count));
    let normals = buffer.normals().map(|normals| stride(normals, step, count));

    Cow::Owned(PointBuffer::from_sampled(positions, colors, normals))
}
