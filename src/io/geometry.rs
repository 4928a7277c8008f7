use bevy::tasks::BoxedFuture;

use crate::{cloud::PointBuffer, error::DecodeError};


#[derive(Clone, Debug, PartialEq)]
pub enum AttributeData {
    F32(Vec<f32>),
    U8(Vec<u8>),
    U16(Vec<u16>),
}

impl AttributeData {
    pub fn len(&self) -> usize {
        match self {
            AttributeData::F32(values) => values.len(),
            AttributeData::U8(values) => values.len(),
            AttributeData::U16(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn value(&self, index: usize, normalized: bool) -> f32 {
        match self {
            AttributeData::F32(values) => values[index],
            AttributeData::U8(values) if normalized => values[index] as f32 / 255.0,
            AttributeData::U8(values) => values[index] as f32,
            AttributeData::U16(values) if normalized => values[index] as f32 / 65535.0,
            AttributeData::U16(values) => values[index] as f32,
        }
    }
}


/// One decoded vertex attribute, `item_size` components per vertex.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedAttribute {
    pub item_size: usize,
    pub data: AttributeData,
}

impl DecodedAttribute {
    pub fn f32(item_size: usize, values: Vec<f32>) -> Self {
        Self {
            item_size,
            data: AttributeData::F32(values),
        }
    }

    pub fn u8(item_size: usize, values: Vec<u8>) -> Self {
        Self {
            item_size,
            data: AttributeData::U8(values),
        }
    }

    pub fn count(&self) -> usize {
        if self.item_size == 0 {
            0
        } else {
            self.data.len() / self.item_size
        }
    }

    // first three components of every item, extra components (alpha) dropped
    fn to_xyz(
        &self,
        attribute: &'static str,
        count: usize,
        normalized: bool,
    ) -> Result<Vec<f32>, DecodeError> {
        if self.item_size < 3 || self.count() != count {
            return Err(DecodeError::AttributeLength {
                attribute,
                expected: count * self.item_size.max(3),
                found: self.data.len(),
            });
        }

        let mut out = Vec::with_capacity(count * 3);
        for i in 0..count {
            let base = i * self.item_size;
            out.extend((0..3).map(|c| self.data.value(base + c, normalized)));
        }

        Ok(out)
    }
}


/// Attributes handed back by a geometry-codec backend.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodedGeometry {
    pub position: Option<DecodedAttribute>,
    pub color: Option<DecodedAttribute>,
    pub normal: Option<DecodedAttribute>,
}


/// Third-party geometry decompressor shared by every geometry-codec load.
///
/// Concurrent `decode` calls against one instance must be independent.
pub trait GeometryDecoder: Send + Sync + 'static {
    fn decode<'a>(
        &'a self,
        payload: &'a [u8],
    ) -> BoxedFuture<'a, Result<DecodedGeometry, DecodeError>>;

    /// Releases backend resources, called once at shutdown.
    fn dispose(&self) {}
}


/// Converts backend output into a [`PointBuffer`]: integer colors are
/// normalized to unit range and rgba colors reduced to rgb.
pub fn geometry_to_points(geometry: DecodedGeometry) -> Result<PointBuffer, DecodeError> {
    let position = geometry.position.ok_or(DecodeError::MissingPosition)?;
    let count = position.count();

    let positions = position.to_xyz("positions", count, false)?;
    let colors = geometry
        .color
        .map(|color| color.to_xyz("colors", count, true))
        .transpose()?;
    let normals = geometry
        .normal
        .map(|normal| normal.to_xyz("normals", count, false))
        .transpose()?;

    PointBuffer::new(positions, colors, normals)
}

pub async fn decode_geometry(
    decoder: &dyn GeometryDecoder,
    payload: &[u8],
) -> Result<PointBuffer, DecodeError> {
    let geometry = decoder.decode(payload).await?;
    geometry_to_points(geometry)
}
