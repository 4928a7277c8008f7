use crate::{
    cloud::PointBuffer,
    decoder::DecoderManager,
    error::DecodeError,
    model::CodecKind,
};

pub mod geometry;
pub mod ply;
pub mod source;

#[cfg(all(not(target_arch = "wasm32"), feature = "draco_cli"))]
pub mod native;

#[cfg(target_arch = "wasm32")]
pub mod web;


pub const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

pub fn is_gzip(payload: &[u8]) -> bool {
    payload.starts_with(&GZIP_MAGIC)
}

/// Decodes one tier payload with the decoder family of `codec`.
///
/// Only the geometry codec touches `decoders`; the shared decoder is created on
/// first use and reused afterwards.
pub async fn decode(
    payload: &[u8],
    codec: CodecKind,
    decoders: &DecoderManager,
) -> Result<PointBuffer, DecodeError> {
    match codec {
        CodecKind::Ply => ply::decode_ply(payload),
        CodecKind::Draco => {
            let decoder = decoders.get()?;
            geometry::decode_geometry(decoder.as_ref(), payload).await
        }
    }
}
