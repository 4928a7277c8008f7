use std::{fs, process::Command};

use bevy::{log::debug, tasks::BoxedFuture};

use crate::{
    cloud::PointBuffer,
    decoder::DecoderConfig,
    error::DecodeError,
    io::{
        geometry::{DecodedAttribute, DecodedGeometry, GeometryDecoder},
        ply::decode_ply,
    },
};


fn backend_error(err: std::io::Error) -> DecodeError {
    DecodeError::Backend(err.to_string())
}

fn to_geometry(buffer: PointBuffer) -> DecodedGeometry {
    DecodedGeometry {
        position: Some(DecodedAttribute::f32(3, buffer.positions().to_vec())),
        color: buffer.colors().map(|colors| DecodedAttribute::f32(3, colors.to_vec())),
        normal: buffer.normals().map(|normals| DecodedAttribute::f32(3, normals.to_vec())),
    }
}


/// Native geometry decoder driving the `draco_decoder` tool.
///
/// Every payload is written to its own scratch directory, converted to ply by
/// the tool and read back through the ply codec, so concurrent decodes never
/// share files.
#[derive(Clone, Debug)]
pub struct DracoCliDecoder {
    program: String,
    leading_args: Vec<String>,
}

impl DracoCliDecoder {
    /// Fails with [`DecodeError::DecoderUnavailable`] when the configured
    /// program cannot be started.
    pub fn new(config: &DecoderConfig) -> Result<Self, DecodeError> {
        let Some((program, leading_args)) = config.native_command.split_first() else {
            return Err(DecodeError::DecoderUnavailable(
                "native decoder command is empty".to_string(),
            ));
        };

        let decoder = Self {
            program: program.clone(),
            leading_args: leading_args.to_vec(),
        };

        // usage output and exit status are irrelevant, only spawning matters
        decoder.command().output().map_err(|err| {
            DecodeError::DecoderUnavailable(format!("`{program}` cannot be started: {err}"))
        })?;

        Ok(decoder)
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.leading_args);
        command
    }

    pub fn decode_blocking(&self, payload: &[u8]) -> Result<PointBuffer, DecodeError> {
        let scratch = tempfile::tempdir().map_err(backend_error)?;
        let input = scratch.path().join("payload.drc");
        let output = scratch.path().join("payload.ply");

        fs::write(&input, payload).map_err(backend_error)?;

        let result = self
            .command()
            .arg("-i")
            .arg(&input)
            .arg("-o")
            .arg(&output)
            .output()
            .map_err(backend_error)?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(DecodeError::Backend(format!(
                "`{}` exited with {}: {}",
                self.program,
                result.status,
                stderr.trim(),
            )));
        }

        let decoded = fs::read(&output).map_err(backend_error)?;
        debug!(
            compressed = payload.len(),
            decoded = decoded.len(),
            "draco payload converted to ply"
        );

        decode_ply(&decoded)
    }
}

impl GeometryDecoder for DracoCliDecoder {
    fn decode<'a>(
        &'a self,
        payload: &'a [u8],
    ) -> BoxedFuture<'a, Result<DecodedGeometry, DecodeError>> {
        Box::pin(async move { self.decode_blocking(payload).map(to_geometry) })
    }
}
