use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use bevy::log::debug;

use crate::{
    cloud::PointBuffer,
    decoder::DecoderManager,
    error::LoadError,
    io::{decode, source::PayloadSource},
    model::{CodecKind, ModelId},
    tier::QualityTier,
};


/// Capability to abort a tier load, shared between the owning model state and
/// the running load.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// True when both handles control the same load.
    pub fn same_as(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn check(&self) -> Result<(), LoadError> {
        if self.is_cancelled() {
            Err(LoadError::Cancelled)
        } else {
            Ok(())
        }
    }
}


/// One tier fetch handed out by the pipeline.
#[derive(Clone, Debug)]
pub struct LoadJob {
    pub model: ModelId,
    pub tier: QualityTier,
    pub location: String,
    pub codec: CodecKind,
    pub token: CancelToken,
}

impl LoadJob {
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}


/// Fetches and decodes one tier, giving up at the next suspension point once
/// the job's token is cancelled.
pub async fn load_tier(
    job: &LoadJob,
    source: &dyn PayloadSource,
    decoders: &DecoderManager,
) -> Result<PointBuffer, LoadError> {
    job.token.check()?;

    debug!(model = %job.model, tier = %job.tier, location = %job.location, "fetching tier");
    let payload = source.fetch(&job.location).await?;

    job.token.check()?;

    let buffer = decode(&payload, job.codec, decoders).await?;

    job.token.check()?;

    Ok(buffer)
}
