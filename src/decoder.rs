use std::sync::{
    Arc,
    Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{error::DecodeError, io::geometry::GeometryDecoder};


pub const DEFAULT_DECODER_PATH: &str = "https://www.gstatic.com/draco/versioned/decoders/1.5.6/";

/// `draco_decoder` command line tool shipped with the draco sources.
pub const DEFAULT_NATIVE_DECODER: &str = "draco_decoder";


#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    Hash,
    PartialEq,
    Reflect,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DecoderMode {
    #[default]
    Js,
    Wasm,
}

impl DecoderMode {
    pub fn as_str(self) -> &'static str {
        match self {
            DecoderMode::Js => "js",
            DecoderMode::Wasm => "wasm",
        }
    }
}


#[derive(Clone, Debug, PartialEq, Eq, Reflect, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    pub decoder_path: String,
    pub mode: DecoderMode,
    /// native decoder program followed by any leading arguments
    pub native_command: Vec<String>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            decoder_path: DEFAULT_DECODER_PATH.to_string(),
            mode: DecoderMode::Js,
            native_command: vec![DEFAULT_NATIVE_DECODER.to_string()],
        }
    }
}


pub type DecoderFactory =
    Box<dyn Fn(&DecoderConfig) -> Result<Arc<dyn GeometryDecoder>, DecodeError> + Send + Sync>;

/// Owns the process-wide geometry decoder.
///
/// The decoder is created lazily on the first geometry decode, shared by every
/// load afterwards and disposed only by [`DecoderManager::shutdown`]. Per-model
/// teardown never touches it.
pub struct DecoderManager {
    config: DecoderConfig,
    factory: Option<DecoderFactory>,
    instance: Mutex<Option<Arc<dyn GeometryDecoder>>>,
    shut_down: AtomicBool,
    initializations: AtomicUsize,
}

impl DecoderManager {
    pub fn new(config: DecoderConfig, factory: DecoderFactory) -> Self {
        Self {
            config,
            factory: Some(factory),
            instance: Mutex::new(None),
            shut_down: AtomicBool::new(false),
            initializations: AtomicUsize::new(0),
        }
    }

    /// Manager without a geometry backend, geometry decodes report
    /// [`DecodeError::DecoderUnavailable`].
    pub fn unavailable(config: DecoderConfig) -> Self {
        Self {
            config,
            factory: None,
            instance: Mutex::new(None),
            shut_down: AtomicBool::new(false),
            initializations: AtomicUsize::new(0),
        }
    }

    /// Manager backed by the in-browser decoder on wasm and by the
    /// `draco_decoder` tool on native targets with the `draco_cli` feature.
    pub fn platform_default(config: DecoderConfig) -> Self {
        #[cfg(target_arch = "wasm32")]
        {
            Self::new(
                config,
                Box::new(|config: &DecoderConfig| {
                    Ok(Arc::new(crate::io::web::DracoJsDecoder::new(config))
                        as Arc<dyn GeometryDecoder>)
                }),
            )
        }

        #[cfg(all(not(target_arch = "wasm32"), feature = "draco_cli"))]
        {
            Self::new(
                config,
                Box::new(|config: &DecoderConfig| {
                    Ok(Arc::new(crate::io::native::DracoCliDecoder::new(config)?)
                        as Arc<dyn GeometryDecoder>)
                }),
            )
        }

        #[cfg(all(not(target_arch = "wasm32"), not(feature = "draco_cli")))]
        {
            Self::unavailable(config)
        }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Eagerly creates the shared decoder.
    pub fn init(&self) -> Result<(), DecodeError> {
        self.get().map(|_| ())
    }

    /// Shared decoder, created on first use.
    pub fn get(&self) -> Result<Arc<dyn GeometryDecoder>, DecodeError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(DecodeError::DecoderUnavailable(
                "decoder manager has been shut down".to_string(),
            ));
        }

        let mut instance = self
            .instance
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(decoder) = instance.as_ref() {
            return Ok(decoder.clone());
        }

        let factory = self.factory.as_ref().ok_or_else(|| {
            DecodeError::DecoderUnavailable("no geometry decoder backend on this platform".to_string())
        })?;

        let decoder = factory(&self.config)?;
        self.initializations.fetch_add(1, Ordering::AcqRel);
        info!(
            path = %self.config.decoder_path,
            mode = self.config.mode.as_str(),
            "geometry decoder initialized"
        );

        *instance = Some(decoder.clone());
        Ok(decoder)
    }

    /// Disposes the shared decoder; every later decode fails.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        let decoder = self
            .instance
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        if let Some(decoder) = decoder {
            decoder.dispose();
            info!("geometry decoder disposed");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.instance
            .lock()
            .map(|instance| instance.is_some())
            .unwrap_or(false)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Number of decoder instances ever created, at most one per manager.
    pub fn initialization_count(&self) -> usize {
        self.initializations.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for DecoderManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderManager")
            .field("config", &self.config)
            .field("initialized", &self.is_initialized())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
