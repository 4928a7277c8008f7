use std::cell::RefCell;

use bevy::{log::info, tasks::BoxedFuture};
use js_sys::{Float32Array, Function, Object, Promise, Reflect, Uint8Array, Uint16Array};
use wasm_bindgen::{JsCast, JsValue, prelude::*};
use wasm_bindgen_futures::JsFuture;

use crate::{
    decoder::DecoderConfig,
    error::DecodeError,
    io::geometry::{AttributeData, DecodedAttribute, DecodedGeometry, GeometryDecoder},
};


#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = THREE)]
    type DRACOLoader;

    #[wasm_bindgen(constructor, js_namespace = THREE)]
    fn new() -> DRACOLoader;

    #[wasm_bindgen(method, js_name = setDecoderPath)]
    fn set_decoder_path(this: &DRACOLoader, path: &str);

    #[wasm_bindgen(method, js_name = setDecoderConfig)]
    fn set_decoder_config(this: &DRACOLoader, config: &JsValue);

    #[wasm_bindgen(method)]
    fn parse(this: &DRACOLoader, buffer: &JsValue, on_load: &Function, on_error: &Function);

    #[wasm_bindgen(method)]
    fn dispose(this: &DRACOLoader);
}

// the page runs one js thread, the loader never leaves it
thread_local! {
    static LOADER: RefCell<Option<DRACOLoader>> = const { RefCell::new(None) };
}


fn js_error(value: JsValue) -> DecodeError {
    DecodeError::Backend(
        value
            .as_string()
            .unwrap_or_else(|| format!("{value:?}")),
    )
}


/// Browser geometry decoder backed by the three.js draco loader, which must
/// be present on the page as `THREE.DRACOLoader`.
pub struct DracoJsDecoder {
    config: DecoderConfig,
}

impl DracoJsDecoder {
    pub fn new(config: &DecoderConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    fn with_loader<T>(&self, f: impl FnOnce(&DRACOLoader) -> T) -> Result<T, DecodeError> {
        LOADER.with(|cell| {
            let mut loader = cell.borrow_mut();
            if loader.is_none() {
                let created = DRACOLoader::new();
                created.set_decoder_path(&self.config.decoder_path);

                let decoder_config = Object::new();
                Reflect::set(
                    &decoder_config,
                    &JsValue::from_str("type"),
                    &JsValue::from_str(self.config.mode.as_str()),
                )
                .map_err(js_error)?;
                created.set_decoder_config(&decoder_config);

                info!("draco js loader created");
                *loader = Some(created);
            }

            loader
                .as_ref()
                .map(f)
                .ok_or_else(|| DecodeError::DecoderUnavailable("draco loader missing".to_string()))
        })
    }
}

fn attribute(geometry: &JsValue, name: &str) -> Result<Option<DecodedAttribute>, DecodeError> {
    let attributes = Reflect::get(geometry, &JsValue::from_str("attributes")).map_err(js_error)?;
    let attribute = Reflect::get(&attributes, &JsValue::from_str(name)).map_err(js_error)?;
    if attribute.is_undefined() || attribute.is_null() {
        return Ok(None);
    }

    let item_size = Reflect::get(&attribute, &JsValue::from_str("itemSize"))
        .map_err(js_error)?
        .as_f64()
        .unwrap_or(3.0) as usize;
    let array = Reflect::get(&attribute, &JsValue::from_str("array")).map_err(js_error)?;

    let data = if let Some(values) = array.dyn_ref::<Float32Array>() {
        AttributeData::F32(values.to_vec())
    } else if let Some(values) = array.dyn_ref::<Uint8Array>() {
        AttributeData::U8(values.to_vec())
    } else if let Some(values) = array.dyn_ref::<Uint16Array>() {
        AttributeData::U16(values.to_vec())
    } else {
        return Err(DecodeError::Backend(format!(
            "unsupported array type for attribute `{name}`"
        )));
    };

    Ok(Some(DecodedAttribute { item_size, data }))
}

impl GeometryDecoder for DracoJsDecoder {
    fn decode<'a>(
        &'a self,
        payload: &'a [u8],
    ) -> BoxedFuture<'a, Result<DecodedGeometry, DecodeError>> {
        Box::pin(async move {
            let buffer = Uint8Array::from(payload).buffer();

            let promise = self.with_loader(|loader| {
                Promise::new(&mut |resolve, reject| {
                    loader.parse(&buffer, &resolve, &reject);
                })
            })?;

            let geometry = JsFuture::from(promise).await.map_err(js_error)?;

            let decoded = DecodedGeometry {
                position: attribute(&geometry, "position")?,
                color: attribute(&geometry, "color")?,
                normal: attribute(&geometry, "normal")?,
            };

            if let Ok(dispose) = Reflect::get(&geometry, &JsValue::from_str("dispose")) {
                if let Some(dispose) = dispose.dyn_ref::<Function>() {
                    let _ = dispose.call0(&geometry);
                }
            }

            Ok(decoded)
        })
    }

    fn dispose(&self) {
        LOADER.with(|cell| {
            if let Some(loader) = cell.borrow_mut().take() {
                loader.dispose();
            }
        });
    }
}

