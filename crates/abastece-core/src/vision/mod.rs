//! Field extraction through a hosted vision-language model.
//!
//! The model receives the instruction below plus one or more region images
//! and answers with a JSON object keyed by the receipt field keys. Transport
//! lives behind [`VisionClient`]; [`ModelChain`] tries models in order until
//! one returns a usable JSON object.

#[cfg(feature = "native")]
pub mod openrouter;

#[cfg(feature = "native")]
pub use openrouter::OpenRouterClient;

use std::io::Cursor;

use base64::Engine as _;
use image::{DynamicImage, ImageFormat};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::{ModelAttempt, VisionError};
use crate::models::config::VisionConfig;
use crate::segment::RegionImage;

/// Instruction sent with every request.
pub const RECEIPT_INSTRUCTION: &str = "\
Analise esta imagem de um cupom de abastecimento e extraia EXATAMENTE os campos abaixo.

1. numero_documento: número do documento, normalmente 4 dígitos, junto ao número de série e à NF-e.
2. data_documento: data de emissão no formato DD/MM/AAAA.
3. hora_documento: hora de emissão no formato HH:MM.
4. tipo_combustível: retorne apenas a sigla. 3 = D (Diesel S500), 4 = DS (Diesel S10), 5 = G (Gasolina), E = Etanol.
5. quantidade: quantidade abastecida, no formato do documento.
6. valor_unitario: preço por litro, no formato do documento.
7. valor_total: valor total da compra, no formato do documento.
8. placa: placa do veículo no formato ABC1234 ou ABC1D23; se não reconhecer, retorne null.
9. km: quilometragem do veículo.
10. modelo_veiculo: modelo do veículo, em frente a OBS, acima de MOTORISTA. Não confunda com o nome do motorista.

Regras:
- Retorne APENAS um objeto JSON válido com essas chaves.
- Use null para campos não encontrados ou ilegíveis.
- Retorne textos em maiúsculas.
- Inclua certeza_ia: sua confiança geral na leitura, de 0 a 1.

Formato:
{\"data_documento\": null, \"hora_documento\": null, \"tipo_combustível\": null, \
\"quantidade\": null, \"valor_unitario\": null, \"valor_total\": null, \
\"numero_documento\": null, \"placa\": null, \"km\": null, \"modelo_veiculo\": null, \
\"certeza_ia\": null}";

/// An image attached to a request, as a PNG data URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisionImage {
    pub label: String,
    pub data_url: String,
}

impl VisionImage {
    /// Encode an image as a base64 PNG data URL.
    pub fn from_image(label: impl Into<String>, image: &DynamicImage) -> Result<Self, VisionError> {
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| VisionError::Encoding(e.to_string()))?;

        let encoded = base64::engine::general_purpose::STANDARD.encode(&png);
        Ok(Self {
            label: label.into(),
            data_url: format!("data:image/png;base64,{encoded}"),
        })
    }
}

/// Instruction plus images for one model call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisionRequest {
    pub instruction: String,
    pub images: Vec<VisionImage>,
}

impl VisionRequest {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            images: Vec::new(),
        }
    }

    /// Receipt instruction with a single image.
    pub fn receipt(image: VisionImage) -> Self {
        Self::new(RECEIPT_INSTRUCTION).with_image(image)
    }

    pub fn with_image(mut self, image: VisionImage) -> Self {
        self.images.push(image);
        self
    }

    /// Receipt instruction with every non-empty region attached.
    pub fn for_regions(regions: &[RegionImage]) -> Result<Self, VisionError> {
        let mut request = Self::new(RECEIPT_INSTRUCTION);
        for part in regions {
            if let Some(image) = &part.image {
                request = request.with_image(VisionImage::from_image(&part.region.label, image)?);
            }
        }
        Ok(request)
    }
}

/// Sends a request to one model and returns the raw assistant text.
pub trait VisionClient {
    fn complete(&self, model: &str, request: &VisionRequest) -> Result<String, VisionError>;
}

/// Successful chain run.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainResponse {
    /// Model that produced the answer.
    pub model: String,
    /// Parsed JSON object.
    pub fields: Map<String, Value>,
    /// Models that failed before it.
    pub failures: Vec<ModelAttempt>,
}

/// Ordered list of models tried until one succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelChain {
    models: Vec<String>,
}

impl ModelChain {
    /// Build a chain. Blank and repeated identifiers are dropped.
    pub fn new<I, S>(models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for model in models {
            let model = model.into().trim().to_string();
            if !model.is_empty() && !unique.contains(&model) {
                unique.push(model);
            }
        }
        Self { models: unique }
    }

    pub fn from_config(config: &VisionConfig) -> Self {
        Self::new(config.models.iter().cloned())
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Try each model in order.
    ///
    /// Transport errors, HTTP errors, empty responses and answers without a
    /// parsable JSON object all move on to the next model. A missing API key
    /// stops immediately since no model can succeed.
    pub fn run(
        &self,
        client: &dyn VisionClient,
        request: &VisionRequest,
    ) -> Result<ChainResponse, VisionError> {
        if self.models.is_empty() {
            return Err(VisionError::NoModels);
        }

        let mut failures = Vec::new();

        for model in &self.models {
            info!("Sending {} image(s) to {}", request.images.len(), model);

            let outcome = client
                .complete(model, request)
                .and_then(|text| extract_json_object(&text));

            match outcome {
                Ok(fields) => {
                    info!("{} answered with {} keys", model, fields.len());
                    return Ok(ChainResponse {
                        model: model.clone(),
                        fields,
                        failures,
                    });
                }
                Err(VisionError::MissingApiKey(var)) => {
                    return Err(VisionError::MissingApiKey(var));
                }
                Err(e) => {
                    warn!("Model {} failed: {}", model, e);
                    failures.push(ModelAttempt {
                        model: model.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        Err(VisionError::AllModelsFailed(failures))
    }
}

/// Locate and parse the JSON object in a model answer.
///
/// The object spans from the first `{` to the last `}`, which tolerates
/// prose or code fences around it.
pub fn extract_json_object(text: &str) -> Result<Map<String, Value>, VisionError> {
    let start = text.find('{').ok_or(VisionError::NoJson)?;
    let end = text.rfind('}').ok_or(VisionError::NoJson)?;
    if end < start {
        return Err(VisionError::NoJson);
    }

    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(VisionError::MalformedJson(format!(
            "expected an object, got {other}"
        ))),
        Err(e) => Err(VisionError::MalformedJson(e.to_string())),
    }
}
