use serde_derive::{Deserialize, Serialize};

use crate::error::{Error, Operation, Result};

/// Parameters for a new image generation.
///
/// Optional fields are only sent when present, leaving the remote defaults
/// in charge otherwise. `Some(0)` is a real value and is sent as such; empty
/// strings count as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationRequest {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub model_id: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub num_images: Option<u32>,
    pub seed: Option<u64>,
    pub style_uuid: Option<String>,
    pub contrast: Option<f64>,
    pub guidance_scale: Option<f64>,
    pub alchemy: bool,
    pub ultra: bool,
    pub private: bool,
    pub tags: Vec<String>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_negative_prompt(mut self, negative_prompt: impl Into<String>) -> Self {
        self.negative_prompt = Some(negative_prompt.into());
        self
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_num_images(mut self, num_images: u32) -> Self {
        self.num_images = Some(num_images);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_style(mut self, style_uuid: impl Into<String>) -> Self {
        self.style_uuid = Some(style_uuid.into());
        self
    }

    pub fn with_contrast(mut self, contrast: f64) -> Self {
        self.contrast = Some(contrast);
        self
    }

    pub fn with_guidance_scale(mut self, guidance_scale: f64) -> Self {
        self.guidance_scale = Some(guidance_scale);
        self
    }

    pub fn with_alchemy(mut self) -> Self {
        self.alchemy = true;
        self
    }

    pub fn with_ultra(mut self) -> Self {
        self.ultra = true;
        self
    }

    pub fn with_private(mut self, private: bool) -> Self {
        self.private = private;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Image count sent to the API; unset or zero means one image.
    pub fn resolved_num_images(&self) -> u32 {
        self.num_images.filter(|n| *n > 0).unwrap_or(1)
    }
}

/// Body of `POST /generations`.
///
/// The API speaks of visibility as `public`, so a private request is sent
/// as `"public": false` and a non-private one leaves the key out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateGenerationPayload {
    pub prompt: String,
    #[serde(default)]
    pub num_images: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(rename = "modelId", skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(rename = "styleUUID", skip_serializing_if = "Option::is_none")]
    pub style_uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contrast: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guidance_scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alchemy: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ultra: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|s| !s.is_empty()).cloned()
}

fn flag(value: bool) -> Option<bool> {
    value.then_some(true)
}

impl From<&GenerationRequest> for CreateGenerationPayload {
    fn from(request: &GenerationRequest) -> Self {
        Self {
            prompt: request.prompt.clone(),
            num_images: request.resolved_num_images(),
            negative_prompt: non_empty(&request.negative_prompt),
            model_id: non_empty(&request.model_id),
            width: request.width,
            height: request.height,
            seed: request.seed,
            style_uuid: non_empty(&request.style_uuid),
            contrast: request.contrast,
            guidance_scale: request.guidance_scale,
            alchemy: flag(request.alchemy),
            ultra: flag(request.ultra),
            public: request.private.then_some(false),
            tags: request.tags.clone(),
        }
    }
}

impl From<CreateGenerationPayload> for GenerationRequest {
    fn from(payload: CreateGenerationPayload) -> Self {
        Self {
            prompt: payload.prompt,
            negative_prompt: payload.negative_prompt,
            model_id: payload.model_id,
            width: payload.width,
            height: payload.height,
            num_images: Some(payload.num_images).filter(|n| *n > 0),
            seed: payload.seed,
            style_uuid: payload.style_uuid,
            contrast: payload.contrast,
            guidance_scale: payload.guidance_scale,
            alchemy: payload.alchemy.unwrap_or(false),
            ultra: payload.ultra.unwrap_or(false),
            private: payload.public == Some(false),
            tags: payload.tags,
        }
    }
}

/// Serializes the create-generation body for `request`.
pub fn encode_request(request: &GenerationRequest) -> Result<Vec<u8>> {
    serde_json::to_vec(&CreateGenerationPayload::from(request)).map_err(|source| Error::Encode {
        operation: Operation::CreateGeneration,
        source,
    })
}

/// Reads a create-generation body, such as one echoed back by a server,
/// into the request it describes.
pub fn decode_request(body: &[u8]) -> Result<GenerationRequest> {
    serde_json::from_slice::<CreateGenerationPayload>(body)
        .map(GenerationRequest::from)
        .map_err(|source| Error::Decode {
            operation: Operation::CreateGeneration,
            source,
            body: body.to_vec(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map, Value};

    fn encoded(request: &GenerationRequest) -> Map<String, Value> {
        let body = encode_request(request).unwrap();
        match serde_json::from_slice(&body).unwrap() {
            Value::Object(map) => map,
            other => panic!("expected a JSON object, got {other}"),
        }
    }

    fn keys(map: &Map<String, Value>) -> Vec<&str> {
        let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    #[test]
    fn unset_request_sends_only_prompt_and_count() {
        let map = encoded(&GenerationRequest::new("a sunset over the ocean"));
        assert_eq!(keys(&map), vec!["num_images", "prompt"]);
        assert_eq!(map["prompt"], json!("a sunset over the ocean"));
        assert_eq!(map["num_images"], json!(1));
    }

    #[test]
    fn empty_strings_and_lists_are_left_out() {
        let mut request = GenerationRequest::new("p");
        request.negative_prompt = Some(String::new());
        request.model_id = Some(String::new());
        request.style_uuid = Some(String::new());
        request.tags = Vec::new();
        assert_eq!(keys(&encoded(&request)), vec!["num_images", "prompt"]);
    }

    #[test]
    fn zero_image_count_resolves_to_one() {
        let map = encoded(&GenerationRequest::new("p").with_num_images(0));
        assert_eq!(map["num_images"], json!(1));
    }

    #[test]
    fn explicit_image_count_is_sent() {
        let map = encoded(&GenerationRequest::new("p").with_num_images(4));
        assert_eq!(map["num_images"], json!(4));
    }

    #[test]
    fn width_is_sent_when_set() {
        let mut request = GenerationRequest::new("p");
        request.width = Some(1024);
        let map = encoded(&request);
        assert_eq!(map["width"], json!(1024));
        assert!(!map.contains_key("height"));
    }

    #[test]
    fn height_is_sent_when_set() {
        let mut request = GenerationRequest::new("p");
        request.height = Some(768);
        let map = encoded(&request);
        assert_eq!(map["height"], json!(768));
        assert!(!map.contains_key("width"));
    }

    #[test]
    fn seed_is_sent_when_set() {
        let map = encoded(&GenerationRequest::new("p").with_seed(42));
        assert_eq!(map["seed"], json!(42));
    }

    #[test]
    fn explicit_zero_seed_is_sent() {
        let map = encoded(&GenerationRequest::new("p").with_seed(0));
        assert_eq!(map["seed"], json!(0));
    }

    #[test]
    fn contrast_is_sent_when_set() {
        let map = encoded(&GenerationRequest::new("p").with_contrast(2.5));
        assert_eq!(map["contrast"], json!(2.5));
    }

    #[test]
    fn guidance_scale_is_sent_when_set() {
        let map = encoded(&GenerationRequest::new("p").with_guidance_scale(8.0));
        assert_eq!(map["guidance_scale"], json!(8.0));
    }

    #[test]
    fn style_uuid_uses_api_key() {
        let map = encoded(&GenerationRequest::new("p").with_style("style-123"));
        assert_eq!(map["styleUUID"], json!("style-123"));
    }

    #[test]
    fn model_id_uses_api_key() {
        let map = encoded(&GenerationRequest::new("p").with_model("model-abc"));
        assert_eq!(map["modelId"], json!("model-abc"));
    }

    #[test]
    fn negative_prompt_is_sent_when_set() {
        let map = encoded(&GenerationRequest::new("p").with_negative_prompt("low quality"));
        assert_eq!(map["negative_prompt"], json!("low quality"));
    }

    #[test]
    fn alchemy_is_sent_when_enabled() {
        let map = encoded(&GenerationRequest::new("p").with_alchemy());
        assert_eq!(map["alchemy"], json!(true));
        assert!(!map.contains_key("ultra"));
    }

    #[test]
    fn ultra_is_sent_when_enabled() {
        let map = encoded(&GenerationRequest::new("p").with_ultra());
        assert_eq!(map["ultra"], json!(true));
        assert!(!map.contains_key("alchemy"));
    }

    #[test]
    fn private_request_is_sent_as_not_public() {
        let map = encoded(&GenerationRequest::new("p").with_private(true));
        assert_eq!(map["public"], json!(false));
    }

    #[test]
    fn non_private_request_leaves_visibility_to_api() {
        let map = encoded(&GenerationRequest::new("p").with_private(false));
        assert!(!map.contains_key("public"));
        assert!(!map.contains_key("private"));
    }

    #[test]
    fn tags_keep_their_order() {
        let map = encoded(&GenerationRequest::new("p").with_tags(["landscape", "sunset"]));
        assert_eq!(map["tags"], json!(["landscape", "sunset"]));
    }

    #[test]
    fn decoding_an_encoded_request_restores_it() {
        let request = GenerationRequest::new("a castle in the clouds")
            .with_negative_prompt("blurry")
            .with_model("model-42")
            .with_size(1920, 1080)
            .with_num_images(4)
            .with_seed(7)
            .with_style("style-uuid-99")
            .with_contrast(3.5)
            .with_guidance_scale(7.0)
            .with_alchemy()
            .with_ultra()
            .with_private(true)
            .with_tags(["castle"]);

        let body = encode_request(&request).unwrap();
        assert_eq!(decode_request(&body).unwrap(), request);
    }

    #[test]
    fn decoding_garbage_is_an_error() {
        let err = decode_request(b"not json").unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
        assert_eq!(err.raw_body(), Some(&b"not json"[..]));
    }
}
