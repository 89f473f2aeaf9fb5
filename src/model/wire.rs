//! Response envelopes of the Leonardo REST API.
//!
//! Only the fields the client reads are modelled. Parsing the envelope has to
//! succeed; below it every field is optional, and a missing key, a `null` or a
//! value of an unexpected type all decode as "absent".

use serde::de::DeserializeOwned;
use serde::Deserializer;
use serde_derive::Deserialize;
use serde_json::{Map, Value};

use crate::error::{Error, Operation, Result};
use crate::model::response::{
    DeleteResponse, GenerationListItem, GenerationListResponse, GenerationResponse,
    GenerationStatus, UserInfo,
};

fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value: Value = serde::Deserialize::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Keeps the array elements that decode as `T` and drops the rest.
fn lenient_seq<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value: Value = serde::Deserialize::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct CreateEnvelope {
    #[serde(rename = "sdGenerationJob", default, deserialize_with = "lenient")]
    job: Option<GenerationJob>,
}

#[derive(Debug, Default, Deserialize)]
struct GenerationJob {
    #[serde(rename = "generationId", default, deserialize_with = "lenient")]
    generation_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StatusEnvelope {
    #[serde(rename = "generations_by_pk", default, deserialize_with = "lenient")]
    generation: Option<GenerationRecord>,
}

/// A generation as returned by both the status and the list endpoints.
#[derive(Debug, Default, Deserialize)]
struct GenerationRecord {
    #[serde(default, deserialize_with = "lenient")]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    status: Option<String>,
    #[serde(rename = "createdAt", default, deserialize_with = "lenient")]
    created_at: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    prompt: Option<String>,
    #[serde(rename = "generated_images", default, deserialize_with = "lenient_seq")]
    images: Vec<GeneratedImage>,
}

#[derive(Debug, Deserialize)]
struct GeneratedImage {
    url: String,
}

fn urls(images: Vec<GeneratedImage>) -> Vec<String> {
    images.into_iter().map(|image| image.url).collect()
}

#[derive(Debug, Default, Deserialize)]
struct DeleteEnvelope {
    #[serde(rename = "delete_generations_by_pk", default, deserialize_with = "lenient")]
    deleted: Option<DeletedGeneration>,
}

#[derive(Debug, Default, Deserialize)]
struct DeletedGeneration {
    #[serde(default, deserialize_with = "lenient")]
    id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UserEnvelope {
    #[serde(rename = "user_details", default, deserialize_with = "lenient_seq")]
    details: Vec<UserDetails>,
}

#[derive(Debug, Default, Deserialize)]
struct UserDetails {
    #[serde(default, deserialize_with = "lenient")]
    user: Option<UserRef>,
    #[serde(rename = "apiSubscriptionTokens", default, deserialize_with = "lenient")]
    subscription_tokens: Option<f64>,
    #[serde(rename = "apiPaidTokens", default, deserialize_with = "lenient")]
    paid_tokens: Option<f64>,
    #[serde(rename = "apiPlanTokenRenewalDate", default, deserialize_with = "lenient")]
    token_renewal_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UserRef {
    #[serde(default, deserialize_with = "lenient")]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    username: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ListEnvelope {
    #[serde(default, deserialize_with = "lenient_seq")]
    generations: Vec<GenerationRecord>,
}

/// The body has to be a JSON object. An empty body, as sent with a 204,
/// reads as `{}`.
fn envelope<T: DeserializeOwned>(operation: Operation, raw: &[u8]) -> Result<T> {
    let decode_error = |source: serde_json::Error| Error::Decode {
        operation,
        source,
        body: raw.to_vec(),
    };
    let object = if raw.iter().all(u8::is_ascii_whitespace) {
        Map::new()
    } else {
        serde_json::from_slice::<Map<String, Value>>(raw).map_err(decode_error)?
    };
    serde_json::from_value(Value::Object(object)).map_err(decode_error)
}

/// Token balances travel as JSON numbers; fractions are dropped.
fn tokens(value: Option<f64>) -> i64 {
    value.map(|t| t.trunc() as i64).unwrap_or_default()
}

pub fn decode_create(raw: Vec<u8>) -> Result<GenerationResponse> {
    let envelope: CreateEnvelope = envelope(Operation::CreateGeneration, &raw)?;
    Ok(GenerationResponse {
        generation_id: envelope
            .job
            .and_then(|job| job.generation_id)
            .unwrap_or_default(),
        raw,
    })
}

pub fn decode_status(raw: Vec<u8>) -> Result<GenerationStatus> {
    let envelope: StatusEnvelope = envelope(Operation::GenerationStatus, &raw)?;
    let generation = envelope.generation.unwrap_or_default();
    Ok(GenerationStatus {
        status: generation.status.unwrap_or_default(),
        images: urls(generation.images),
        raw,
    })
}

pub fn decode_delete(raw: Vec<u8>) -> Result<DeleteResponse> {
    let envelope: DeleteEnvelope = envelope(Operation::DeleteGeneration, &raw)?;
    Ok(DeleteResponse {
        id: envelope
            .deleted
            .and_then(|deleted| deleted.id)
            .unwrap_or_default(),
        raw,
    })
}

pub fn decode_user_info(raw: Vec<u8>) -> Result<UserInfo> {
    let envelope: UserEnvelope = envelope(Operation::UserInfo, &raw)?;
    let details = envelope.details.into_iter().next().unwrap_or_default();
    let user = details.user.unwrap_or_default();
    Ok(UserInfo {
        user_id: user.id.unwrap_or_default(),
        username: user.username.unwrap_or_default(),
        subscription_tokens: tokens(details.subscription_tokens),
        paid_tokens: tokens(details.paid_tokens),
        token_renewal_date: details.token_renewal_date.unwrap_or_default(),
        raw,
    })
}

pub fn decode_list(raw: Vec<u8>) -> Result<GenerationListResponse> {
    let envelope: ListEnvelope = envelope(Operation::ListGenerations, &raw)?;
    let generations = envelope
        .generations
        .into_iter()
        .map(|record| GenerationListItem {
            id: record.id.unwrap_or_default(),
            status: record.status.unwrap_or_default(),
            created_at: record.created_at.unwrap_or_default(),
            prompt: record.prompt.unwrap_or_default(),
            images: urls(record.images),
        })
        .collect();
    Ok(GenerationListResponse { generations, raw })
}

/// Settings of a generation as reported in a status body: every field of
/// `generations_by_pk` other than its id, status and images.
///
/// Best effort: anything unreadable yields an empty map.
pub fn generation_parameters(raw: &[u8]) -> Map<String, Value> {
    let Ok(Value::Object(mut body)) = serde_json::from_slice::<Value>(raw) else {
        return Map::new();
    };
    let Some(Value::Object(mut generation)) = body.remove("generations_by_pk") else {
        return Map::new();
    };
    for key in ["id", "status", "generated_images"] {
        generation.remove(key);
    }
    generation
}
