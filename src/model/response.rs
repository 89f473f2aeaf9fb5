use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use strum::EnumString;

/// Result of `POST /generations`.
#[derive(Default, Clone, PartialEq)]
pub struct GenerationResponse {
    /// Empty when the response did not name a generation.
    pub generation_id: String,
    pub raw: Vec<u8>,
}

/// Point-in-time state of a generation.
#[derive(Default, Clone, PartialEq)]
pub struct GenerationStatus {
    /// Label set by the API, e.g. `PENDING` or `COMPLETE`.
    pub status: String,
    /// Image URLs in API order; empty until the generation completes.
    pub images: Vec<String>,
    pub raw: Vec<u8>,
}

/// Status labels the client knows about. Anything else is carried through
/// as [`GenerationState::Other`].
#[derive(Clone, Copy, Debug, EnumString, Eq, PartialEq)]
#[strum(ascii_case_insensitive)]
pub enum GenerationState {
    #[strum(serialize = "PENDING")]
    Pending,
    #[strum(serialize = "COMPLETE")]
    Complete,
    #[strum(serialize = "FAILED")]
    Failed,
    #[strum(disabled)]
    Other,
}

impl GenerationStatus {
    pub fn state(&self) -> GenerationState {
        GenerationState::from_str(self.status.trim()).unwrap_or(GenerationState::Other)
    }

    pub fn is_complete(&self) -> bool {
        self.state() == GenerationState::Complete
    }

    pub fn is_pending(&self) -> bool {
        self.state() == GenerationState::Pending
    }
}

#[derive(Default, Clone, PartialEq)]
pub struct DeleteResponse {
    pub id: String,
    pub raw: Vec<u8>,
}

/// Account details and API token balances.
#[derive(Default, Clone, PartialEq)]
pub struct UserInfo {
    pub user_id: String,
    pub username: String,
    pub subscription_tokens: i64,
    pub paid_tokens: i64,
    /// ISO-8601, as supplied by the API.
    pub token_renewal_date: String,
    pub raw: Vec<u8>,
}

#[derive(Default, Debug, Clone, PartialEq)]
pub struct GenerationListItem {
    pub id: String,
    pub status: String,
    pub created_at: String,
    pub prompt: String,
    pub images: Vec<String>,
}

#[derive(Default, Clone, PartialEq)]
pub struct GenerationListResponse {
    pub generations: Vec<GenerationListItem>,
    pub raw: Vec<u8>,
}

/// Local files written for a generation, in the order of its images.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct DownloadResult {
    pub file_paths: Vec<PathBuf>,
}

// Raw bodies can be large; show their size rather than their bytes.

impl fmt::Debug for GenerationResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationResponse")
            .field("generation_id", &self.generation_id)
            .field("raw_len", &self.raw.len())
            .finish()
    }
}

impl fmt::Debug for GenerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationStatus")
            .field("status", &self.status)
            .field("images", &self.images)
            .field("raw_len", &self.raw.len())
            .finish()
    }
}

impl fmt::Debug for DeleteResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeleteResponse")
            .field("id", &self.id)
            .field("raw_len", &self.raw.len())
            .finish()
    }
}

impl fmt::Debug for UserInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserInfo")
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("subscription_tokens", &self.subscription_tokens)
            .field("paid_tokens", &self.paid_tokens)
            .field("token_renewal_date", &self.token_renewal_date)
            .field("raw_len", &self.raw.len())
            .finish()
    }
}

impl fmt::Debug for GenerationListResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationListResponse")
            .field("generations", &self.generations)
            .field("raw_len", &self.raw.len())
            .finish()
    }
}
