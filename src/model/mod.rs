pub mod request;
pub mod response;
pub(crate) mod wire;

pub use request::{decode_request, encode_request, CreateGenerationPayload, GenerationRequest};
pub use response::{
    DeleteResponse, DownloadResult, GenerationListItem, GenerationListResponse,
    GenerationResponse, GenerationState, GenerationStatus, UserInfo,
};
pub use wire::generation_parameters;
