mod request;
mod response;

pub use request::{
    CandidateRequest, CandidateUpdateRequest, LoginRequest, PasswordResetRequest, SignupRequest,
    UpdatePasswordRequest, UpdateUserRequest,
};
pub use response::ApiResponse;
