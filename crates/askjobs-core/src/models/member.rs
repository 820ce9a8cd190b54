use serde::Serialize;

/// Registration payload for `POST /members/sign_up`.
#[derive(Debug, Clone, Serialize)]
pub struct SignUpRequest {
    #[serde(rename = "id")]
    pub username: String,
    pub password: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub job_status: String,
}
