use serde::{Deserialize, Serialize};

use crate::models::profile::Profile;
use crate::utils::telegram_auth::ParsedUser;

/// Body shape every Mini-App call sends. A missing field counts as empty.
#[derive(Debug, Default, Deserialize)]
pub struct InitDataRequest {
    #[serde(rename = "initData", default)]
    pub init_data: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: ParsedUser,
    pub profile: Profile,
}
