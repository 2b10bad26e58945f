//! Telegram WebApp `initData` signing scheme.
//!
//! See <https://core.telegram.org/bots/webapps#validating-data-received-via-the-mini-app>.
//! Everything here is pure: no I/O, no logging, same output for the same input.

use std::fmt;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const WEB_APP_DATA: &[u8] = b"WebAppData";

/// Decoded `initData` fields, in the order the client sent them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitData {
    fields: Vec<(String, String)>,
}

impl InitData {
    pub fn parse(raw: &str) -> Self {
        let fields = url::form_urlencoded::parse(raw.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Self { fields }
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Removes every `hash` entry and returns the first one.
    pub fn take_hash(&mut self) -> Option<String> {
        let hash = self.get("hash").map(str::to_owned);
        self.fields.retain(|(k, _)| k != "hash");
        hash
    }

    /// `key=value` lines sorted byte-wise and joined with `\n`.
    pub fn data_check_string(&self) -> String {
        let mut lines: Vec<String> = self
            .fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        lines.sort_unstable();
        lines.join("\n")
    }

    pub fn auth_date(&self) -> Option<i64> {
        self.get("auth_date")?.parse().ok()
    }

    pub fn query_id(&self) -> Option<&str> {
        self.get("query_id")
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// The Telegram user embedded in the `user` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedUser {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_premium: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allows_write_to_pm: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationReason {
    Ok,
    MissingHash,
    HashMismatch,
    MissingUser,
    BadUserJson,
}

impl VerificationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationReason::Ok => "ok",
            VerificationReason::MissingHash => "missing_hash",
            VerificationReason::HashMismatch => "hash_mismatch",
            VerificationReason::MissingUser => "missing_user",
            VerificationReason::BadUserJson => "bad_user_json",
        }
    }
}

impl fmt::Display for VerificationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    pub valid: bool,
    pub reason: VerificationReason,
    pub user: Option<ParsedUser>,
}

impl VerificationResult {
    fn accepted(user: ParsedUser) -> Self {
        Self {
            valid: true,
            reason: VerificationReason::Ok,
            user: Some(user),
        }
    }

    fn rejected(reason: VerificationReason) -> Self {
        Self {
            valid: false,
            reason,
            user: None,
        }
    }

    pub fn into_user(self) -> Result<ParsedUser, VerificationReason> {
        match self.user {
            Some(user) if self.valid => Ok(user),
            _ => Err(self.reason),
        }
    }
}

/// `HMAC-SHA256(key = "WebAppData", message = bot_token)`, kept raw.
pub fn derive_secret_key(bot_token: &str) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(WEB_APP_DATA).expect("HMAC accepts any key length");
    mac.update(bot_token.as_bytes());
    let mut key = [0u8; 32];
    key.copy_from_slice(&mac.finalize().into_bytes());
    key
}

/// Lowercase hex signature of a data-check string.
pub fn sign_data_check_string(data_check_string: &str, bot_token: &str) -> String {
    let secret_key = derive_secret_key(bot_token);
    let mut mac = HmacSha256::new_from_slice(&secret_key).expect("HMAC accepts any key length");
    mac.update(data_check_string.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Builds a signed `initData` string the way the Telegram client does.
pub fn sign_init_data(pairs: &[(&str, &str)], bot_token: &str) -> String {
    let data = InitData {
        fields: pairs
            .iter()
            .filter(|(k, _)| *k != "hash")
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    };
    let hash = sign_data_check_string(&data.data_check_string(), bot_token);

    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(data.fields.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .append_pair("hash", &hash)
        .finish()
}

/// Checks that `init_data` was signed by Telegram for the bot owning `bot_token`
/// and extracts the embedded user.
pub fn verify_init_data(init_data: &str, bot_token: &str) -> VerificationResult {
    let mut data = InitData::parse(init_data);

    let Some(hash) = data.take_hash() else {
        return VerificationResult::rejected(VerificationReason::MissingHash);
    };

    let expected = sign_data_check_string(&data.data_check_string(), bot_token);
    if !hashes_match(&expected, &hash) {
        return VerificationResult::rejected(VerificationReason::HashMismatch);
    }

    let Some(user) = data.get("user") else {
        return VerificationResult::rejected(VerificationReason::MissingUser);
    };

    match serde_json::from_str::<ParsedUser>(user) {
        Ok(user) => VerificationResult::accepted(user),
        Err(_) => VerificationResult::rejected(VerificationReason::BadUserJson),
    }
}

fn hashes_match(expected: &str, provided: &str) -> bool {
    let provided = provided.to_ascii_lowercase();
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOT_TOKEN: &str = "7342037359:AAHSbCXcJ5C1n6aJfE4KqP2lW7mZ9vR0yTs";
    const USER_JSON: &str = r#"{"id":279058397,"first_name":"Vladislav","last_name":"Kibenko","username":"vdkfrost","language_code":"ru","is_premium":true,"allows_write_to_pm":true}"#;

    // Captured payload for BOT_TOKEN, signed outside this crate.
    const FIXTURE: &str = "query_id=AAHdF6IQAAAAAN0XohDhrOrc&user=%7B%22id%22%3A279058397%2C%22first_name%22%3A%22Vladislav%22%2C%22last_name%22%3A%22Kibenko%22%2C%22username%22%3A%22vdkfrost%22%2C%22language_code%22%3A%22ru%22%2C%22is_premium%22%3Atrue%2C%22allows_write_to_pm%22%3Atrue%7D&auth_date=1729253000&hash=4bcb4c875598c98796f5e85f09bd0df4e721bf4c778dcecc8bf45a82a4f8809d";
    const FIXTURE_HASH: &str = "4bcb4c875598c98796f5e85f09bd0df4e721bf4c778dcecc8bf45a82a4f8809d";

    fn signed(pairs: &[(&str, &str)]) -> String {
        sign_init_data(pairs, BOT_TOKEN)
    }

    #[test]
    fn captured_fixture_verifies() {
        let result = verify_init_data(FIXTURE, BOT_TOKEN);
        assert!(result.valid);
        assert_eq!(result.reason, VerificationReason::Ok);

        let user = result.user.expect("user");
        assert_eq!(user.id, 279058397);
        assert_eq!(user.username.as_deref(), Some("vdkfrost"));
        assert_eq!(user.first_name.as_deref(), Some("Vladislav"));
        assert_eq!(user.last_name.as_deref(), Some("Kibenko"));
        assert_eq!(user.is_premium, Some(true));
    }

    #[test]
    fn signer_matches_captured_hash() {
        let init_data = signed(&[
            ("query_id", "AAHdF6IQAAAAAN0XohDhrOrc"),
            ("user", USER_JSON),
            ("auth_date", "1729253000"),
        ]);
        let mut data = InitData::parse(&init_data);
        assert_eq!(data.take_hash().as_deref(), Some(FIXTURE_HASH));
    }

    #[test]
    fn verification_is_deterministic() {
        assert_eq!(
            verify_init_data(FIXTURE, BOT_TOKEN),
            verify_init_data(FIXTURE, BOT_TOKEN)
        );
        let bogus = "hash=00&user=x";
        assert_eq!(
            verify_init_data(bogus, BOT_TOKEN),
            verify_init_data(bogus, BOT_TOKEN)
        );
    }

    #[test]
    fn empty_input_is_missing_hash() {
        let result = verify_init_data("", BOT_TOKEN);
        assert!(!result.valid);
        assert_eq!(result.reason, VerificationReason::MissingHash);
        assert!(result.user.is_none());
    }

    #[test]
    fn garbage_input_is_rejected_without_panicking() {
        for raw in ["&&&", "=", "%zz%", "hash", "user=%7B&hash=", "\u{0}\u{ff}"] {
            let result = verify_init_data(raw, BOT_TOKEN);
            assert!(!result.valid, "{raw:?} should not verify");
        }
    }

    #[test]
    fn lone_bogus_hash_is_mismatch() {
        let result = verify_init_data("hash=deadbeef", BOT_TOKEN);
        assert_eq!(result.reason, VerificationReason::HashMismatch);
    }

    #[test]
    fn signed_payload_without_user_is_missing_user() {
        let init_data = signed(&[
            ("query_id", "AAHdF6IQAAAAAN0XohDhrOrc"),
            ("auth_date", "1729253000"),
        ]);
        let result = verify_init_data(&init_data, BOT_TOKEN);
        assert_eq!(result.reason, VerificationReason::MissingUser);
        assert!(!result.valid);
    }

    #[test]
    fn non_json_user_is_bad_user_json() {
        let init_data = signed(&[("user", "notjson"), ("auth_date", "1729253000")]);
        let result = verify_init_data(&init_data, BOT_TOKEN);
        assert_eq!(result.reason, VerificationReason::BadUserJson);
    }

    #[test]
    fn user_without_numeric_id_is_bad_user_json() {
        for user in [r#"{"id":"279058397"}"#, r#"{"username":"x"}"#, r#"{"id":1.5}"#, "[1,2]"] {
            let init_data = signed(&[("user", user), ("auth_date", "1")]);
            assert_eq!(
                verify_init_data(&init_data, BOT_TOKEN).reason,
                VerificationReason::BadUserJson,
                "{user}"
            );
        }
    }

    #[test]
    fn parameter_order_does_not_matter() {
        let user: String = url::form_urlencoded::byte_serialize(USER_JSON.as_bytes()).collect();
        let a = format!(
            "user={}&auth_date=1729253000&query_id=AAHdF6IQAAAAAN0XohDhrOrc&hash={}",
            user, FIXTURE_HASH
        );
        let b = format!(
            "hash={}&auth_date=1729253000&query_id=AAHdF6IQAAAAAN0XohDhrOrc&user={}",
            FIXTURE_HASH, user
        );

        let ra = verify_init_data(&a, BOT_TOKEN);
        let rb = verify_init_data(&b, BOT_TOKEN);
        assert_eq!(ra.reason, VerificationReason::Ok);
        assert_eq!(ra, rb);
    }

    #[test]
    fn uppercase_hash_is_accepted() {
        let upper = FIXTURE.replace(FIXTURE_HASH, &FIXTURE_HASH.to_ascii_uppercase());
        assert!(verify_init_data(&upper, BOT_TOKEN).valid);
    }

    #[test]
    fn tampering_any_field_breaks_the_signature() {
        let tampered = [
            FIXTURE.replace("auth_date=1729253000", "auth_date=1729253001"),
            FIXTURE.replace("query_id=AAHdF6IQ", "query_id=BAHdF6IQ"),
            FIXTURE.replace("279058397", "279058398"),
            FIXTURE.replace("Vladislav", "Vladislaw"),
            format!("{}&start_param=ref42", FIXTURE),
        ];
        for init_data in tampered {
            assert_eq!(
                verify_init_data(&init_data, BOT_TOKEN).reason,
                VerificationReason::HashMismatch,
                "{init_data}"
            );
        }
    }

    #[test]
    fn other_bot_token_does_not_verify() {
        let other = "7342037359:AAHSbCXcJ5C1n6aJfE4KqP2lW7mZ9vR0yTt";
        assert!(verify_init_data(FIXTURE, BOT_TOKEN).valid);
        assert_eq!(
            verify_init_data(FIXTURE, other).reason,
            VerificationReason::HashMismatch
        );
    }

    #[test]
    fn duplicate_hash_entries_are_all_stripped() {
        let init_data = format!("{}&hash=ffff", FIXTURE);
        assert!(verify_init_data(&init_data, BOT_TOKEN).valid);
    }

    #[test]
    fn data_check_string_sorts_whole_lines_and_decodes_values() {
        let data = InitData::parse("user=%7B%22id%22%3A1%7D&chat_type=sender&auth_date=5&chat_instance=-42");
        assert_eq!(
            data.data_check_string(),
            "auth_date=5\nchat_instance=-42\nchat_type=sender\nuser={\"id\":1}"
        );
        assert_eq!(data.auth_date(), Some(5));
        assert_eq!(data.query_id(), None);
    }

    #[test]
    fn secret_key_is_raw_32_bytes() {
        let key = derive_secret_key(BOT_TOKEN);
        assert_eq!(key.len(), 32);
        assert_ne!(key, derive_secret_key("other"));
        assert_eq!(sign_data_check_string("", BOT_TOKEN).len(), 64);
    }

    #[test]
    fn rejected_result_has_no_user() {
        let err = verify_init_data("hash=deadbeef", BOT_TOKEN).into_user().unwrap_err();
        assert_eq!(err.to_string(), "hash_mismatch");
        let user = verify_init_data(FIXTURE, BOT_TOKEN).into_user().unwrap();
        assert_eq!(user.id, 279058397);
    }

    #[test]
    fn result_serializes_with_snake_case_reason() {
        let json = serde_json::to_value(verify_init_data("", BOT_TOKEN)).unwrap();
        assert_eq!(json["valid"], false);
        assert_eq!(json["reason"], "missing_hash");
        assert!(json["user"].is_null());
    }
}
