use std::{fmt, time::Duration};

use anyhow::{Context, Result, anyhow, bail};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand_core::{OsRng, RngCore};
use reqwest::{Client, Url};
use serde::Deserialize;

use crate::config::KakaoConfig;

const KAKAO_AUTH_URL: &str = "https://kauth.kakao.com/oauth/authorize";
const KAKAO_TOKEN_URL: &str = "https://kauth.kakao.com/oauth/token";
const KAKAO_PROFILE_URL: &str = "https://kapi.kakao.com/v2/user/me";

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const STATE_TOKEN_BYTES: usize = 32;

/// External identity providers usable for social login. Only Kakao is wired
/// up today; the enum is the seam for adding more.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OAuthProvider {
    Kakao,
}

impl OAuthProvider {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "kakao" => Some(OAuthProvider::Kakao),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Kakao => "kakao",
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Profile fields normalized across providers.
#[derive(Debug, Clone)]
pub struct SocialUserInfo {
    pub provider: OAuthProvider,
    pub provider_id: String,
    pub nickname: String,
    pub profile_image_url: String,
    pub email: Option<String>,
}

/// HTTP client for the authorize/token/profile endpoints of the configured
/// providers. Every outbound call shares the fixed 10-second timeout.
#[derive(Clone)]
pub struct OAuthClient {
    http: Client,
    kakao: Option<KakaoConfig>,
}

impl OAuthClient {
    pub fn new(kakao: Option<KakaoConfig>) -> Result<Self> {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("failed to build OAuth http client")?;

        Ok(Self { http, kakao })
    }

    pub fn is_configured(&self, provider: OAuthProvider) -> bool {
        match provider {
            OAuthProvider::Kakao => self.kakao.is_some(),
        }
    }

    /// Authorization endpoint the login view redirects to.
    pub fn authorization_url(
        &self,
        provider: OAuthProvider,
        redirect_uri: &str,
        state: &str,
    ) -> Result<String> {
        match provider {
            OAuthProvider::Kakao => {
                let config = self.kakao_config()?;
                let url = Url::parse_with_params(
                    KAKAO_AUTH_URL,
                    &[
                        ("client_id", config.client_id.as_str()),
                        ("redirect_uri", redirect_uri),
                        ("response_type", "code"),
                        ("state", state),
                    ],
                )
                .context("failed to build kakao authorization url")?;
                Ok(url.into())
            }
        }
    }

    /// Exchanges the authorization code for an access token.
    pub async fn exchange_code(
        &self,
        provider: OAuthProvider,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse> {
        match provider {
            OAuthProvider::Kakao => {
                let config = self.kakao_config()?;
                let response = self
                    .http
                    .post(KAKAO_TOKEN_URL)
                    .form(&[
                        ("grant_type", "authorization_code"),
                        ("client_id", config.client_id.as_str()),
                        ("client_secret", config.client_secret.as_str()),
                        ("redirect_uri", redirect_uri),
                        ("code", code),
                    ])
                    .send()
                    .await
                    .context("kakao token request failed")?;

                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    bail!("kakao token exchange failed with status {status}: {body}");
                }

                response
                    .json::<TokenResponse>()
                    .await
                    .context("failed to parse kakao token response")
            }
        }
    }

    /// Fetches the external profile and maps it to `SocialUserInfo`.
    pub async fn fetch_profile(
        &self,
        provider: OAuthProvider,
        access_token: &str,
    ) -> Result<SocialUserInfo> {
        match provider {
            OAuthProvider::Kakao => {
                let response = self
                    .http
                    .get(KAKAO_PROFILE_URL)
                    .bearer_auth(access_token)
                    .send()
                    .await
                    .context("kakao profile request failed")?;

                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    bail!("kakao profile fetch failed with status {status}: {body}");
                }

                let payload = response
                    .json::<KakaoProfilePayload>()
                    .await
                    .context("failed to parse kakao profile response")?;

                Ok(map_kakao_profile(payload))
            }
        }
    }

    fn kakao_config(&self) -> Result<&KakaoConfig> {
        self.kakao
            .as_ref()
            .ok_or_else(|| anyhow!("kakao OAuth credentials are not configured"))
    }
}

/// Random URL-safe state token carried through the authorize round trip.
pub fn generate_state_token() -> String {
    let mut bytes = [0u8; STATE_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// CSRF check for the callback: the returned state must be present and equal
/// the value stored at login time.
pub fn state_matches(stored: Option<&str>, returned: Option<&str>) -> bool {
    match (stored, returned) {
        (Some(stored), Some(returned)) => !stored.is_empty() && stored == returned,
        _ => false,
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KakaoProfilePayload {
    id: serde_json::Number,
    #[serde(default)]
    kakao_account: Option<KakaoAccount>,
}

#[derive(Debug, Default, Deserialize)]
struct KakaoAccount {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    profile: Option<KakaoProfile>,
}

#[derive(Debug, Default, Deserialize)]
struct KakaoProfile {
    #[serde(default)]
    nickname: Option<String>,
    #[serde(default)]
    profile_image_url: Option<String>,
}

fn map_kakao_profile(payload: KakaoProfilePayload) -> SocialUserInfo {
    let account = payload.kakao_account.unwrap_or_default();
    let profile = account.profile.unwrap_or_default();

    SocialUserInfo {
        provider: OAuthProvider::Kakao,
        provider_id: payload.id.to_string(),
        nickname: profile.nickname.unwrap_or_default(),
        profile_image_url: profile.profile_image_url.unwrap_or_default(),
        email: account.email.filter(|email| !email.is_empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured_client() -> OAuthClient {
        OAuthClient::new(Some(KakaoConfig {
            client_id: "app-key".to_string(),
            client_secret: "app-secret".to_string(),
        }))
        .expect("client")
    }

    #[test]
    fn parse_knows_kakao_only() {
        assert_eq!(OAuthProvider::parse("kakao"), Some(OAuthProvider::Kakao));
        assert_eq!(OAuthProvider::parse("google"), None);
        assert_eq!(OAuthProvider::parse(""), None);
    }

    #[test]
    fn authorization_url_carries_required_params() {
        let client = configured_client();
        let url = client
            .authorization_url(
                OAuthProvider::Kakao,
                "https://resume.example.com/auth/kakao/callback",
                "state-token",
            )
            .expect("url");

        let parsed = Url::parse(&url).expect("valid url");
        assert_eq!(parsed.host_str(), Some("kauth.kakao.com"));
        let params: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(params.contains(&("client_id".into(), "app-key".into())));
        assert!(params.contains(&(
            "redirect_uri".into(),
            "https://resume.example.com/auth/kakao/callback".into()
        )));
        assert!(params.contains(&("response_type".into(), "code".into())));
        assert!(params.contains(&("state".into(), "state-token".into())));
    }

    #[test]
    fn authorization_url_requires_credentials() {
        let client = OAuthClient::new(None).expect("client");
        assert!(!client.is_configured(OAuthProvider::Kakao));
        assert!(
            client
                .authorization_url(OAuthProvider::Kakao, "http://localhost/cb", "s")
                .is_err()
        );
    }

    #[test]
    fn state_tokens_are_distinct_and_url_safe() {
        let first = generate_state_token();
        let second = generate_state_token();
        assert_ne!(first, second);
        assert!(first.len() >= 40);
        assert!(
            first
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn state_matches_requires_equal_nonempty_values() {
        assert!(state_matches(Some("abc"), Some("abc")));
        assert!(!state_matches(Some("abc"), Some("abd")));
        assert!(!state_matches(None, Some("abc")));
        assert!(!state_matches(Some("abc"), None));
        assert!(!state_matches(Some(""), Some("")));
    }

    #[test]
    fn kakao_profile_maps_nested_fields() {
        let payload: KakaoProfilePayload = serde_json::from_value(serde_json::json!({
            "id": 4242424242u64,
            "kakao_account": {
                "email": "dev@example.com",
                "profile": {
                    "nickname": "지원자",
                    "profile_image_url": "https://k.kakaocdn.net/img.jpg"
                }
            }
        }))
        .expect("payload");

        let info = map_kakao_profile(payload);
        assert_eq!(info.provider_id, "4242424242");
        assert_eq!(info.nickname, "지원자");
        assert_eq!(info.profile_image_url, "https://k.kakaocdn.net/img.jpg");
        assert_eq!(info.email.as_deref(), Some("dev@example.com"));
    }

    #[test]
    fn kakao_profile_tolerates_missing_account_block() {
        let payload: KakaoProfilePayload =
            serde_json::from_value(serde_json::json!({ "id": 7 })).expect("payload");

        let info = map_kakao_profile(payload);
        assert_eq!(info.provider_id, "7");
        assert_eq!(info.nickname, "");
        assert_eq!(info.profile_image_url, "");
        assert!(info.email.is_none());
    }
}
