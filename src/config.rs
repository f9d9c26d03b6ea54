use std::{env, path::PathBuf};

use anyhow::{Context, Result};

const DEFAULT_PROMPT_PATH: &str = "prompt/prompt.md";
const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Environment-derived application configuration, loaded once at startup.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub public_base_url: String,
    pub prompt_path: PathBuf,
    pub kakao: Option<KakaoConfig>,
}

/// Client credentials for the Kakao OAuth application.
#[derive(Clone, Debug)]
pub struct KakaoConfig {
    pub client_id: String,
    pub client_secret: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let public_base_url = env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let prompt_path =
            PathBuf::from(env::var("PROMPT_PATH").unwrap_or_else(|_| DEFAULT_PROMPT_PATH.into()));

        let kakao = match (env::var("KAKAO_CLIENT_ID"), env::var("KAKAO_CLIENT_SECRET")) {
            (Ok(client_id), Ok(client_secret)) => Some(KakaoConfig {
                client_id,
                client_secret,
            }),
            _ => None,
        };

        Ok(Self {
            public_base_url,
            prompt_path,
            kakao,
        })
    }

    /// Absolute redirect URI registered with the OAuth provider.
    pub fn callback_url(&self, provider: &str) -> String {
        format!("{}/auth/{}/callback", self.public_base_url, provider)
    }

    pub async fn load_system_prompt(&self) -> Result<String> {
        tokio::fs::read_to_string(&self.prompt_path)
            .await
            .with_context(|| format!("failed to read system prompt from {:?}", self.prompt_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_url_joins_provider() {
        let config = AppConfig {
            public_base_url: "https://resume.example.com".to_string(),
            prompt_path: PathBuf::from("prompt/prompt.md"),
            kakao: None,
        };
        assert_eq!(
            config.callback_url("kakao"),
            "https://resume.example.com/auth/kakao/callback"
        );
    }

    #[tokio::test]
    async fn load_system_prompt_reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("prompt.md");
        std::fs::write(&path, "당신은 채용 전문가입니다.").expect("write prompt");

        let config = AppConfig {
            public_base_url: DEFAULT_BASE_URL.to_string(),
            prompt_path: path,
            kakao: None,
        };

        let prompt = config.load_system_prompt().await.expect("prompt");
        assert_eq!(prompt, "당신은 채용 전문가입니다.");
    }

    #[tokio::test]
    async fn load_system_prompt_reports_missing_file() {
        let config = AppConfig {
            public_base_url: DEFAULT_BASE_URL.to_string(),
            prompt_path: PathBuf::from("does/not/exist.md"),
            kakao: None,
        };

        let err = config.load_system_prompt().await.unwrap_err();
        assert!(err.to_string().contains("exist.md"));
    }
}
