use std::net::SocketAddr;

use axum::{
    Router,
    body::Bytes,
    extract::{ConnectInfo, Multipart, Query, State},
    http::HeaderMap,
    response::Html,
    routing::get,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use tracing::{error, info};

use crate::{
    history,
    llm::LlmProvider,
    parser, quota,
    web::{AppState, AuthUser, auth, templates},
};

const MAX_FILE_SIZE: usize = 5 * 1024 * 1024;

const FIELD_PROVIDER: &str = "provider";
const FIELD_JD: &str = "jd";
const FIELD_RESUME: &str = "resume";
const FIELD_CAREER: &str = "career_description";

const LABEL_RESUME: &str = "이력서";
const LABEL_CAREER: &str = "경력기술서";

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(index).post(evaluate))
}

#[derive(Default, Deserialize)]
pub struct IndexQuery {
    pub auth_error: Option<String>,
}

/// One uploaded file held in memory for the duration of the request.
#[derive(Debug)]
struct UploadedDocument {
    filename: String,
    bytes: Bytes,
}

#[derive(Default)]
struct EvaluationSubmission {
    provider: Option<String>,
    jd: Option<String>,
    resume: Option<UploadedDocument>,
    career: Option<UploadedDocument>,
}

pub async fn index(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(params): Query<IndexQuery>,
) -> Html<String> {
    let user = auth::current_user(&state, &jar).await;
    let ip = client_ip(&headers, peer);

    render_page(
        &state,
        &ip,
        user.as_ref(),
        None,
        None,
        params.auth_error.as_deref(),
    )
    .await
}

/// `POST /`: quota check, form validation, file parsing, LLM call, audit
/// logging. Every failure renders back into the form page.
pub async fn evaluate(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    jar: CookieJar,
    multipart: Multipart,
) -> Html<String> {
    let user = auth::current_user(&state, &jar).await;
    let user_id = user.as_ref().map(|u| u.id);
    let ip = client_ip(&headers, peer);

    if let Err(err) = quota::ensure_within_limit(state.pool_ref(), &ip, user_id).await {
        return render_page(&state, &ip, user.as_ref(), None, Some(&err.message()), None).await;
    }

    let submission = match read_submission(multipart).await {
        Ok(submission) => submission,
        Err(message) => {
            return render_page(&state, &ip, user.as_ref(), None, Some(&message), None).await;
        }
    };

    let (provider, jd, resume, career) = match validate_submission(&submission) {
        Ok(parts) => parts,
        Err(message) => {
            return render_page(&state, &ip, user.as_ref(), None, Some(&message), None).await;
        }
    };

    if !state.llm().has_key(provider) {
        let message = provider.missing_key_message();
        return render_page(&state, &ip, user.as_ref(), None, Some(message), None).await;
    }

    let resume_text = match parser::extract_text(&resume.filename, &resume.bytes) {
        Ok(text) => text,
        Err(err) => {
            let message = format!("파일 파싱 오류: {err}");
            return render_page(&state, &ip, user.as_ref(), None, Some(&message), None).await;
        }
    };

    let career_text = match career {
        Some(document) => match parser::extract_text(&document.filename, &document.bytes) {
            Ok(text) => Some(text),
            Err(err) => {
                let message = format!("파일 파싱 오류: {err}");
                return render_page(&state, &ip, user.as_ref(), None, Some(&message), None).await;
            }
        },
        None => None,
    };

    let system_prompt = match state.config().load_system_prompt().await {
        Ok(prompt) => prompt,
        Err(err) => {
            error!(?err, "failed to load system prompt");
            let message = format!("분석 중 오류가 발생했습니다: {err}");
            return render_page(&state, &ip, user.as_ref(), None, Some(&message), None).await;
        }
    };

    let user_message = build_user_message(jd, &resume_text, career_text.as_deref());

    match state
        .llm()
        .generate(provider, &system_prompt, &user_message)
        .await
    {
        Ok(response) => {
            info!(provider = %response.provider, model = %response.model, "analysis completed");

            if let Err(err) = quota::record_request(state.pool_ref(), &ip, user_id).await {
                error!(?err, "failed to record request log");
            }

            let audit_filename = sanitize_filename::sanitize(&resume.filename);
            if let Err(err) = history::record_analysis(
                state.pool_ref(),
                &ip,
                user_id,
                provider.as_str(),
                &audit_filename,
            )
            .await
            {
                error!(?err, "failed to record analysis history");
            }

            render_page(&state, &ip, user.as_ref(), Some(&response.text), None, None).await
        }
        Err(err) => {
            error!(?err, %provider, "llm request failed");
            let message = format!("분석 중 오류가 발생했습니다: {err}");
            render_page(&state, &ip, user.as_ref(), None, Some(&message), None).await
        }
    }
}

async fn render_page(
    state: &AppState,
    ip: &str,
    user: Option<&AuthUser>,
    result: Option<&str>,
    error: Option<&str>,
    auth_error: Option<&str>,
) -> Html<String> {
    let user_id = user.map(|u| u.id);
    let limit = quota::daily_limit(user_id);
    let remaining = quota::remaining_requests(state.pool_ref(), ip, user_id).await;

    Html(templates::render_index_page(templates::IndexPage {
        user,
        remaining,
        limit,
        result,
        error,
        auth_error,
    }))
}

/// Collects the multipart fields into memory. Empty file parts (an optional
/// input left blank) are treated as absent.
async fn read_submission(mut multipart: Multipart) -> Result<EvaluationSubmission, String> {
    let mut submission = EvaluationSubmission::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| format!("업로드 양식을 해석하지 못했습니다: {err}"))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            FIELD_PROVIDER => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| format!("AI 모델 항목을 읽지 못했습니다: {err}"))?;
                submission.provider = Some(value);
            }
            FIELD_JD => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| format!("채용공고 항목을 읽지 못했습니다: {err}"))?;
                submission.jd = Some(value);
            }
            FIELD_RESUME | FIELD_CAREER => {
                let filename = field.file_name().unwrap_or("").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| format!("업로드 파일을 읽지 못했습니다: {err}"))?;

                if filename.is_empty() || bytes.is_empty() {
                    continue;
                }

                let document = UploadedDocument { filename, bytes };
                if field_name == FIELD_RESUME {
                    submission.resume = Some(document);
                } else {
                    submission.career = Some(document);
                }
            }
            _ => {}
        }
    }

    Ok(submission)
}

fn validate_submission(
    submission: &EvaluationSubmission,
) -> Result<(LlmProvider, &str, &UploadedDocument, Option<&UploadedDocument>), String> {
    let provider = submission
        .provider
        .as_deref()
        .map(LlmProvider::parse)
        .transpose()
        .map_err(|err| err.to_string())?
        .ok_or_else(|| "AI 모델을 선택해주세요.".to_string())?;

    let jd = submission
        .jd
        .as_deref()
        .map(str::trim)
        .filter(|jd| !jd.is_empty())
        .ok_or_else(|| "채용공고(JD)를 입력해주세요.".to_string())?;

    let resume = submission
        .resume
        .as_ref()
        .ok_or_else(|| "이력서 파일을 업로드해주세요.".to_string())?;
    validate_document(LABEL_RESUME, &resume.filename, resume.bytes.len())?;

    if let Some(career) = submission.career.as_ref() {
        validate_document(LABEL_CAREER, &career.filename, career.bytes.len())?;
    }

    Ok((provider, jd, resume, submission.career.as_ref()))
}

/// Size ceiling plus the extension check, delegated to the extractor's own
/// routing so validation never accepts a file the parser cannot route.
fn validate_document(field_label: &str, filename: &str, size: usize) -> Result<(), String> {
    if parser::detect_kind(filename).is_none() {
        return Err(format!(
            "{field_label}는 PDF, Markdown, TXT 파일만 업로드 가능합니다."
        ));
    }

    if size > MAX_FILE_SIZE {
        let max_mb = MAX_FILE_SIZE / (1024 * 1024);
        return Err(format!(
            "{field_label} 파일 크기가 {max_mb}MB를 초과합니다."
        ));
    }

    Ok(())
}

/// Message sent to the model: JD and résumé sections, plus the career history
/// when provided.
fn build_user_message(jd: &str, resume: &str, career: Option<&str>) -> String {
    let mut message = format!(
        "아래 채용공고(JD)와 이력서를 분석해주세요.\n\n## 채용공고 (JD)\n{jd}\n\n## 이력서\n{resume}\n"
    );

    if let Some(career) = career {
        message.push_str(&format!("\n## 경력기술서\n{career}\n"));
    }

    message
}

/// Client identity for quota scoping: first X-Forwarded-For entry when the
/// service sits behind a proxy, otherwise the peer address.
fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| peer.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn user_message_includes_career_section_only_when_present() {
        let without = build_user_message("백엔드 채용", "경력 5년", None);
        assert!(without.contains("## 채용공고 (JD)\n백엔드 채용"));
        assert!(without.contains("## 이력서\n경력 5년"));
        assert!(!without.contains("경력기술서"));

        let with = build_user_message("백엔드 채용", "경력 5년", Some("프로젝트 상세"));
        assert!(with.contains("## 경력기술서\n프로젝트 상세"));
    }

    #[test]
    fn document_validation_checks_extension_and_size() {
        assert!(validate_document(LABEL_RESUME, "resume.pdf", 1024).is_ok());
        assert!(validate_document(LABEL_RESUME, "resume.MD", 1024).is_ok());
        assert!(validate_document(LABEL_RESUME, "resume.markdown", 1024).is_ok());
        assert!(validate_document(LABEL_RESUME, "resume.txt", MAX_FILE_SIZE).is_ok());

        let bad_ext = validate_document(LABEL_RESUME, "resume.docx", 1024).unwrap_err();
        assert!(bad_ext.contains("이력서"));
        assert!(bad_ext.contains("PDF, Markdown, TXT"));

        let too_big = validate_document(LABEL_CAREER, "career.pdf", MAX_FILE_SIZE + 1).unwrap_err();
        assert!(too_big.contains("경력기술서"));
        assert!(too_big.contains("5MB"));
    }

    #[test]
    fn document_validation_agrees_with_extraction_routing() {
        // A validated file must always reach its dedicated extractor. Dotfiles
        // like ".pdf" have no extension, so both sides reject them.
        for name in [
            ".pdf",
            "resume.pdf",
            "RESUME.PDF",
            "resume.md",
            "notes.markdown",
            "career.txt",
            "resume.docx",
            "no-extension",
        ] {
            assert_eq!(
                validate_document(LABEL_RESUME, name, 1024).is_ok(),
                parser::detect_kind(name).is_some(),
                "validation and extraction disagree on {name}"
            );
        }
    }

    #[test]
    fn submission_validation_requires_jd_and_resume() {
        let empty = EvaluationSubmission {
            provider: Some("openai".to_string()),
            jd: Some("   ".to_string()),
            ..EvaluationSubmission::default()
        };
        let err = validate_submission(&empty).unwrap_err();
        assert!(err.contains("채용공고"));

        let no_resume = EvaluationSubmission {
            provider: Some("claude".to_string()),
            jd: Some("백엔드 채용".to_string()),
            ..EvaluationSubmission::default()
        };
        let err = validate_submission(&no_resume).unwrap_err();
        assert!(err.contains("이력서"));
    }

    #[test]
    fn submission_validation_rejects_unknown_provider() {
        let submission = EvaluationSubmission {
            provider: Some("gemini".to_string()),
            jd: Some("백엔드 채용".to_string()),
            resume: Some(UploadedDocument {
                filename: "resume.txt".to_string(),
                bytes: Bytes::from_static(b"text"),
            }),
            ..EvaluationSubmission::default()
        };
        let err = validate_submission(&submission).unwrap_err();
        assert!(err.contains("gemini"));
    }

    #[test]
    fn client_ip_prefers_first_forwarded_entry() {
        let peer: SocketAddr = "10.0.0.9:41000".parse().unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers, peer), "203.0.113.7");

        let empty = HeaderMap::new();
        assert_eq!(client_ip(&empty, peer), "10.0.0.9");
    }
}
