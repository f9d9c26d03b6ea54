use crate::{
    llm::LlmProvider,
    quota,
    web::auth::AuthUser,
};

const PAGE_BASE_STYLES: &str = r#"
        :root { color-scheme: light; }
        body { font-family: "Helvetica Neue", Arial, sans-serif; margin: 0; background: #f8fafc; color: #0f172a; }
        header { background: #ffffff; padding: 2rem 1.5rem; border-bottom: 1px solid #e2e8f0; }
        .header-bar { display: flex; justify-content: space-between; align-items: center; flex-wrap: wrap; gap: 1rem; }
        .header-bar h1 { margin: 0; font-size: 1.7rem; }
        .identity { display: flex; align-items: center; gap: 0.75rem; flex-wrap: wrap; }
        .identity span { color: #475569; font-size: 0.95rem; }
        .login-link { display: inline-flex; align-items: center; color: #3c1e1e; background: #fee500; padding: 0.55rem 1.1rem; border-radius: 8px; text-decoration: none; font-weight: 600; }
        .logout-form button { padding: 0.55rem 1.1rem; border: none; border-radius: 8px; background: #e2e8f0; color: #0f172a; font-weight: 600; cursor: pointer; }
        main { padding: 2rem 1.5rem; max-width: 860px; margin: 0 auto; box-sizing: border-box; }
        .panel { background: #ffffff; border-radius: 12px; border: 1px solid #e2e8f0; padding: 1.5rem; box-shadow: 0 18px 40px rgba(15, 23, 42, 0.08); margin-bottom: 2rem; }
        .panel h2 { margin-top: 0; }
        label { display: block; margin: 1.1rem 0 0.5rem; font-weight: 600; color: #0f172a; }
        select, textarea, input[type="file"] { width: 100%; padding: 0.75rem; border-radius: 8px; border: 1px solid #cbd5f5; background: #f8fafc; color: #0f172a; box-sizing: border-box; font-size: 0.95rem; }
        textarea { min-height: 10rem; resize: vertical; }
        select:focus, textarea:focus { outline: none; border-color: #2563eb; box-shadow: 0 0 0 3px rgba(37, 99, 235, 0.12); }
        button[type="submit"] { margin-top: 1.5rem; padding: 0.85rem 1.4rem; border: none; border-radius: 8px; background: #2563eb; color: #ffffff; font-weight: 600; cursor: pointer; }
        button[type="submit"]:hover { background: #1d4ed8; }
        .hint { color: #64748b; font-size: 0.85rem; margin: 0.35rem 0 0; }
        .flash { padding: 1rem 1.25rem; border-radius: 10px; margin-bottom: 1.5rem; font-weight: 600; border: 1px solid transparent; }
        .flash.error { background: #fef2f2; border-color: #fecaca; color: #b91c1c; }
        .quota { color: #475569; font-size: 0.95rem; margin: 0.5rem 0 0; }
        .result pre { white-space: pre-wrap; word-break: break-word; background: #f1f5f9; border-radius: 10px; padding: 1.25rem; font-size: 0.95rem; line-height: 1.65; }
        table { width: 100%; border-collapse: collapse; margin-top: 1rem; }
        th, td { padding: 0.65rem 0.85rem; border-bottom: 1px solid #e2e8f0; text-align: left; font-size: 0.92rem; }
        th { background: #f1f5f9; font-weight: 600; }
        .app-footer { margin-top: 3rem; text-align: center; font-size: 0.85rem; color: #94a3b8; }
        @media (max-width: 768px) {
            header { padding: 1.5rem 1rem; }
            main { padding: 1.5rem 1rem; }
            .header-bar { flex-direction: column; align-items: flex-start; }
        }
"#;

/// Everything the evaluation form page needs to render itself.
pub struct IndexPage<'a> {
    pub user: Option<&'a AuthUser>,
    pub remaining: i64,
    pub limit: i64,
    pub result: Option<&'a str>,
    pub error: Option<&'a str>,
    pub auth_error: Option<&'a str>,
}

pub fn render_index_page(page: IndexPage<'_>) -> String {
    let identity = match page.user {
        Some(user) => format!(
            r#"<span>로그인: <strong>{username}</strong></span>
                <form class="logout-form" method="post" action="/auth/logout">
                    <button type="submit">로그아웃</button>
                </form>"#,
            username = escape_html(&user.username),
        ),
        None => r#"<a class="login-link" href="/auth/kakao/login">카카오 로그인</a>"#.to_string(),
    };

    let mut flash = String::new();
    if let Some(code) = page.auth_error {
        flash.push_str(&format!(
            r#"<div class="flash error">{message}</div>"#,
            message = escape_html(auth_error_message(code)),
        ));
    }
    if let Some(error) = page.error {
        flash.push_str(&format!(
            r#"<div class="flash error">{message}</div>"#,
            message = escape_html(error),
        ));
    }

    let result_panel = page
        .result
        .map(|result| {
            format!(
                r#"<section class="panel result">
            <h2>분석 결과</h2>
            <pre>{result}</pre>
        </section>"#,
                result = escape_html(result),
            )
        })
        .unwrap_or_default();

    let provider_options = [LlmProvider::OpenAi, LlmProvider::Claude]
        .iter()
        .map(|provider| {
            format!(
                r#"<option value="{value}">{label}</option>"#,
                value = provider.as_str(),
                label = provider.label(),
            )
        })
        .collect::<String>();

    let quota_note = if page.user.is_some() {
        format!(
            "오늘 남은 분석 횟수: {remaining} / {limit}",
            remaining = page.remaining,
            limit = page.limit,
        )
    } else {
        format!(
            "오늘 남은 분석 횟수: {remaining} / {limit} (카카오 로그인 시 하루 {user_limit}회)",
            remaining = page.remaining,
            limit = page.limit,
            user_limit = quota::USER_DAILY_LIMIT,
        )
    };

    let footer = render_footer();

    format!(
        r#"<!DOCTYPE html>
<html lang="ko">
<head>
    <meta charset="UTF-8">
    <title>이력서 평가</title>
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <style>
{styles}
    </style>
</head>
<body>
    <header>
        <div class="header-bar">
            <h1>이력서 평가</h1>
            <div class="identity">
                {identity}
            </div>
        </div>
        <p class="quota">{quota_note}</p>
    </header>
    <main>
        {flash}
        {result_panel}
        <section class="panel">
            <h2>분석 요청</h2>
            <form method="post" action="/" enctype="multipart/form-data">
                <label for="provider">AI 모델</label>
                <select id="provider" name="provider">
                    {provider_options}
                </select>
                <label for="jd">채용공고 (JD)</label>
                <textarea id="jd" name="jd" placeholder="채용공고(JD)를 입력하세요..." required></textarea>
                <label for="resume">이력서 (필수)</label>
                <input id="resume" type="file" name="resume" accept=".pdf,.md,.markdown,.txt" required>
                <p class="hint">PDF, Markdown, TXT 파일을 업로드하세요. (최대 5MB)</p>
                <label for="career_description">경력기술서 (선택)</label>
                <input id="career_description" type="file" name="career_description" accept=".pdf,.md,.markdown,.txt">
                <p class="hint">PDF, Markdown, TXT 파일을 업로드하세요. (최대 5MB)</p>
                <button type="submit">분석 시작</button>
            </form>
        </section>
        {footer}
    </main>
</body>
</html>"#,
        styles = PAGE_BASE_STYLES,
        identity = identity,
        quota_note = quota_note,
        flash = flash,
        result_panel = result_panel,
        provider_options = provider_options,
        footer = footer,
    )
}

/// User-facing text for the `auth_error` query codes set by the OAuth flow.
pub fn auth_error_message(code: &str) -> &'static str {
    match code {
        "invalid_state" => "로그인 요청 검증에 실패했습니다. 다시 시도해주세요.",
        "no_code" => "로그인 응답에 인가 코드가 없습니다.",
        "token_exchange_failed" => "로그인 토큰 발급에 실패했습니다.",
        "no_access_token" => "로그인 토큰 응답이 올바르지 않습니다.",
        "profile_fetch_failed" => "프로필 정보를 가져오지 못했습니다.",
        "provider_not_configured" => "소셜 로그인이 아직 설정되지 않았습니다.",
        "access_denied" => "로그인이 취소되었습니다.",
        _ => "로그인 중 오류가 발생했습니다. 다시 시도해주세요.",
    }
}

pub fn render_admin_login_page(error: Option<&str>) -> String {
    let flash = error
        .map(|message| {
            format!(
                r#"<div class="flash error">{message}</div>"#,
                message = escape_html(message),
            )
        })
        .unwrap_or_default();
    let footer = render_footer();

    format!(
        r#"<!DOCTYPE html>
<html lang="ko">
<head>
    <meta charset="UTF-8">
    <title>관리자 로그인</title>
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <meta name="robots" content="noindex,nofollow">
    <style>
{styles}
        .login-wrap {{ max-width: 420px; margin: 4rem auto; }}
        input[type="text"], input[type="password"] {{ width: 100%; padding: 0.75rem; border-radius: 8px; border: 1px solid #cbd5f5; background: #f8fafc; box-sizing: border-box; }}
    </style>
</head>
<body>
    <main>
        <div class="login-wrap">
            {flash}
            <section class="panel">
                <h2>관리자 로그인</h2>
                <form method="post" action="/dashboard/login">
                    <label for="username">아이디</label>
                    <input id="username" type="text" name="username" required>
                    <label for="password">비밀번호</label>
                    <input id="password" type="password" name="password" required>
                    <button type="submit">로그인</button>
                </form>
            </section>
            {footer}
        </div>
    </main>
</body>
</html>"#,
        styles = PAGE_BASE_STYLES,
        flash = flash,
        footer = footer,
    )
}

/// Shared shell for the admin dashboard: the caller supplies the section HTML.
pub fn render_dashboard_shell(username: &str, sections_html: &str) -> String {
    let footer = render_footer();

    format!(
        r#"<!DOCTYPE html>
<html lang="ko">
<head>
    <meta charset="UTF-8">
    <title>관리자 대시보드</title>
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <meta name="robots" content="noindex,nofollow">
    <style>
{styles}
    </style>
</head>
<body>
    <header>
        <div class="header-bar">
            <h1>관리자 대시보드</h1>
            <div class="identity">
                <span>로그인: <strong>{username}</strong></span>
                <form class="logout-form" method="post" action="/auth/logout">
                    <button type="submit">로그아웃</button>
                </form>
            </div>
        </div>
    </header>
    <main>
        {sections_html}
        {footer}
    </main>
</body>
</html>"#,
        styles = PAGE_BASE_STYLES,
        username = escape_html(username),
        sections_html = sections_html,
        footer = footer,
    )
}

pub fn render_footer() -> String {
    r#"<footer class="app-footer">이력서 평가 서비스 — 업로드한 문서는 분석에만 사용됩니다.</footer>"#
        .to_string()
}

pub fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn escape_html_neutralizes_markup() {
        assert_eq!(
            escape_html(r#"<b>&"'</b>"#),
            "&lt;b&gt;&amp;&quot;&#39;&lt;/b&gt;"
        );
    }

    #[test]
    fn index_page_shows_login_link_for_anonymous() {
        let html = render_index_page(IndexPage {
            user: None,
            remaining: 1,
            limit: 1,
            result: None,
            error: None,
            auth_error: None,
        });
        assert!(html.contains("/auth/kakao/login"));
        assert!(html.contains("오늘 남은 분석 횟수: 1 / 1"));
    }

    #[test]
    fn index_page_shows_logout_for_authenticated() {
        let user = AuthUser {
            id: Uuid::new_v4(),
            username: "kakao_42".to_string(),
            is_admin: false,
        };
        let html = render_index_page(IndexPage {
            user: Some(&user),
            remaining: 3,
            limit: 3,
            result: None,
            error: None,
            auth_error: None,
        });
        assert!(html.contains("kakao_42"));
        assert!(html.contains("/auth/logout"));
        assert!(!html.contains("/auth/kakao/login"));
    }

    #[test]
    fn index_page_escapes_model_output() {
        let html = render_index_page(IndexPage {
            user: None,
            remaining: 0,
            limit: 1,
            result: Some("<script>alert(1)</script>"),
            error: None,
            auth_error: None,
        });
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>alert"));
    }

    #[test]
    fn auth_error_codes_map_to_messages() {
        assert!(auth_error_message("invalid_state").contains("검증"));
        assert!(auth_error_message("unknown_code").contains("오류"));
    }
}
