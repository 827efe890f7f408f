use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use colored::*;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::comments::{Message, ANONYMOUS_USER};
use crate::config::Config;
use crate::error::LiveError;
use crate::likes::LocalLikes;
use crate::live::{LiveCard, LiveView};
use crate::poll::{PollHandle, PollReceiver};
use crate::problems::{default_problem, difficulty_color, WorkingProblem};
use crate::statement::ContentState;
use crate::views::{DriverView, LoginView, Role, Services, ViewerView};

/// Largest request (head plus body) the server will read.
const MAX_REQUEST: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Request parsing
// ---------------------------------------------------------------------------

/// Percent-decoding for query strings and form bodies. Multi-byte UTF-8
/// sequences are reassembled; malformed escapes are kept literally.
pub fn url_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Parse `a=1&b=2` into key-value pairs. Later duplicates win.
pub fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next()?;
            let val = parts.next().unwrap_or("");
            Some((url_decode(key), url_decode(val)))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    pub body: String,
}

impl Request {
    pub fn new(method: &str, path_and_query: &str, body: &str) -> Self {
        let (path, query_str) = path_and_query
            .split_once('?')
            .unwrap_or((path_and_query, ""));
        Self {
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
            query: parse_query(query_str),
            body: body.to_string(),
        }
    }

    /// The body decoded as `application/x-www-form-urlencoded`.
    pub fn form(&self) -> HashMap<String, String> {
        parse_query(self.body.trim())
    }

    fn param(&self, key: &str) -> Option<String> {
        self.query
            .get(key)
            .cloned()
            .or_else(|| self.form().remove(key))
            .filter(|v| !v.is_empty())
    }
}

fn header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

fn content_length(head: &str) -> usize {
    head.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

/// Parse a complete raw request. `None` if the head is incomplete or the
/// request line is malformed.
pub fn parse_request(raw: &[u8]) -> Option<Request> {
    let end = header_end(raw)?;
    let head = String::from_utf8_lossy(&raw[..end]);
    // "GET /path?query HTTP/1.1"
    let first_line = head.lines().next()?;
    let parts: Vec<&str> = first_line.split_whitespace().collect();
    if parts.len() < 2 {
        return None;
    }
    let body_len = content_length(&head).min(raw.len() - end);
    let body = String::from_utf8_lossy(&raw[end..end + body_len]);
    Some(Request::new(parts[0], parts[1], &body))
}

async fn read_request<S>(stream: &mut S) -> std::io::Result<Option<Request>>
where
    S: AsyncReadExt + Unpin,
{
    let mut buf = Vec::with_capacity(8192);
    let mut chunk = vec![0u8; 8192];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = header_end(&buf) {
            let head = String::from_utf8_lossy(&buf[..end]);
            if buf.len() >= end + content_length(&head) {
                break;
            }
        }
        if buf.len() > MAX_REQUEST {
            break;
        }
    }
    Ok(parse_request(&buf))
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub location: Option<String>,
    pub body: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl Response {
    pub fn html(status: u16, body: String) -> Self {
        Self {
            status,
            content_type: "text/html; charset=utf-8",
            location: None,
            body,
        }
    }

    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        let body = serde_json::to_string(value).unwrap_or_else(|_| "null".to_string());
        Self {
            status,
            content_type: "application/json",
            location: None,
            body,
        }
    }

    pub fn error_json(status: u16, message: impl Into<String>) -> Self {
        Self::json(status, &ErrorBody { error: message.into() })
    }

    fn from_error(e: &LiveError) -> Self {
        Self::error_json(e.status_code(), e.user_message())
    }

    pub fn redirect(location: &str) -> Self {
        Self {
            status: 303,
            content_type: "text/plain",
            location: Some(location.to_string()),
            body: String::new(),
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: 404,
            content_type: "text/plain",
            location: None,
            body: "Not Found".to_string(),
        }
    }

    fn reason(&self) -> &'static str {
        match self.status {
            200 => "OK",
            303 => "See Other",
            400 => "Bad Request",
            404 => "Not Found",
            502 => "Bad Gateway",
            _ => "Internal Server Error",
        }
    }

    pub fn to_http(&self) -> String {
        let location = self
            .location
            .as_deref()
            .map(|l| format!("Location: {l}\r\n"))
            .unwrap_or_default();
        format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\n{}Access-Control-Allow-Origin: *\r\nConnection: close\r\n\r\n{}",
            self.status,
            self.reason(),
            self.content_type,
            self.body.len(),
            location,
            self.body
        )
    }
}

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// Everything the pages share. One driver and one viewer session per
/// server process.
pub struct AppState {
    services: Services,
    driver: Mutex<DriverView>,
    viewer: Mutex<ViewerView>,
    live: Mutex<LiveCard>,
    hearts: Mutex<LocalLikes>,
    working_set: PollReceiver<Vec<WorkingProblem>>,
    applied_seq: AtomicU64,
    _poll: PollHandle,
}

impl AppState {
    /// Build the state and start the working-set poller.
    pub fn new(services: Services) -> Self {
        let (poll, working_set) = services.poll_working_set();
        Self {
            driver: Mutex::new(DriverView::default()),
            viewer: Mutex::new(ViewerView::default()),
            live: Mutex::new(LiveCard::load(services.store.clone())),
            hearts: Mutex::new(LocalLikes::load(services.store.clone())),
            services,
            working_set,
            applied_seq: AtomicU64::new(0),
            _poll: poll,
        }
    }

    /// Latest polled working set not yet handed to the driver.
    fn fresh_working_set(&self) -> Option<Vec<WorkingProblem>> {
        let polled = self.working_set.borrow();
        let polled = polled.as_ref()?;
        let previous = self.applied_seq.fetch_max(polled.seq, Ordering::SeqCst);
        (polled.seq > previous).then(|| polled.value.clone())
    }

    /// The problem viewers should see: the driver's pick, else the default
    /// of the latest poll. `None` until one of them is known.
    async fn current_problem(&self) -> Option<WorkingProblem> {
        if let Some(p) = self.driver.lock().await.selected_problem().cloned() {
            return Some(p);
        }
        let polled = self.working_set.borrow();
        polled
            .as_ref()
            .and_then(|p| default_problem(&p.value).cloned())
    }
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct NewComment {
    #[serde(default)]
    user: Option<String>,
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LiveBody {
    video_id: Option<String>,
    embed_url: Option<String>,
}

fn live_body(view: LiveView) -> LiveBody {
    match view {
        LiveView::Player { video_id, embed_url } => LiveBody {
            video_id: Some(video_id),
            embed_url: Some(embed_url),
        },
        LiveView::Placeholder => LiveBody {
            video_id: None,
            embed_url: None,
        },
    }
}

/// Dispatch one request. Failures of remote services never surface as
/// transport errors: they become error pages or `{"error": ...}` bodies.
pub async fn route(state: &AppState, req: &Request) -> Response {
    let services = &state.services;
    debug!(method = %req.method, path = %req.path, "request");

    match (req.method.as_str(), req.path.as_str()) {
        // -- pages ----------------------------------------------------------
        ("GET", "/") => Response::html(200, render_login(services.store.username().as_deref())),
        ("POST", "/login") => {
            let form = req.form();
            let login = LoginView {
                username: form.get("username").cloned().unwrap_or_default(),
                password: form.get("password").cloned().unwrap_or_default(),
                role: Role::parse(form.get("role").map(String::as_str).unwrap_or("")),
            };
            match login.submit(&services.store) {
                Ok(route) => Response::redirect(route),
                Err(e) => Response::html(500, render_error(&e.user_message(), "/")),
            }
        }
        ("GET", "/driver") => {
            let mut driver = state.driver.lock().await;
            if !driver.is_mounted() {
                driver.mount(services).await;
            }
            if let Some(set) = state.fresh_working_set() {
                driver.set_problems(set, services).await;
            }
            let live = state.live.lock().await;
            let hearts = state.hearts.lock().await;
            Response::html(200, render_driver(&driver, &live, &hearts))
        }
        ("POST", "/driver/title") => {
            if let Some(title) = req.param("title") {
                state.driver.lock().await.stream_title = title;
            }
            Response::redirect("/driver")
        }
        ("POST", "/driver/select") => {
            if let Some(id) = req.param("problem") {
                let mut driver = state.driver.lock().await;
                if !driver.select_problem(&id, services).await {
                    warn!(%id, "unknown problem selected");
                }
            }
            Response::redirect("/driver")
        }
        ("POST", "/driver/live") => {
            let live = state.driver.lock().await.toggle_live();
            info!(live, "driver live state changed");
            Response::redirect("/driver")
        }
        ("POST", "/driver/chat") => {
            let mut driver = state.driver.lock().await;
            driver.chat.draft = req.param("text").unwrap_or_default();
            driver.send_chat();
            Response::redirect("/driver")
        }
        ("POST", "/driver/heart") => {
            let form = req.form();
            let user = form.get("user").map(String::as_str).unwrap_or("");
            let text = form.get("text").map(String::as_str).unwrap_or("");
            match state.hearts.lock().await.toggle(user, text) {
                Ok(_) => Response::redirect("/driver"),
                Err(e) => Response::html(500, render_error(&e.user_message(), "/driver")),
            }
        }
        ("GET", "/viewer") => {
            let mut viewer = state.viewer.lock().await;
            if !viewer.is_mounted() {
                viewer.mount(services).await;
            }
            let current = match state.current_problem().await {
                Some(p) => Some(p),
                None => viewer.mounted_default.clone(),
            };
            viewer.follow(current, services).await;
            let live = state.live.lock().await;
            let username = services.store.username();
            Response::html(200, render_viewer(&viewer, &live, username.as_deref(), services))
        }
        ("POST", "/viewer/comment") => {
            let mut viewer = state.viewer.lock().await;
            viewer.thread.draft = req.param("text").unwrap_or_default();
            viewer.send_comment(services).await;
            Response::redirect("/viewer")
        }
        ("POST", "/viewer/like") => {
            if let Some(id) = req.param("id").and_then(|id| id.parse::<u64>().ok()) {
                // A rejected like is already rolled back; the page shows the old state.
                let _ = state.viewer.lock().await.toggle_like(id, services).await;
            }
            Response::redirect("/viewer")
        }
        ("POST", "/viewer/refresh") => {
            let mut viewer = state.viewer.lock().await;
            viewer.refresh_comments(services).await;
            viewer.refresh_likes(services).await;
            Response::redirect("/viewer")
        }
        ("POST", "/live") => {
            let back = back_target(req);
            let url = req.param("url").unwrap_or_default();
            match state.live.lock().await.submit(&url) {
                Ok(_) => Response::redirect(back),
                Err(e) => Response::html(e.status_code(), render_error(&e.user_message(), back)),
            }
        }
        ("POST", "/live/stop") => {
            let back = back_target(req);
            match state.live.lock().await.stop() {
                Ok(()) => Response::redirect(back),
                Err(e) => Response::html(500, render_error(&e.user_message(), back)),
            }
        }

        // -- JSON API -------------------------------------------------------
        ("GET", "/api/atcoder") => {
            let contest = req.query.get("contest").map(String::as_str).unwrap_or("");
            match services.contests.fetch_contest(contest).await {
                Ok(payload) => Response::json(200, &payload),
                Err(e) => Response::from_error(&e),
            }
        }
        ("GET", "/api/problems") => match services.problems.load_working_set().await {
            Ok(set) => Response::json(200, &set),
            Err(e) => Response::from_error(&e),
        },
        ("GET", "/api/statement") => match req.query.get("url").filter(|u| !u.is_empty()) {
            Some(url) => match services.statements.fetch(url).await {
                Ok(content) => Response::json(200, &content),
                Err(e) => Response::from_error(&e),
            },
            None => Response::error_json(400, "URLが指定されていません"),
        },
        ("GET", "/api/comments") => {
            let user_id = req.query.get("user_id").and_then(|u| u.parse().ok());
            let messages = services.comments.list(services.config.room_id, user_id).await;
            Response::json(200, &messages)
        }
        ("POST", "/api/comments") => match serde_json::from_str::<NewComment>(&req.body) {
            Ok(new) => {
                let user = new
                    .user
                    .filter(|u| !u.trim().is_empty())
                    .or_else(|| services.store.username())
                    .unwrap_or_else(|| ANONYMOUS_USER.to_string());
                match services
                    .comments
                    .create(services.config.room_id, &user, &new.text)
                    .await
                {
                    Ok(saved) => Response::json(200, &saved),
                    Err(e) => Response::from_error(&e),
                }
            }
            Err(e) => Response::error_json(400, format!("invalid comment body: {e}")),
        },
        ("POST", path) if path.starts_with("/api/like/") => {
            match path["/api/like/".len()..].parse::<u64>() {
                Ok(id) => match state.viewer.lock().await.toggle_like(id, services).await {
                    Ok(status) => Response::json(200, &status),
                    Err(e) => Response::from_error(&e),
                },
                Err(_) => Response::error_json(400, "invalid message id"),
            }
        }
        ("POST", "/api/live") => {
            let url = req.param("url").unwrap_or_default();
            let mut live = state.live.lock().await;
            match live.submit(&url) {
                Ok(_) => Response::json(200, &live_body(live.view())),
                Err(e) => Response::from_error(&e),
            }
        }
        ("POST", "/api/live/stop") => {
            let mut live = state.live.lock().await;
            match live.stop() {
                Ok(()) => Response::json(200, &live_body(live.view())),
                Err(e) => Response::from_error(&e),
            }
        }
        _ => Response::not_found(),
    }
}

fn back_target(req: &Request) -> &'static str {
    match req.form().get("back").map(String::as_str) {
        Some("/driver") => "/driver",
        _ => "/viewer",
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const STYLE: &str = "\
*{box-sizing:border-box}\
body{margin:0;background:#f5f6f8;color:#222;font-family:sans-serif}\
header{display:flex;gap:12px;align-items:center;padding:12px 24px;background:#1f2937;color:#fff}\
main{display:grid;grid-template-columns:2fr 1fr;gap:16px;padding:16px 24px}\
.card{background:#fff;border-radius:8px;padding:16px;box-shadow:0 1px 3px rgba(0,0,0,.1);margin-bottom:16px}\
.msg{padding:6px 0;border-bottom:1px solid #eee}\
.user{font-weight:bold;margin-right:6px}\
.heart{border:none;background:none;cursor:pointer;color:#e11d48}\
.limits{color:#555;font-size:.9rem}\
.error{color:#b91c1c}\
iframe{width:100%;aspect-ratio:16/9;border:0}";

fn page(title: &str, header: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"ja\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n\
         <header>{header}</header>\n{body}\n</body>\n</html>",
        escape_html(title)
    )
}

pub fn render_login(username: Option<&str>) -> String {
    let name = escape_html(username.unwrap_or(""));
    let body = format!(
        "<main><div class=\"card\">\n<h2>ログイン</h2>\n\
         <form method=\"post\" action=\"/login\">\n\
         <p><label>ユーザー名 <input name=\"username\" value=\"{name}\" required></label></p>\n\
         <p><label>パスワード <input type=\"password\" name=\"password\" required></label></p>\n\
         <p><label><input type=\"radio\" name=\"role\" value=\"driver\"> ドライバー</label>\n\
         <label><input type=\"radio\" name=\"role\" value=\"viewer\" checked> 視聴者</label></p>\n\
         <button type=\"submit\">ログイン</button>\n</form>\n</div></main>"
    );
    page("Live Coders", "<strong>Live Coders</strong>", &body)
}

pub fn render_error(message: &str, back: &str) -> String {
    let body = format!(
        "<main><div class=\"card\"><p class=\"error\">{}</p><a href=\"{}\">戻る</a></div></main>",
        escape_html(message),
        escape_html(back)
    );
    page("エラー", "<strong>Live Coders</strong>", &body)
}

/// Statement panel. Statement and constraints are scraped HTML and are
/// embedded unescaped.
pub fn render_content(content: &ContentState) -> String {
    match content {
        ContentState::Empty => "<p>問題を選択してください</p>".to_string(),
        ContentState::Loading => "<p>読み込み中...</p>".to_string(),
        ContentState::Loaded(c) => format!(
            "<p class=\"limits\">実行時間制限: {} / メモリ制限: {}</p>\n\
             <section class=\"statement\">{}</section>\n\
             <section class=\"constraints\"><h3>制約</h3>{}</section>",
            escape_html(&c.time_limit),
            escape_html(&c.memory_limit),
            c.statement,
            c.constraints
        ),
        ContentState::Failed {
            message,
            official_url,
        } => format!(
            "<p class=\"error\">{}</p>\n<a href=\"{}\" target=\"_blank\" rel=\"noopener\">AtCoderで問題を開く</a>",
            escape_html(message),
            escape_html(official_url)
        ),
    }
}

fn render_live(live: &LiveCard, back: &str) -> String {
    match live.view() {
        LiveView::Player { embed_url, .. } => format!(
            "<div class=\"card\">\n<iframe src=\"{}\" allow=\"autoplay; encrypted-media\" allowfullscreen></iframe>\n\
             <form method=\"post\" action=\"/live/stop\"><input type=\"hidden\" name=\"back\" value=\"{back}\">\
             <button type=\"submit\">配信を終了</button></form>\n</div>",
            escape_html(&embed_url)
        ),
        LiveView::Placeholder => format!(
            "<div class=\"card\">\n<p>ライブ配信は行われていません</p>\n\
             <form method=\"post\" action=\"/live\"><input type=\"hidden\" name=\"back\" value=\"{back}\">\
             <input name=\"url\" placeholder=\"https://www.youtube.com/live/...\">\
             <button type=\"submit\">配信を表示</button></form>\n</div>"
        ),
    }
}

fn render_message(m: &Message, action: String) -> String {
    format!(
        "<div class=\"msg\"><span class=\"user\">{}</span>{}{}</div>",
        escape_html(&m.user),
        escape_html(&m.message),
        action
    )
}

fn heart_button(action: &str, fields: &[(&str, &str)], liked: bool, count: u32) -> String {
    let hidden: String = fields
        .iter()
        .map(|(k, v)| format!("<input type=\"hidden\" name=\"{k}\" value=\"{}\">", escape_html(v)))
        .collect();
    format!(
        " <form method=\"post\" action=\"{action}\" style=\"display:inline\">{hidden}\
         <button class=\"heart\" type=\"submit\">{} {count}</button></form>",
        if liked { "♥" } else { "♡" }
    )
}

fn problem_option(p: &WorkingProblem, selected: Option<&str>) -> String {
    format!(
        "<option value=\"{}\" style=\"color:{}\"{}>{}</option>",
        escape_html(p.id()),
        difficulty_color(p.difficulty),
        if selected == Some(p.id()) { " selected" } else { "" },
        escape_html(&p.label())
    )
}

pub fn render_driver(driver: &DriverView, live: &LiveCard, hearts: &LocalLikes) -> String {
    let header = format!(
        "<form method=\"post\" action=\"/driver/title\"><input name=\"title\" value=\"{}\"></form>\
         <form method=\"post\" action=\"/driver/live\"><button type=\"submit\">{}</button></form>",
        escape_html(&driver.stream_title),
        if driver.is_live { "配信停止" } else { "配信開始" }
    );

    let options: String = driver
        .problems
        .iter()
        .map(|p| problem_option(p, driver.selected.as_deref()))
        .collect();
    let selector = match &driver.load_error {
        Some(err) => format!("<p class=\"error\">{}</p>", escape_html(err)),
        None => format!(
            "<form method=\"post\" action=\"/driver/select\"><select name=\"problem\">{options}</select>\
             <button type=\"submit\">選択</button></form>"
        ),
    };

    let chat: String = driver
        .chat
        .messages
        .iter()
        .map(|m| {
            let status = hearts.status(&m.user, &m.message);
            let button = heart_button(
                "/driver/heart",
                &[("user", m.user.as_str()), ("text", m.message.as_str())],
                status.liked_by_me,
                status.liked_cnt,
            );
            render_message(m, button)
        })
        .collect();

    let body = format!(
        "<main>\n<div>\n<div class=\"card\">{selector}</div>\n<div class=\"card\">{}</div>\n</div>\n\
         <div>\n{}\n<div class=\"card\">\n<h3>チャット</h3>\n{chat}\n\
         <form method=\"post\" action=\"/driver/chat\"><input name=\"text\"><button type=\"submit\">送信</button></form>\n\
         </div>\n</div>\n</main>",
        render_content(&driver.content),
        render_live(live, "/driver"),
    );
    page(&driver.stream_title, &header, &body)
}

pub fn render_viewer(
    viewer: &ViewerView,
    live: &LiveCard,
    username: Option<&str>,
    services: &Services,
) -> String {
    let who = escape_html(username.unwrap_or(ANONYMOUS_USER));
    let header = format!("<strong>視聴中</strong><span>{who}</span>");

    let title = match &viewer.current {
        Some(p) => format!(
            "<h2><a href=\"{}\" target=\"_blank\" rel=\"noopener\">{}</a></h2>",
            escape_html(&services.problem_url(p)),
            escape_html(&p.label())
        ),
        None => "<h2>問題が選択されていません</h2>".to_string(),
    };

    let comments: String = viewer
        .thread
        .messages
        .iter()
        .map(|m| {
            let button = match m.message_id {
                Some(id) => {
                    let status = viewer.likes.status(id);
                    let id = id.to_string();
                    heart_button(
                        "/viewer/like",
                        &[("id", id.as_str())],
                        status.liked_by_me,
                        status.liked_cnt,
                    )
                }
                None => String::new(),
            };
            render_message(m, button)
        })
        .collect();

    let body = format!(
        "<main>\n<div>\n<div class=\"card\">{title}\n{}</div>\n</div>\n<div>\n{}\n\
         <div class=\"card\">\n<h3>コメント</h3>\n\
         <form method=\"post\" action=\"/viewer/refresh\"><button type=\"submit\">更新</button></form>\n\
         {comments}\n\
         <form method=\"post\" action=\"/viewer/comment\"><input name=\"text\" value=\"{}\"><button type=\"submit\">送信</button></form>\n\
         </div>\n</div>\n</main>",
        render_content(&viewer.content),
        render_live(live, "/viewer"),
        escape_html(&viewer.thread.draft),
    );
    page("視聴ページ", &header, &body)
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Bind `bind:port` and serve until the process exits.
pub async fn serve(config: Config, bind: &str, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(format!("{bind}:{port}")).await?;
    let addr = listener.local_addr()?;

    eprintln!(
        "{}",
        format!("  Live Coders running at http://{addr}").bright_green()
    );
    eprintln!("{}", "  Press Ctrl+C to stop.".bright_blue());

    let state = Arc::new(AppState::new(Services::from_config(config)));
    serve_on(listener, state).await?;
    Ok(())
}

/// Accept loop on an already bound listener.
pub async fn serve_on(listener: TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, &state).await {
                warn!(%peer, error = %e, "connection error");
            }
        });
    }
}

async fn handle_connection(
    mut stream: tokio::net::TcpStream,
    state: &AppState,
) -> std::io::Result<()> {
    let Some(request) = read_request(&mut stream).await? else {
        return Ok(());
    };
    let response = route(state, &request).await;
    stream.write_all(response.to_http().as_bytes()).await?;
    stream.shutdown().await
}
