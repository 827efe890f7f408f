//! Page-level state: login, driver and viewer.
//!
//! Views hold what a page shows and expose the operations its controls
//! trigger. Rendering lives in [`crate::web`].

use std::sync::Arc;

use tracing::{info, warn};

use crate::comments::{CommentClient, CommentThread, Message, ANONYMOUS_USER};
use crate::config::Config;
use crate::contest::ContestClient;
use crate::error::Result;
use crate::likes::{LikeStatus, ServerLikes};
use crate::poll::{PollHandle, PollReceiver, Poller};
use crate::problems::{default_problem, ProblemsClient, WorkingProblem};
use crate::statement::{ContentState, StatementClient};
use crate::store::{LocalStore, SharedStore};

/// Remote clients and the local store, shared by every view.
#[derive(Clone)]
pub struct Services {
    pub config: Arc<Config>,
    pub problems: Arc<ProblemsClient>,
    pub statements: Arc<StatementClient>,
    pub contests: Arc<ContestClient>,
    pub comments: CommentClient,
    pub store: SharedStore,
}

impl Services {
    pub fn new(config: Config, store: SharedStore) -> Self {
        let http = config.http_client();
        Self {
            problems: Arc::new(ProblemsClient::new(http.clone(), &config)),
            statements: Arc::new(StatementClient::new(http.clone(), config.proxies.clone())),
            contests: Arc::new(ContestClient::new(http.clone(), &config.atcoder_base_url)),
            comments: CommentClient::new(http, &config.comments_base_url),
            config: Arc::new(config),
            store,
        }
    }

    /// Services backed by the store file named in `config`.
    pub fn from_config(config: Config) -> Self {
        let store = LocalStore::open(&config.store_path).shared();
        Self::new(config, store)
    }

    pub fn problem_url(&self, problem: &WorkingProblem) -> String {
        problem.url(&self.config.atcoder_base_url)
    }

    /// Load the statement of `problem` into a panel state.
    pub async fn load_content(&self, problem: &WorkingProblem) -> ContentState {
        self.statements.load(&self.problem_url(problem)).await
    }

    /// Refresh the working set every `poll_interval`; its default entry is
    /// the current problem when the driver has not picked one.
    pub fn poll_working_set(&self) -> (PollHandle, PollReceiver<Vec<WorkingProblem>>) {
        let problems = self.problems.clone();
        Poller::new("working-set", self.config.poll_interval()).spawn(move || {
            let problems = problems.clone();
            async move { problems.load_working_set().await }
        })
    }
}

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Role {
    Driver,
    #[default]
    Viewer,
}

impl Role {
    pub fn parse(s: &str) -> Self {
        match s {
            "driver" => Role::Driver,
            _ => Role::Viewer,
        }
    }

    pub fn route(self) -> &'static str {
        match self {
            Role::Driver => "/driver",
            Role::Viewer => "/viewer",
        }
    }
}

/// Login form. There is no credential check: submitting only remembers
/// the name and picks the page.
#[derive(Debug, Clone, Default)]
pub struct LoginView {
    pub username: String,
    pub password: String,
    pub role: Role,
}

impl LoginView {
    pub fn submit(&self, store: &LocalStore) -> Result<&'static str> {
        let name = self.username.trim();
        if !name.is_empty() {
            store.set_username(name)?;
        }
        info!(role = ?self.role, "login");
        Ok(self.role.route())
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

pub const DRIVER_USER: &str = "ドライバー";

pub struct DriverView {
    pub stream_title: String,
    pub problems: Vec<WorkingProblem>,
    pub selected: Option<String>,
    pub is_live: bool,
    pub chat: CommentThread,
    pub content: ContentState,
    pub load_error: Option<String>,
    mounted: bool,
}

impl Default for DriverView {
    fn default() -> Self {
        Self {
            stream_title: "ABC123の問題を解く".to_string(),
            problems: Vec::new(),
            selected: None,
            is_live: false,
            chat: CommentThread::with_messages(vec![
                Message::new("システム", "配信の準備ができました"),
                Message::new("ユーザー1", "こんにちは！今日はどんな問題を解きますか？"),
            ]),
            content: ContentState::Empty,
            load_error: None,
            mounted: false,
        }
    }
}

impl DriverView {
    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Load the working set and open its default problem.
    pub async fn mount(&mut self, services: &Services) {
        self.mounted = true;
        match services.problems.load_working_set().await {
            Ok(set) => self.set_problems(set, services).await,
            Err(e) => {
                warn!(error = %e, "driver could not load problems");
                self.load_error = Some(e.user_message());
            }
        }
    }

    /// Replace the working set, keeping the selection when it survives.
    pub async fn set_problems(&mut self, set: Vec<WorkingProblem>, services: &Services) {
        self.load_error = None;
        self.problems = set;
        let keep = self
            .selected
            .as_deref()
            .is_some_and(|id| self.problems.iter().any(|p| p.id() == id));
        if !keep {
            if let Some(id) = default_problem(&self.problems).map(|p| p.id().to_string()) {
                self.select_problem(&id, services).await;
            }
        }
    }

    pub fn selected_problem(&self) -> Option<&WorkingProblem> {
        let id = self.selected.as_deref()?;
        self.problems.iter().find(|p| p.id() == id)
    }

    /// Select `id` and reload its statement. Unknown ids are ignored.
    pub async fn select_problem(&mut self, id: &str, services: &Services) -> bool {
        let Some(problem) = self.problems.iter().find(|p| p.id() == id).cloned() else {
            return false;
        };
        self.selected = Some(problem.id().to_string());
        self.content = services.load_content(&problem).await;
        true
    }

    pub fn toggle_live(&mut self) -> bool {
        self.is_live = !self.is_live;
        self.is_live
    }

    pub fn send_chat(&mut self) -> bool {
        self.chat.post_local(DRIVER_USER)
    }
}

// ---------------------------------------------------------------------------
// Viewer
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct ViewerView {
    pub thread: CommentThread,
    pub likes: ServerLikes,
    pub current: Option<WorkingProblem>,
    /// Default problem of the working set loaded at mount. Used until a
    /// driver pick or a poll result is known.
    pub mounted_default: Option<WorkingProblem>,
    pub content: ContentState,
    mounted: bool,
}

impl ViewerView {
    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Load problem metadata, comments and like state concurrently. Each
    /// slice is updated independently; no failure blocks the others.
    pub async fn mount(&mut self, services: &Services) {
        self.mounted = true;
        let room = services.config.room_id;
        let (working_set, messages, liked) = tokio::join!(
            services.problems.load_working_set(),
            services.comments.list(room, None),
            services.comments.try_list(room, Some(services.config.user_id)),
        );
        match working_set {
            Ok(set) => self.mounted_default = default_problem(&set).cloned(),
            Err(e) => warn!(error = %e, "viewer could not load problems"),
        }
        self.thread.replace(messages);
        self.apply_like_listing(liked);
    }

    fn apply_like_listing(&mut self, listing: Result<Vec<Message>>) {
        match listing {
            Ok(messages) => self.likes.sync_from(&messages),
            Err(e) => warn!(error = %e, "like state unavailable"),
        }
    }

    pub async fn refresh_comments(&mut self, services: &Services) {
        let messages = services.comments.list(services.config.room_id, None).await;
        self.thread.replace(messages);
    }

    pub async fn refresh_likes(&mut self, services: &Services) {
        let listing = services
            .comments
            .try_list(services.config.room_id, Some(services.config.user_id))
            .await;
        self.apply_like_listing(listing);
    }

    /// Show `problem` and load its statement if it changed.
    pub async fn follow(&mut self, problem: Option<WorkingProblem>, services: &Services) {
        let same = match (&self.current, &problem) {
            (Some(a), Some(b)) => a.id() == b.id(),
            (None, None) => true,
            _ => false,
        };
        if same {
            return;
        }
        self.content = match &problem {
            Some(p) => services.load_content(p).await,
            None => ContentState::Empty,
        };
        self.current = problem;
    }

    /// Send the draft as the stored username (or the anonymous name).
    pub async fn send_comment(&mut self, services: &Services) -> bool {
        let user = services
            .store
            .username()
            .unwrap_or_else(|| ANONYMOUS_USER.to_string());
        let sent = self
            .thread
            .send(&services.comments, services.config.room_id, &user)
            .await;
        if sent {
            self.refresh_likes(services).await;
        }
        sent
    }

    pub async fn toggle_like(&mut self, message_id: u64, services: &Services) -> Result<LikeStatus> {
        self.likes
            .toggle(&services.comments, message_id, services.config.user_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problems::Problem;

    fn offline_services() -> Services {
        let config = Config {
            comments_base_url: "http://127.0.0.1:1".into(),
            problems_base_url: "http://127.0.0.1:1".into(),
            atcoder_base_url: "http://127.0.0.1:1".into(),
            proxies: vec!["http://127.0.0.1:1/proxy".into()],
            ..Config::default()
        };
        Services::new(config, LocalStore::in_memory().shared())
    }

    fn working(contest: &str, index: &str) -> WorkingProblem {
        WorkingProblem {
            problem: Problem {
                id: format!("{contest}_{index}"),
                contest_id: contest.into(),
                problem_index: index.into(),
                name: "n".into(),
                title: "t".into(),
            },
            detail: None,
            difficulty: 100.0,
        }
    }

    #[test]
    fn login_routes_by_role_and_stores_name() {
        let store = LocalStore::in_memory();
        let login = LoginView {
            username: " alice ".into(),
            password: "ignored".into(),
            role: Role::Driver,
        };
        assert_eq!(login.submit(&store).unwrap(), "/driver");
        assert_eq!(store.username().as_deref(), Some("alice"));
        assert_eq!(Role::parse("viewer").route(), "/viewer");
        assert_eq!(Role::parse("anything").route(), "/viewer");
    }

    #[tokio::test]
    async fn driver_selects_default_and_keeps_valid_selection() {
        let services = offline_services();
        let mut driver = DriverView::default();
        driver
            .set_problems(vec![working("abc301", "a"), working("abc300", "a")], &services)
            .await;
        assert_eq!(driver.selected.as_deref(), Some("abc301_a"));
        assert!(matches!(driver.content, ContentState::Failed { .. }));

        assert!(driver.select_problem("abc300_a", &services).await);
        assert!(matches!(driver.content, ContentState::Failed { .. }));
        driver
            .set_problems(vec![working("abc302", "a"), working("abc300", "a")], &services)
            .await;
        assert_eq!(driver.selected.as_deref(), Some("abc300_a"));
        assert!(!driver.select_problem("nope", &services).await);
    }

    #[tokio::test]
    async fn driver_mount_failure_is_soft() {
        let services = offline_services();
        let mut driver = DriverView::default();
        driver.mount(&services).await;
        assert!(driver.is_mounted());
        assert!(driver.problems.is_empty());
        assert!(driver.load_error.is_some());
    }

    #[test]
    fn driver_chat_and_live_toggle() {
        let mut driver = DriverView::default();
        assert_eq!(driver.chat.messages.len(), 2);
        driver.chat.draft = "解きます".into();
        assert!(driver.send_chat());
        assert_eq!(driver.chat.messages.last().unwrap().user, DRIVER_USER);
        assert!(driver.toggle_live());
        assert!(!driver.toggle_live());
    }

    #[tokio::test]
    async fn viewer_mount_offline_shows_placeholders() {
        let services = offline_services();
        let mut viewer = ViewerView::default();
        viewer.mount(&services).await;
        assert_eq!(viewer.thread.messages, crate::comments::placeholder_messages());
        assert!(viewer.mounted_default.is_none());
    }

    #[tokio::test]
    async fn viewer_follow_reloads_only_on_change() {
        let services = offline_services();
        let mut viewer = ViewerView::default();
        viewer.follow(Some(working("abc300", "a")), &services).await;
        assert!(matches!(viewer.content, ContentState::Failed { .. }));
        viewer.content = ContentState::Loading;
        viewer.follow(Some(working("abc300", "a")), &services).await;
        assert_eq!(viewer.content, ContentState::Loading);
        viewer.follow(None, &services).await;
        assert_eq!(viewer.content, ContentState::Empty);
    }
}
