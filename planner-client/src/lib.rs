//! Клиентская библиотека планировщика поездок.
//!
//! `PlannerClient` работает с REST API сервера: вход и регистрация, планы
//! поездок, приглашения компаньонов, доска постов с комментариями и лайками,
//! календарь. Токен хранится в [`Session`]; ответ 401 на любой запрос
//! сбрасывает сессию и оставляет отложенный переход на [`Route::Login`].
//!
//! Вне сети доступны развёртка календаря ([`CalendarExpander`]), локальное
//! зеркало коллекций ([`LocalStore`]) и валидация форм ([`forms`]).
#![warn(missing_docs)]

mod calendar;
mod error;
pub mod forms;
mod http_client;
mod invite;
mod models;
mod routes;
mod session;
mod storage;
mod store;
mod ticket;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{info, warn};

pub use calendar::{
    CalendarEvent, CalendarExpander, CalendarExpansion, DEFAULT_MAX_SPAN_DAYS,
    DEFAULT_OFFSET_HOURS, DayCell, MonthGrid, SkipReason, SkippedSchedule,
};
pub use error::{PlannerError, PlannerResult};
pub use forms::FormErrors;
pub use invite::{InviteLink, InviteOutcome};
pub use models::{AuthResponse, Comment, Participant, Post, Schedule, User, UserSummary};
pub use routes::Route;
pub use session::{Session, decode_user_id};
pub use storage::{
    FileStorage, MemoryStorage, NEXT_IDS_KEY, PARTICIPANTS_KEY, PLANS_KEY, POSTS_KEY, Storage,
    StorageError, StorageResult, TOKEN_KEY,
};
pub use store::{IdPolicy, LocalStore};
pub use ticket::Ticket;

use forms::{CommentForm, EmailForm, JoinForm, LoginForm, PlanForm, PostForm, ProfileForm};
use http_client::HttpClient;

/// Адрес сервера по умолчанию.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";
/// Дедлайн запроса по умолчанию.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
/// Параметры клиента.
pub struct ClientConfig {
    /// Базовый URL REST API, например `http://127.0.0.1:8080`.
    pub base_url: String,
    /// Дедлайн одного запроса.
    pub timeout: Duration,
    /// Параметры развёртки календаря.
    pub calendar: CalendarExpander,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            calendar: CalendarExpander::default(),
        }
    }
}

#[derive(Debug)]
/// Владелец плана и результат его загрузки.
pub struct OwnerLookup {
    /// Идентификатор владельца.
    pub owner_id: i64,
    /// Пользователь или ошибка загрузки именно этого владельца.
    pub user: PlannerResult<User>,
}

#[derive(Debug, Clone)]
/// Клиент планировщика поверх HTTP.
pub struct PlannerClient {
    http: HttpClient,
    session: Arc<Session>,
    calendar: CalendarExpander,
}

impl PlannerClient {
    /// Создаёт клиент поверх существующей сессии.
    pub fn new(config: ClientConfig, session: Arc<Session>) -> PlannerResult<Self> {
        let http = HttpClient::new(config.base_url, config.timeout, session.clone())?;
        Ok(Self {
            http,
            session,
            calendar: config.calendar,
        })
    }

    /// Сессия клиента.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Забирает отложенный переход (например, на `/login` после 401).
    pub fn take_redirect(&self) -> Option<Route> {
        self.session.take_redirect()
    }

    /// Параметры развёртки календаря.
    pub fn calendar_expander(&self) -> CalendarExpander {
        self.calendar
    }

    fn require_auth(&self) -> PlannerResult<i64> {
        match self.session.user_id() {
            Some(user_id) if self.session.is_authenticated() => Ok(user_id),
            _ => {
                self.session.require_login();
                Err(PlannerError::Unauthorized)
            }
        }
    }

    /// Вход. Токен сохраняется в сессии.
    pub async fn login(&self, form: LoginForm) -> PlannerResult<AuthResponse> {
        let form = form.into_draft()?;
        let token = self.http.login(&form.email, &form.password).await?;
        let user_id = self.session.sign_in(&token)?;
        info!(user_id, "signed in");
        Ok(AuthResponse { token, user_id })
    }

    /// Регистрация. Токен сохраняется в сессии.
    pub async fn join(&self, form: JoinForm) -> PlannerResult<AuthResponse> {
        let form = form.into_draft()?;
        let token = self
            .http
            .join(&form.email, &form.password, &form.nick)
            .await?;
        let user_id = self.session.sign_in(&token)?;
        info!(user_id, "account created");
        Ok(AuthResponse { token, user_id })
    }

    /// Запрашивает письмо для подтверждения email.
    pub async fn verify_email(&self, email: &str) -> PlannerResult<Option<String>> {
        let email = EmailForm {
            email: email.to_string(),
        }
        .into_email()?;
        self.http.verify_email(&email).await
    }

    /// Выход: токен удаляется из хранилища.
    pub fn logout(&self) -> PlannerResult<()> {
        self.session.sign_out()
    }

    /// Текущий пользователь.
    pub async fn me(&self) -> PlannerResult<User> {
        let user_id = self.require_auth()?;
        self.http.get_user(user_id).await
    }

    /// Пользователь по id.
    pub async fn get_user(&self, id: i64) -> PlannerResult<User> {
        self.http.get_user(id).await
    }

    /// Обновляет профиль текущего пользователя.
    pub async fn update_profile(&self, form: ProfileForm) -> PlannerResult<User> {
        let form = form.into_draft()?;
        let user_id = self.require_auth()?;
        self.http.update_user(user_id, &form).await
    }

    /// Планы текущего пользователя.
    pub async fn list_plans(&self) -> PlannerResult<Vec<Schedule>> {
        self.require_auth()?;
        self.http.list_trips().await
    }

    /// План по id.
    pub async fn get_plan(&self, id: i64) -> PlannerResult<Schedule> {
        self.http.get_trip(id).await
    }

    /// Создаёт план. Невалидная форма не доходит до сервера.
    pub async fn create_plan(&self, form: PlanForm) -> PlannerResult<Schedule> {
        let draft = form.into_draft()?;
        self.require_auth()?;
        self.http.create_trip(&draft).await
    }

    /// Обновляет план.
    pub async fn update_plan(&self, id: i64, form: PlanForm) -> PlannerResult<Schedule> {
        let draft = form.into_draft()?;
        self.require_auth()?;
        self.http.update_trip(id, &draft).await
    }

    /// Удаляет план.
    pub async fn delete_plan(&self, id: i64) -> PlannerResult<()> {
        self.require_auth()?;
        self.http.delete_trip(id).await
    }

    /// Компаньоны плана.
    pub async fn companions(&self, plan_id: i64) -> PlannerResult<Vec<UserSummary>> {
        self.http.list_companions(plan_id).await
    }

    /// Запрашивает ссылку-приглашение для плана.
    ///
    /// Срок действия и отзыв ссылки контролирует сервер.
    pub async fn create_invite(&self, plan_id: i64, owner_id: i64) -> PlannerResult<InviteLink> {
        self.require_auth()?;
        let raw = self.http.create_invite(plan_id, owner_id).await?;
        let mut link = InviteLink::parse_with_base(&raw, self.http.base_url())?;
        if link.plan_id.is_none() {
            link.plan_id = Some(plan_id);
        }
        Ok(link)
    }

    /// Принимает приглашение от имени текущего пользователя.
    ///
    /// `fallback_plan_id` используется, если в ссылке нет идентификатора плана.
    pub async fn accept_invite(
        &self,
        link: &InviteLink,
        fallback_plan_id: Option<i64>,
    ) -> PlannerResult<InviteOutcome> {
        let plan_id = link.resolve_plan_id(fallback_plan_id)?;
        self.require_auth()?;
        let accepted = self.http.accept_invite(plan_id, &link.code).await?;
        info!(plan_id, "invite accepted");
        Ok(InviteOutcome {
            plan_id,
            message: accepted.message,
            plan: accepted.plan,
        })
    }

    /// Покидает план, в котором пользователь компаньон.
    pub async fn leave_plan(&self, plan_id: i64) -> PlannerResult<()> {
        self.require_auth()?;
        self.http.leave_trip(plan_id).await
    }

    /// Посты доски.
    pub async fn list_posts(&self) -> PlannerResult<Vec<Post>> {
        self.http.list_posts().await
    }

    /// Пост по id.
    pub async fn get_post(&self, id: i64) -> PlannerResult<Post> {
        self.http.get_post(id).await
    }

    /// Создаёт пост.
    pub async fn create_post(&self, form: PostForm) -> PlannerResult<Post> {
        let form = form.into_draft()?;
        self.require_auth()?;
        self.http.create_post(&form).await
    }

    /// Обновляет пост.
    pub async fn update_post(&self, id: i64, form: PostForm) -> PlannerResult<Post> {
        let form = form.into_draft()?;
        self.require_auth()?;
        self.http.update_post(id, &form).await
    }

    /// Удаляет пост.
    pub async fn delete_post(&self, id: i64) -> PlannerResult<()> {
        self.require_auth()?;
        self.http.delete_post(id).await
    }

    /// Ставит лайк. Возвращает счётчик, если сервер его прислал.
    ///
    /// Повторные вызовы не дедуплицируются.
    pub async fn like_post(&self, id: i64) -> PlannerResult<Option<u32>> {
        self.require_auth()?;
        self.http.like_post(id).await
    }

    /// Комментарии поста.
    pub async fn list_comments(&self, post_id: i64) -> PlannerResult<Vec<Comment>> {
        self.http.list_comments(post_id).await
    }

    /// Добавляет комментарий.
    pub async fn add_comment(&self, post_id: i64, form: CommentForm) -> PlannerResult<Comment> {
        let content = form.into_content()?;
        self.require_auth()?;
        self.http.add_comment(post_id, &content).await
    }

    /// Редактирует комментарий.
    pub async fn update_comment(
        &self,
        post_id: i64,
        comment_id: i64,
        form: CommentForm,
    ) -> PlannerResult<Comment> {
        let content = form.into_content()?;
        self.require_auth()?;
        self.http.update_comment(post_id, comment_id, &content).await
    }

    /// Удаляет комментарий.
    pub async fn delete_comment(&self, post_id: i64, comment_id: i64) -> PlannerResult<()> {
        self.require_auth()?;
        self.http.delete_comment(post_id, comment_id).await
    }

    /// Планы пользователя для календаря.
    pub async fn calendar_schedules(&self, user_id: i64) -> PlannerResult<Vec<Schedule>> {
        self.http.calendar(user_id).await
    }

    /// Календарь пользователя, разложенный по дням.
    pub async fn calendar(&self, user_id: i64) -> PlannerResult<CalendarExpansion> {
        let schedules = self.calendar_schedules(user_id).await?;
        Ok(self.calendar.expand(&schedules))
    }

    /// Календарь текущего пользователя.
    pub async fn my_calendar(&self) -> PlannerResult<CalendarExpansion> {
        let user_id = self.require_auth()?;
        self.calendar(user_id).await
    }

    /// Загружает владельцев планов параллельно.
    ///
    /// Ошибка загрузки одного владельца не отменяет остальные: результат
    /// возвращается для каждого уникального владельца отдельно.
    pub async fn fetch_owners(&self, schedules: &[Schedule]) -> Vec<OwnerLookup> {
        let owners: BTreeSet<i64> = schedules.iter().map(|schedule| schedule.owner).collect();

        let lookups = owners.into_iter().map(|owner_id| async move {
            let user = self.http.get_user(owner_id).await;
            if let Err(err) = &user {
                warn!(owner_id, error = %err, "failed to load plan owner");
            }
            OwnerLookup { owner_id, user }
        });
        join_all(lookups).await
    }

    /// Билет плана. Если владельца загрузить не удалось, билет строится без него.
    pub async fn ticket(&self, plan_id: i64) -> PlannerResult<Ticket> {
        let schedule = self.http.get_trip(plan_id).await?;
        let owner = match self.http.get_user(schedule.owner).await {
            Ok(user) => Some(user),
            Err(PlannerError::Unauthorized) => return Err(PlannerError::Unauthorized),
            Err(err) => {
                warn!(plan_id, owner_id = schedule.owner, error = %err, "ticket without owner");
                None
            }
        };
        Ok(Ticket::from_schedule(
            &schedule,
            owner.as_ref(),
            self.calendar.offset(),
        ))
    }
}
