use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::{Datelike, Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use planner_client::forms::{CommentForm, JoinForm, LoginForm, PlanForm, PostForm, ProfileForm};
use planner_client::{
    CalendarExpansion, Comment, FileStorage, InviteLink, LocalStore, MonthGrid, Participant,
    PlannerClient, PlannerError, Post, Schedule, Session, Storage, Ticket, User, UserSummary,
};
use serde::Serialize;
use tracing::{debug, info, warn};

mod logging;
mod settings;

use logging::init_logging;
use settings::Settings;

#[derive(Debug, Parser)]
#[command(name = "planner-cli", version, about = "CLI клиент планировщика поездок")]
struct Cli {
    /// Адрес REST API (перекрывает PLANNER_API_URL).
    #[arg(long, global = true)]
    server: Option<String>,

    /// Каталог с токеном и локальными коллекциями (перекрывает PLANNER_DATA_DIR).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Печатать результат как JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Вход по email и паролю.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Регистрация.
    Join {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        /// Повтор пароля; по умолчанию совпадает с `--password`.
        #[arg(long)]
        password_confirm: Option<String>,
        #[arg(long)]
        nick: String,
    },
    /// Запросить письмо для подтверждения email.
    VerifyEmail {
        #[arg(long)]
        email: String,
    },
    /// Выход: токен удаляется.
    Logout,
    /// Текущий пользователь.
    Whoami,
    /// Профили пользователей.
    User {
        #[command(subcommand)]
        command: UserCommand,
    },
    /// Планы поездок.
    Plan {
        #[command(subcommand)]
        command: PlanCommand,
    },
    /// Календарь поездок по дням.
    Calendar {
        /// Чей календарь; по умолчанию текущего пользователя.
        #[arg(long)]
        user: Option<i64>,
        /// Показать сетку месяца, формат `YYYY-MM`.
        #[arg(long)]
        month: Option<String>,
    },
    /// Доска постов.
    Board {
        #[command(subcommand)]
        command: BoardCommand,
    },
    /// Комментарии к постам.
    Comment {
        #[command(subcommand)]
        command: CommentCommand,
    },
    /// Локальные копии коллекций (без сети).
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

#[derive(Debug, Subcommand)]
enum UserCommand {
    /// Профиль по id; без `--id` свой.
    Show {
        #[arg(long)]
        id: Option<i64>,
    },
    /// Обновить свой профиль (требует токен).
    Update {
        #[arg(long)]
        nick: String,
        #[arg(long)]
        image: Option<PathBuf>,
    },
}

#[derive(Debug, Args)]
struct PlanArgs {
    #[arg(long)]
    title: String,
    #[arg(long)]
    destination: String,
    /// Дата начала, `YYYY-MM-DD`.
    #[arg(long)]
    start: String,
    /// Дата окончания (включительно), `YYYY-MM-DD`.
    #[arg(long)]
    end: String,
    #[arg(long)]
    image: Option<PathBuf>,
}

impl From<PlanArgs> for PlanForm {
    fn from(args: PlanArgs) -> Self {
        Self {
            title: args.title,
            destination: args.destination,
            start_date: args.start,
            end_date: args.end,
            image: args.image,
        }
    }
}

#[derive(Debug, Subcommand)]
enum PlanCommand {
    /// Свои планы (требует токен).
    List,
    /// Билет плана.
    Show {
        #[arg(long)]
        id: i64,
    },
    /// Создать план (требует токен).
    Create(PlanArgs),
    /// Обновить план (требует токен).
    Update {
        #[arg(long)]
        id: i64,
        #[command(flatten)]
        plan: PlanArgs,
    },
    /// Удалить план (требует токен).
    Delete {
        #[arg(long)]
        id: i64,
    },
    /// Компаньоны плана.
    Companions {
        #[arg(long)]
        id: i64,
    },
    /// Создать ссылку-приглашение (требует токен, только владелец).
    Invite {
        #[arg(long)]
        id: i64,
    },
    /// Принять приглашение по ссылке (требует токен).
    Accept {
        #[arg(long)]
        link: String,
        /// План, если в ссылке его нет.
        #[arg(long)]
        plan: Option<i64>,
    },
    /// Покинуть план (требует токен).
    Leave {
        #[arg(long)]
        id: i64,
    },
}

#[derive(Debug, Args)]
struct PostArgs {
    #[arg(long)]
    title: String,
    #[arg(long)]
    content: String,
    /// План, к которому относится пост.
    #[arg(long)]
    trip: Option<i64>,
    #[arg(long)]
    image: Option<PathBuf>,
}

impl From<PostArgs> for PostForm {
    fn from(args: PostArgs) -> Self {
        Self {
            title: args.title,
            content: args.content,
            trip_id: args.trip,
            image: args.image,
        }
    }
}

#[derive(Debug, Subcommand)]
enum BoardCommand {
    /// Все посты.
    List,
    /// Пост по id.
    Show {
        #[arg(long)]
        id: i64,
    },
    /// Создать пост (требует токен).
    Create(PostArgs),
    /// Обновить пост (требует токен).
    Update {
        #[arg(long)]
        id: i64,
        #[command(flatten)]
        post: PostArgs,
    },
    /// Удалить пост (требует токен).
    Delete {
        #[arg(long)]
        id: i64,
    },
    /// Поставить лайк (требует токен).
    Like {
        #[arg(long)]
        id: i64,
    },
}

#[derive(Debug, Subcommand)]
enum CommentCommand {
    /// Комментарии поста.
    List {
        #[arg(long)]
        post: i64,
    },
    /// Добавить комментарий (требует токен).
    Add {
        #[arg(long)]
        post: i64,
        #[arg(long)]
        content: String,
    },
    /// Отредактировать комментарий (требует токен).
    Edit {
        #[arg(long)]
        post: i64,
        #[arg(long)]
        id: i64,
        #[arg(long)]
        content: String,
    },
    /// Удалить комментарий (требует токен).
    Delete {
        #[arg(long)]
        post: i64,
        #[arg(long)]
        id: i64,
    },
}

#[derive(Debug, Subcommand)]
enum CacheCommand {
    /// Посты из локальной копии.
    Posts,
    /// Планы и участники из локальной копии.
    Plans,
}

struct App {
    client: PlannerClient,
    store: LocalStore,
    json: bool,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Ошибка: {err:#}");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let settings = Settings::from_env()?.with_overrides(cli.server, cli.data_dir);
    init_logging(&settings.log_level)?;

    let storage: Arc<dyn Storage> = Arc::new(
        FileStorage::open(&settings.data_dir)
            .with_context(|| format!("не удалось открыть {}", settings.data_dir.display()))?,
    );
    let session = Arc::new(Session::load(storage.clone()).context("не удалось прочитать токен")?);
    let client = PlannerClient::new(settings.client_config(), session)
        .context("не удалось создать HTTP клиент")?;
    let store = LocalStore::load(storage, settings.id_policy)
        .context("не удалось прочитать локальные коллекции")?;
    debug!(
        api_url = %settings.api_url,
        data_dir = %settings.data_dir.display(),
        id_policy = ?settings.id_policy,
        "planner cli ready"
    );

    let mut app = App {
        client,
        store,
        json: cli.json,
    };
    let result = app.dispatch(cli.command).await;

    if let Some(route) = app.client.take_redirect() {
        warn!(route = route.path(), "session expired, login required");
        eprintln!("Сессия недействительна, переход: {}", route.path());
    }
    result
}

impl App {
    async fn dispatch(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Login { email, password } => {
                let auth = self
                    .client
                    .login(LoginForm { email, password })
                    .await
                    .map_err(map_client_error)?;
                println!("Вход выполнен: user_id={}", auth.user_id);
            }
            Command::Join {
                email,
                password,
                password_confirm,
                nick,
            } => {
                let password_confirm = password_confirm.unwrap_or_else(|| password.clone());
                let auth = self
                    .client
                    .join(JoinForm {
                        email,
                        password,
                        password_confirm,
                        nick,
                    })
                    .await
                    .map_err(map_client_error)?;
                println!("Регистрация успешна: user_id={}", auth.user_id);
            }
            Command::VerifyEmail { email } => {
                let message = self
                    .client
                    .verify_email(&email)
                    .await
                    .map_err(map_client_error)?;
                println!("{}", message.unwrap_or_else(|| "Письмо отправлено".to_string()));
            }
            Command::Logout => {
                self.client.logout().map_err(map_client_error)?;
                println!("Выход выполнен");
            }
            Command::Whoami => {
                let user = self.client.me().await.map_err(map_client_error)?;
                self.print_user(&user)?;
            }
            Command::User { command } => self.user(command).await?,
            Command::Plan { command } => self.plan(command).await?,
            Command::Calendar { user, month } => self.calendar(user, month).await?,
            Command::Board { command } => self.board(command).await?,
            Command::Comment { command } => self.comment(command).await?,
            Command::Cache { command } => self.cache(command)?,
        }
        Ok(())
    }

    async fn user(&mut self, command: UserCommand) -> Result<()> {
        let user = match command {
            UserCommand::Show { id: Some(id) } => self.client.get_user(id).await,
            UserCommand::Show { id: None } => self.client.me().await,
            UserCommand::Update { nick, image } => {
                self.client
                    .update_profile(ProfileForm { nick, image })
                    .await
            }
        }
        .map_err(map_client_error)?;
        self.print_user(&user)
    }

    async fn plan(&mut self, command: PlanCommand) -> Result<()> {
        match command {
            PlanCommand::List => {
                let plans = self.client.list_plans().await.map_err(map_client_error)?;
                self.store.replace_plans(plans.clone()).map_err(map_client_error)?;
                info!(count = plans.len(), "plans mirror refreshed");
                self.print_plans(&plans)?;
            }
            PlanCommand::Show { id } => {
                let ticket = self.client.ticket(id).await.map_err(map_client_error)?;
                print_ticket(&ticket, Local::now().date_naive());
            }
            PlanCommand::Create(args) => {
                let plan = self
                    .client
                    .create_plan(args.into())
                    .await
                    .map_err(map_client_error)?;
                self.store.add_plan(plan.clone()).map_err(map_client_error)?;
                println!("План создан");
                print_plan(&plan);
            }
            PlanCommand::Update { id, plan } => {
                let plan = self
                    .client
                    .update_plan(id, plan.into())
                    .await
                    .map_err(map_client_error)?;
                if !self.store.edit_plan(id, plan.clone()).map_err(map_client_error)? {
                    self.store.add_plan(plan.clone()).map_err(map_client_error)?;
                }
                println!("План обновлён");
                print_plan(&plan);
            }
            PlanCommand::Delete { id } => {
                self.client.delete_plan(id).await.map_err(map_client_error)?;
                self.store.delete_plan(id).map_err(map_client_error)?;
                println!("План удалён: id={id}");
            }
            PlanCommand::Companions { id } => {
                let companions = self.client.companions(id).await.map_err(map_client_error)?;
                let participants = companions
                    .iter()
                    .map(|user| Participant {
                        plan_id: id,
                        user_id: user.id,
                        nick: user.nick.clone(),
                    })
                    .collect();
                self.store
                    .replace_participants(id, participants)
                    .map_err(map_client_error)?;
                self.print_companions(id, &companions)?;
            }
            PlanCommand::Invite { id } => {
                let Some(owner_id) = self.client.session().user_id() else {
                    self.client.session().require_login();
                    return Err(map_client_error(PlannerError::Unauthorized));
                };
                let link = self
                    .client
                    .create_invite(id, owner_id)
                    .await
                    .map_err(map_client_error)?;
                println!("Ссылка-приглашение: {}", link.url);
            }
            PlanCommand::Accept { link, plan } => {
                let link = InviteLink::parse(&link).map_err(map_client_error)?;
                let outcome = self
                    .client
                    .accept_invite(&link, plan)
                    .await
                    .map_err(map_client_error)?;
                if let Some(plan) = &outcome.plan {
                    self.store.add_plan(plan.clone()).map_err(map_client_error)?;
                }
                println!(
                    "{}: plan_id={}",
                    outcome.message.as_deref().unwrap_or("Приглашение принято"),
                    outcome.plan_id
                );
            }
            PlanCommand::Leave { id } => {
                self.client.leave_plan(id).await.map_err(map_client_error)?;
                if let Some(user_id) = self.client.session().user_id() {
                    self.store
                        .remove_participant(id, user_id)
                        .map_err(map_client_error)?;
                }
                println!("Вы покинули план: id={id}");
            }
        }
        Ok(())
    }

    async fn calendar(&mut self, user: Option<i64>, month: Option<String>) -> Result<()> {
        let month = month.as_deref().map(parse_month).transpose()?;
        let expansion = match user {
            Some(user_id) => self.client.calendar(user_id).await,
            None => self.client.my_calendar().await,
        }
        .map_err(map_client_error)?;

        match month {
            Some((year, month)) => {
                let grid = expansion
                    .month_grid(year, month)
                    .ok_or_else(|| anyhow!("некорректный месяц: {year}-{month:02}"))?;
                print_month(&grid);
            }
            None => print_calendar(&expansion),
        }
        Ok(())
    }

    async fn board(&mut self, command: BoardCommand) -> Result<()> {
        match command {
            BoardCommand::List => {
                let posts = self.client.list_posts().await.map_err(map_client_error)?;
                self.store.replace_posts(posts.clone()).map_err(map_client_error)?;
                info!(count = posts.len(), "posts mirror refreshed");
                self.print_posts(&posts)?;
            }
            BoardCommand::Show { id } => {
                let post = self.client.get_post(id).await.map_err(map_client_error)?;
                print_post("Пост", &post);
            }
            BoardCommand::Create(args) => {
                let post = self
                    .client
                    .create_post(args.into())
                    .await
                    .map_err(map_client_error)?;
                self.store.add_post(post.clone()).map_err(map_client_error)?;
                print_post("Пост создан", &post);
            }
            BoardCommand::Update { id, post } => {
                let post = self
                    .client
                    .update_post(id, post.into())
                    .await
                    .map_err(map_client_error)?;
                self.store.add_post(post.clone()).map_err(map_client_error)?;
                print_post("Пост обновлён", &post);
            }
            BoardCommand::Delete { id } => {
                self.client.delete_post(id).await.map_err(map_client_error)?;
                self.store.delete_post(id).map_err(map_client_error)?;
                println!("Пост удалён: id={id}");
            }
            BoardCommand::Like { id } => {
                let likes = match self.client.like_post(id).await.map_err(map_client_error)? {
                    Some(likes) => {
                        self.store.set_likes(id, likes).map_err(map_client_error)?;
                        Some(likes)
                    }
                    None => self.store.like_post(id).map_err(map_client_error)?,
                };
                match likes {
                    Some(likes) => println!("Лайк поставлен: id={id}, likes={likes}"),
                    None => println!("Лайк поставлен: id={id}"),
                }
            }
        }
        Ok(())
    }

    async fn comment(&mut self, command: CommentCommand) -> Result<()> {
        match command {
            CommentCommand::List { post } => {
                let comments = self
                    .client
                    .list_comments(post)
                    .await
                    .map_err(map_client_error)?;
                self.print_comments(&comments)?;
            }
            CommentCommand::Add { post, content } => {
                let comment = self
                    .client
                    .add_comment(post, CommentForm { content })
                    .await
                    .map_err(map_client_error)?;
                println!("Комментарий добавлен: id={}", comment.id);
            }
            CommentCommand::Edit { post, id, content } => {
                let comment = self
                    .client
                    .update_comment(post, id, CommentForm { content })
                    .await
                    .map_err(map_client_error)?;
                println!("Комментарий обновлён: id={}", comment.id);
            }
            CommentCommand::Delete { post, id } => {
                self.client
                    .delete_comment(post, id)
                    .await
                    .map_err(map_client_error)?;
                println!("Комментарий удалён: id={id}");
            }
        }
        Ok(())
    }

    fn cache(&self, command: CacheCommand) -> Result<()> {
        match command {
            CacheCommand::Posts => self.print_posts(self.store.posts()),
            CacheCommand::Plans => {
                self.print_plans(self.store.plans())?;
                if !self.json {
                    for plan in self.store.plans() {
                        let nicks: Vec<&str> = self
                            .store
                            .participants_of(plan.id)
                            .into_iter()
                            .map(|participant| participant.nick.as_str())
                            .collect();
                        if !nicks.is_empty() {
                            println!("  [{}] участники: {}", plan.id, nicks.join(", "));
                        }
                    }
                }
                Ok(())
            }
        }
    }

    fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<bool> {
        if !self.json {
            return Ok(false);
        }
        let rendered = serde_json::to_string_pretty(value).context("не удалось сериализовать")?;
        println!("{rendered}");
        Ok(true)
    }

    fn print_user(&self, user: &User) -> Result<()> {
        if self.print_json(user)? {
            return Ok(());
        }
        println!("id: {}", user.id);
        println!("nick: {}", user.nick);
        if let Some(email) = &user.email {
            println!("email: {email}");
        }
        if let Some(profile) = &user.profile {
            println!("profile: {profile}");
        }
        Ok(())
    }

    fn print_plans(&self, plans: &[Schedule]) -> Result<()> {
        if self.print_json(plans)? {
            return Ok(());
        }
        println!("Планов: {}", plans.len());
        for plan in plans {
            println!(
                "- [{}] {} ({}, {} - {})",
                plan.id,
                plan.title,
                plan.destination,
                plan.start_date.format("%Y-%m-%d"),
                plan.end_date.format("%Y-%m-%d")
            );
        }
        Ok(())
    }

    fn print_companions(&self, plan_id: i64, companions: &[UserSummary]) -> Result<()> {
        if self.print_json(companions)? {
            return Ok(());
        }
        println!("Компаньоны плана {plan_id}: {}", companions.len());
        for user in companions {
            println!("- [{}] {}", user.id, user.nick);
        }
        Ok(())
    }

    fn print_posts(&self, posts: &[Post]) -> Result<()> {
        if self.print_json(posts)? {
            return Ok(());
        }
        println!("Постов: {}", posts.len());
        for post in posts {
            println!(
                "- [{}] {} (author={}, likes={})",
                post.id, post.title, post.author.nick, post.likes
            );
        }
        Ok(())
    }

    fn print_comments(&self, comments: &[Comment]) -> Result<()> {
        if self.print_json(comments)? {
            return Ok(());
        }
        println!("Комментариев: {}", comments.len());
        for comment in comments {
            println!(
                "- [{}] {}: {}",
                comment.id, comment.author.nick, comment.content
            );
        }
        Ok(())
    }
}

fn parse_month(raw: &str) -> Result<(i32, u32)> {
    let date = NaiveDate::parse_from_str(&format!("{}-01", raw.trim()), "%Y-%m-%d")
        .with_context(|| format!("ожидается месяц в формате YYYY-MM, получено '{raw}'"))?;
    Ok((date.year(), date.month()))
}

fn map_client_error(err: PlannerError) -> anyhow::Error {
    let message = match err {
        PlannerError::Unauthorized => {
            "требуется авторизация: выполните `planner-cli login ...` или `planner-cli join ...`"
                .to_string()
        }
        PlannerError::Forbidden => "недостаточно прав".to_string(),
        PlannerError::NotFound => "ресурс не найден".to_string(),
        PlannerError::InvalidRequest(message) => format!("некорректный запрос: {message}"),
        PlannerError::Validation(errors) => format!("форма заполнена неверно: {errors}"),
        PlannerError::InvalidInvite(message) => format!("некорректное приглашение: {message}"),
        PlannerError::Http(err) => format!("ошибка HTTP: {err}"),
        PlannerError::Token(err) => format!("некорректный токен: {err}"),
        PlannerError::Storage(err) => format!("ошибка локального хранилища: {err}"),
        PlannerError::Io(err) => format!("ошибка ввода-вывода: {err}"),
    };
    anyhow!(message)
}

fn print_plan(plan: &Schedule) {
    println!("id: {}", plan.id);
    println!("title: {}", plan.title);
    println!("destination: {}", plan.destination);
    println!(
        "dates: {} - {}",
        plan.start_date.format("%Y-%m-%d"),
        plan.end_date.format("%Y-%m-%d")
    );
}

fn print_ticket(ticket: &Ticket, today: NaiveDate) {
    println!("{ticket}");
    println!("{}", ticket.d_day(today));
}

fn print_post(title: &str, post: &Post) {
    println!("{title}");
    println!("id: {}", post.id);
    println!("title: {}", post.title);
    println!("content: {}", post.content);
    println!("author: {}", post.author.nick);
    println!("likes: {}", post.likes);
    if let Some(trip_id) = post.trip_id {
        println!("trip_id: {trip_id}");
    }
    println!("created_at: {}", post.created_at);
}

fn print_calendar(expansion: &CalendarExpansion) {
    for (date, events) in expansion.days() {
        let titles: Vec<&str> = events.iter().map(|event| event.title.as_str()).collect();
        println!("{}: {}", CalendarExpansion::day_key(*date), titles.join(", "));
    }
    for skipped in expansion.skipped() {
        warn!(
            schedule_id = skipped.schedule_id,
            reason = ?skipped.reason,
            "plan skipped in calendar"
        );
        eprintln!(
            "пропущен план [{}] {}: {:?}",
            skipped.schedule_id, skipped.title, skipped.reason
        );
    }
}

fn print_month(grid: &MonthGrid) {
    println!("{}-{:02}", grid.year, grid.month);
    println!(" Su  Mo  Tu  We  Th  Fr  Sa");
    for week in &grid.weeks {
        let line: Vec<String> = week
            .iter()
            .map(|cell| match cell {
                Some(cell) if cell.events.is_empty() => format!("{:>3} ", cell.date.day()),
                Some(cell) => format!("{:>3}*", cell.date.day()),
                None => "    ".to_string(),
            })
            .collect();
        println!("{}", line.concat().trim_end());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_month_accepts_year_month() {
        assert_eq!(parse_month("2024-06").expect("valid"), (2024, 6));
        assert!(parse_month("2024-13").is_err());
        assert!(parse_month("june").is_err());
    }

    #[test]
    fn plan_args_map_to_form() {
        let form: PlanForm = PlanArgs {
            title: "Jeju".to_string(),
            destination: "Jeju".to_string(),
            start: "2024-06-01".to_string(),
            end: "2024-06-03".to_string(),
            image: None,
        }
        .into();
        assert_eq!(form.start_date, "2024-06-01");
        assert_eq!(form.end_date, "2024-06-03");
    }

    #[test]
    fn unauthorized_points_to_login() {
        let err = map_client_error(PlannerError::Unauthorized);
        assert!(err.to_string().contains("planner-cli login"));
    }

    #[test]
    fn validation_errors_are_listed() {
        let errors = PlanForm::default().into_draft().expect_err("empty form");
        let err = map_client_error(PlannerError::Validation(errors));
        assert!(err.to_string().contains("제목을 입력해주세요"));
    }

    #[test]
    fn cli_parses_nested_plan_update() {
        let cli = Cli::try_parse_from([
            "planner-cli",
            "--server",
            "localhost:9000",
            "plan",
            "update",
            "--id",
            "3",
            "--title",
            "T",
            "--destination",
            "D",
            "--start",
            "2024-06-01",
            "--end",
            "2024-06-02",
        ])
        .expect("valid args");

        assert_eq!(cli.server.as_deref(), Some("localhost:9000"));
        match cli.command {
            Command::Plan {
                command: PlanCommand::Update { id, plan },
            } => {
                assert_eq!(id, 3);
                assert_eq!(plan.title, "T");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
