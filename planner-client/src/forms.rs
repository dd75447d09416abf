//! Формы ввода и их локальная валидация.
//!
//! Любой путь отправки сначала проверяет форму; если она невалидна, запрос
//! не отправляется, а ошибки возвращаются по полям.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDate;
use validator::{Validate, ValidationErrors};

/// Пустой заголовок.
pub const TITLE_REQUIRED: &str = "제목을 입력해주세요";
/// Пустое место назначения.
pub const DESTINATION_REQUIRED: &str = "여행지를 입력해주세요";
/// Не выбрана дата начала.
pub const START_REQUIRED: &str = "시작일을 선택해주세요";
/// Не выбрана дата окончания.
pub const END_REQUIRED: &str = "종료일을 선택해주세요";
/// Дата не в формате `YYYY-MM-DD`.
pub const DATE_FORMAT: &str = "날짜 형식이 올바르지 않습니다";
/// Окончание раньше начала.
pub const END_BEFORE_START: &str = "종료일은 시작일 이후여야 합니다";
/// Пустой текст.
pub const CONTENT_REQUIRED: &str = "내용을 입력해주세요";
/// Некорректный email.
pub const EMAIL_INVALID: &str = "이메일 형식이 올바르지 않습니다";
/// Пустой пароль.
pub const PASSWORD_REQUIRED: &str = "비밀번호를 입력해주세요";
/// Пароль короче 8 символов.
pub const PASSWORD_TOO_SHORT: &str = "비밀번호는 8자 이상이어야 합니다";
/// Пароли не совпадают.
pub const PASSWORD_MISMATCH: &str = "비밀번호가 일치하지 않습니다";
/// Пустой никнейм.
pub const NICK_REQUIRED: &str = "닉네임을 입력해주세요";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Ошибки формы по полям.
pub struct FormErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl FormErrors {
    /// Добавляет сообщение к полю.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    /// Ошибок нет.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Сообщения для поля.
    pub fn get(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Первое сообщение для поля.
    pub fn first(&self, field: &str) -> Option<&str> {
        self.get(field).first().map(String::as_str)
    }

    /// Все поля с ошибками.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.fields
            .iter()
            .map(|(field, messages)| (field.as_str(), messages.as_slice()))
    }

    fn from_validation(errors: &ValidationErrors) -> Self {
        let mut out = Self::default();
        for (field, errors) in errors.field_errors() {
            for error in errors.iter() {
                let message = error
                    .message
                    .as_ref()
                    .map(|message| message.to_string())
                    .unwrap_or_else(|| error.code.to_string());
                out.add(field.to_string(), message);
            }
        }
        out
    }

    fn into_result<T>(self, value: T) -> Result<T, FormErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

impl fmt::Display for FormErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.fields {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

fn run_validator(form: &impl Validate) -> FormErrors {
    match form.validate() {
        Ok(()) => FormErrors::default(),
        Err(errors) => FormErrors::from_validation(&errors),
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

#[derive(Debug, Clone, Default, Validate)]
/// Форма создания/редактирования плана. Даты в виде строк `YYYY-MM-DD`.
pub struct PlanForm {
    #[validate(length(min = 1, message = "제목을 입력해주세요"))]
    /// Заголовок.
    pub title: String,
    #[validate(length(min = 1, message = "여행지를 입력해주세요"))]
    /// Место назначения.
    pub destination: String,
    #[validate(length(min = 1, message = "시작일을 선택해주세요"))]
    /// Дата начала.
    pub start_date: String,
    #[validate(length(min = 1, message = "종료일을 선택해주세요"))]
    /// Дата окончания.
    pub end_date: String,
    /// Файл изображения для загрузки.
    pub image: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Проверенные данные плана, готовые к отправке.
pub struct PlanDraft {
    /// Заголовок.
    pub title: String,
    /// Место назначения.
    pub destination: String,
    /// Дата начала.
    pub start_date: NaiveDate,
    /// Дата окончания (включительно).
    pub end_date: NaiveDate,
    /// Файл изображения для загрузки.
    pub image: Option<PathBuf>,
}

impl PlanForm {
    /// Нормализует и проверяет форму.
    pub fn into_draft(self) -> Result<PlanDraft, FormErrors> {
        let form = Self {
            title: self.title.trim().to_string(),
            destination: self.destination.trim().to_string(),
            start_date: self.start_date.trim().to_string(),
            end_date: self.end_date.trim().to_string(),
            image: self.image,
        };
        let mut errors = run_validator(&form);

        let start = (!form.start_date.is_empty())
            .then(|| parse_date(&form.start_date))
            .flatten();
        let end = (!form.end_date.is_empty())
            .then(|| parse_date(&form.end_date))
            .flatten();
        if !form.start_date.is_empty() && start.is_none() {
            errors.add("start_date", DATE_FORMAT);
        }
        if !form.end_date.is_empty() && end.is_none() {
            errors.add("end_date", DATE_FORMAT);
        }

        let (Some(start_date), Some(end_date)) = (start, end) else {
            return Err(errors);
        };
        if end_date < start_date {
            errors.add("end_date", END_BEFORE_START);
        }

        errors.into_result(PlanDraft {
            title: form.title,
            destination: form.destination,
            start_date,
            end_date,
            image: form.image,
        })
    }
}

#[derive(Debug, Clone, Default, Validate)]
/// Форма поста.
pub struct PostForm {
    #[validate(length(min = 1, message = "제목을 입력해주세요"))]
    /// Заголовок.
    pub title: String,
    #[validate(length(min = 1, message = "내용을 입력해주세요"))]
    /// Текст.
    pub content: String,
    /// План, к которому привязан пост.
    pub trip_id: Option<i64>,
    /// Файл изображения для загрузки.
    pub image: Option<PathBuf>,
}

impl PostForm {
    /// Нормализует и проверяет форму.
    pub fn into_draft(self) -> Result<PostForm, FormErrors> {
        let form = Self {
            title: self.title.trim().to_string(),
            content: self.content.trim().to_string(),
            trip_id: self.trip_id,
            image: self.image,
        };
        run_validator(&form).into_result(form)
    }
}

#[derive(Debug, Clone, Default, Validate)]
/// Форма комментария.
pub struct CommentForm {
    #[validate(length(min = 1, message = "내용을 입력해주세요"))]
    /// Текст.
    pub content: String,
}

impl CommentForm {
    /// Возвращает текст комментария без крайних пробелов.
    pub fn into_content(self) -> Result<String, FormErrors> {
        let form = Self {
            content: self.content.trim().to_string(),
        };
        run_validator(&form).into_result(form.content)
    }
}

#[derive(Debug, Clone, Default, Validate)]
/// Форма входа.
pub struct LoginForm {
    #[validate(email(message = "이메일 형식이 올바르지 않습니다"))]
    /// Email.
    pub email: String,
    #[validate(length(min = 1, message = "비밀번호를 입력해주세요"))]
    /// Пароль.
    pub password: String,
}

impl LoginForm {
    /// Проверяет форму; email обрезается, пароль передаётся как есть.
    pub fn into_draft(self) -> Result<LoginForm, FormErrors> {
        let form = Self {
            email: self.email.trim().to_string(),
            password: self.password,
        };
        run_validator(&form).into_result(form)
    }
}

#[derive(Debug, Clone, Default, Validate)]
/// Запрос письма для подтверждения email.
pub struct EmailForm {
    #[validate(email(message = "이메일 형식이 올바르지 않습니다"))]
    /// Email.
    pub email: String,
}

impl EmailForm {
    /// Возвращает email без крайних пробелов.
    pub fn into_email(self) -> Result<String, FormErrors> {
        let form = Self {
            email: self.email.trim().to_string(),
        };
        run_validator(&form).into_result(form.email)
    }
}

#[derive(Debug, Clone, Default, Validate)]
/// Форма регистрации.
pub struct JoinForm {
    #[validate(email(message = "이메일 형식이 올바르지 않습니다"))]
    /// Email.
    pub email: String,
    #[validate(length(min = 8, message = "비밀번호는 8자 이상이어야 합니다"))]
    /// Пароль.
    pub password: String,
    /// Повтор пароля.
    pub password_confirm: String,
    #[validate(length(min = 1, message = "닉네임을 입력해주세요"))]
    /// Никнейм.
    pub nick: String,
}

impl JoinForm {
    /// Проверяет форму, включая совпадение паролей.
    pub fn into_draft(self) -> Result<JoinForm, FormErrors> {
        let form = Self {
            email: self.email.trim().to_string(),
            password: self.password,
            password_confirm: self.password_confirm,
            nick: self.nick.trim().to_string(),
        };
        let mut errors = run_validator(&form);
        if form.password != form.password_confirm {
            errors.add("password_confirm", PASSWORD_MISMATCH);
        }
        errors.into_result(form)
    }
}

#[derive(Debug, Clone, Default, Validate)]
/// Форма профиля.
pub struct ProfileForm {
    #[validate(length(min = 1, message = "닉네임을 입력해주세요"))]
    /// Никнейм.
    pub nick: String,
    /// Файл изображения для загрузки.
    pub image: Option<PathBuf>,
}

impl ProfileForm {
    /// Нормализует и проверяет форму.
    pub fn into_draft(self) -> Result<ProfileForm, FormErrors> {
        let form = Self {
            nick: self.nick.trim().to_string(),
            image: self.image,
        };
        run_validator(&form).into_result(form)
    }
}
