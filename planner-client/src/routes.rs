use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Экраны приложения и их пути.
pub enum Route {
    /// Главная.
    Home,
    /// Вход.
    Login,
    /// Регистрация.
    Join,
    /// Профиль пользователя.
    User,
    /// Доска постов.
    Board,
    /// Просмотр поста.
    Post,
    /// Создание поста.
    AddPost,
    /// Билет (детали плана).
    Detail,
    /// Календарь.
    Calendar,
    /// Карта.
    Map,
}

impl Route {
    /// Все экраны.
    pub const ALL: [Route; 10] = [
        Route::Home,
        Route::Login,
        Route::Join,
        Route::User,
        Route::Board,
        Route::Post,
        Route::AddPost,
        Route::Detail,
        Route::Calendar,
        Route::Map,
    ];

    /// Путь экрана.
    pub fn path(self) -> &'static str {
        match self {
            Route::Home => "/",
            Route::Login => "/login",
            Route::Join => "/join",
            Route::User => "/user",
            Route::Board => "/board",
            Route::Post => "/post",
            Route::AddPost => "/add-post",
            Route::Detail => "/detail",
            Route::Calendar => "/calendar",
            Route::Map => "/map",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for Route {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let path = s.trim();
        let path = if path.len() > 1 {
            path.trim_end_matches('/')
        } else {
            path
        };
        Route::ALL
            .into_iter()
            .find(|route| route.path() == path)
            .ok_or_else(|| format!("unknown route '{s}'"))
    }
}
