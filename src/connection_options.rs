use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use url::{ParseError, Url};

/// Connection parameters as written in a DSN.
///
/// Missing parts stay unset; each driver applies its own defaults.
#[derive(Clone, Default)]
pub struct ConnectionOptions {
    pub scheme: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database_name: Option<String>,
    pub application_name: Option<String>,
}

impl TryFrom<&str> for ConnectionOptions {
    type Error = ParseError;

    fn try_from(dsn: &str) -> Result<Self, Self::Error> {
        let url = Url::parse(dsn)?;
        let scheme = match url.scheme() {
            "pg" | "psql" | "postgres" | "postgresql" => "psql",
            scheme => scheme,
        };

        let mut query_params: HashMap<Cow<str>, Cow<str>> = url.query_pairs().collect();
        let database_name = url.path().trim_start_matches('/');

        Ok(Self {
            scheme: Some(scheme.to_string()),
            username: Some(url.username())
                .filter(|u| !u.is_empty())
                .map(String::from),
            password: url.password().map(String::from),
            host: url.host_str().map(String::from),
            port: url.port(),
            database_name: Some(database_name)
                .filter(|d| !d.is_empty())
                .map(String::from),
            application_name: query_params
                .remove("application_name")
                .map(Cow::into_owned),
        })
    }
}

impl Debug for ConnectionOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("scheme", &self.scheme)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_name", &self.database_name)
            .field("application_name", &self.application_name)
            .finish()
    }
}
