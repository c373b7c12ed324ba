use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::NaiveDate;

const DEFAULT_LISTEN: &str = "127.0.0.1:3000";
const DEFAULT_DATA_FILE: &str = "diary/data.json";
const DEFAULT_SUBMISSIONS_DIR: &str = "diary/LabWorks";
const DEFAULT_POLL_SECS: u64 = 600;
const DEFAULT_TERM_EPOCH: &str = "2023-09-01";
const DEFAULT_IMAP_HOST: &str = "imap.yandex.ru";
const DEFAULT_IMAP_PORT: u16 = 993;

#[derive(Clone)]
pub struct MailConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen: SocketAddr,
    pub data_file: PathBuf,
    pub submissions_dir: PathBuf,
    pub poll_interval: Duration,
    pub term_epoch: NaiveDate,
    /// `None` when no mailbox credentials were provided; polling stays off.
    pub mail: Option<MailConfig>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Config> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let poll_secs: u64 = parse_or(&value, "OPENDIARY_POLL_SECS", DEFAULT_POLL_SECS)?;
        if poll_secs == 0 {
            bail!("OPENDIARY_POLL_SECS must be greater than zero");
        }

        let mail = match (value("OPENDIARY_IMAP_USER"), value("OPENDIARY_IMAP_PASSWORD")) {
            (Some(username), Some(password)) => Some(MailConfig {
                host: value("OPENDIARY_IMAP_HOST").unwrap_or_else(|| DEFAULT_IMAP_HOST.to_string()),
                port: parse_or(&value, "OPENDIARY_IMAP_PORT", DEFAULT_IMAP_PORT)?,
                username,
                password,
            }),
            _ => None,
        };

        Ok(Config {
            listen: parse_or(
                &value,
                "OPENDIARY_LISTEN",
                SocketAddr::from_str(DEFAULT_LISTEN)?,
            )?,
            data_file: value("OPENDIARY_DATA_FILE")
                .unwrap_or_else(|| DEFAULT_DATA_FILE.to_string())
                .into(),
            submissions_dir: value("OPENDIARY_SUBMISSIONS_DIR")
                .unwrap_or_else(|| DEFAULT_SUBMISSIONS_DIR.to_string())
                .into(),
            poll_interval: Duration::from_secs(poll_secs),
            term_epoch: parse_or(
                &value,
                "OPENDIARY_TERM_EPOCH",
                NaiveDate::from_str(DEFAULT_TERM_EPOCH)?,
            )?,
            mail,
        })
    }
}

fn parse_or<T, F>(value: &F, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match value(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("invalid value `{}` for {}", raw, key)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_without_environment() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.listen.port(), 3000);
        assert_eq!(config.poll_interval, Duration::from_secs(600));
        assert_eq!(config.term_epoch, NaiveDate::from_ymd_opt(2023, 9, 1).unwrap());
        assert_eq!(config.submissions_dir, PathBuf::from("diary/LabWorks"));
        assert!(config.mail.is_none());
    }

    #[test]
    fn mail_needs_both_user_and_password() {
        let config = config_from(&[("OPENDIARY_IMAP_USER", "teacher@example.com")]).unwrap();
        assert!(config.mail.is_none());

        let config = config_from(&[
            ("OPENDIARY_IMAP_USER", "teacher@example.com"),
            ("OPENDIARY_IMAP_PASSWORD", "secret"),
            ("OPENDIARY_IMAP_PORT", "1993"),
        ])
        .unwrap();
        let mail = config.mail.unwrap();
        assert_eq!(mail.host, "imap.yandex.ru");
        assert_eq!(mail.port, 1993);
        assert!(!format!("{:?}", mail).contains("secret"));
    }

    #[test]
    fn malformed_values_name_the_variable() {
        let err = config_from(&[("OPENDIARY_POLL_SECS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("OPENDIARY_POLL_SECS"));
        assert!(config_from(&[("OPENDIARY_POLL_SECS", "0")]).is_err());
        assert!(config_from(&[("OPENDIARY_TERM_EPOCH", "01.09.2023")]).is_err());
    }
}
