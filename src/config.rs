//! Configuration structures.
//!
//! The configuration file is YAML.  See `doc/kaede.yaml` on the repository for an explanation
//! of each setting.

use serde::{Deserialize, Serialize};
use std::{fmt, fs, io, net, path};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Format(serde_yaml::Error),
    InvalidDomain,
    InvalidNickLength,
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Format(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(val: io::Error) -> Self { Self::Io(val) }
}

impl From<serde_yaml::Error> for Error {
    fn from(val: serde_yaml::Error) -> Self { Self::Format(val) }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => err.fmt(f),
            Self::Format(err) => err.fmt(f),
            Self::InvalidDomain => write!(f, "'domain' must be a domain name (e.g. irc.com)"),
            Self::InvalidNickLength => write!(f, "'nicklen' must be between 1 and 32"),
        }
    }
}

/// OPER credentials.  `password` is an argon2 hash string.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Oper {
    pub name: String,
    pub password: String,
}

/// A server this one may link with.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Link {
    /// The remote server name, as exchanged in the SERVER handshake.
    pub name: String,

    pub host: String,

    #[serde(default = "link_port")]
    pub port: u16,

    /// Plain-text password sent in PASS when connecting out; incoming peers must present a
    /// password matching `password_hash`.
    pub password: String,

    /// Argon2 hash the incoming peer's PASS is checked against.
    pub password_hash: String,

    /// Token identifying the link in NICK bursts.
    #[serde(default = "link_token")]
    pub token: u32,
}

/// A channel created at startup.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ChannelDef {
    pub name: String,

    #[serde(default)]
    pub topic: String,
}

/// Settings for `State`.
#[derive(Clone, Deserialize, Serialize)]
pub struct State {
    #[serde(default = "domain")]
    pub domain: String,

    #[serde(default = "network")]
    pub network: String,

    #[serde(default = "description")]
    pub description: String,

    /// Argon2 hash of the connection password.  When unset, PASS is not required.
    pub password: Option<String>,

    pub motd: Option<String>,

    #[serde(default)]
    pub opers: Vec<Oper>,

    #[serde(default)]
    pub links: Vec<Link>,

    #[serde(default)]
    pub channels: Vec<ChannelDef>,

    /// Clients and links silent for this many seconds are pinged; twice this, dropped.
    #[serde(default = "ping_timeout")]
    pub ping_timeout: u64,

    /// How many WHOWAS entries are kept.
    #[serde(default = "whowas_limit")]
    pub whowas_limit: usize,

    #[serde(default = "nicklen")]
    pub nicklen: usize,
}

/// The whole configuration.
#[derive(Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "address")]
    pub address: net::IpAddr,

    #[serde(default = "port")]
    pub port: u16,

    /// When set, a second listener accepts server links on this port.
    pub link_port: Option<u16>,

    #[serde(default)]
    pub workers: usize,

    #[serde(flatten)]
    pub state: State,
}

fn address() -> net::IpAddr { net::IpAddr::from([127, 0, 0, 1]) }
fn port() -> u16 { 6667 }
fn link_port() -> u16 { 6668 }
fn link_token() -> u32 { 1 }
fn domain() -> String { String::from("kaede.localdomain") }
fn network() -> String { String::from("kaede") }
fn description() -> String { String::from("A kaede server") }
fn ping_timeout() -> u64 { 180 }
fn whowas_limit() -> usize { 1024 }
fn nicklen() -> usize { 9 }

fn is_valid_domain(domain: &str) -> bool {
    !domain.is_empty()
        && domain.len() <= 253
        && domain.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'.')
}

impl State {
    pub fn sample() -> Self {
        Self {
            domain: domain(),
            network: network(),
            description: description(),
            password: None,
            motd: Some(String::from("Welcome to kaede!")),
            opers: vec![],
            links: vec![],
            channels: vec![],
            ping_timeout: ping_timeout(),
            whowas_limit: whowas_limit(),
            nicklen: nicklen(),
        }
    }
}

impl Config {
    pub fn sample() -> Self {
        Self {
            address: address(),
            port: port(),
            link_port: None,
            workers: 0,
            state: State::sample(),
        }
    }

    /// Reads the configuration file at the given path.
    pub fn from_file(path: impl AsRef<path::Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let res: Self = serde_yaml::from_str(&contents)?;

        if !is_valid_domain(&res.state.domain) {
            return Err(Error::InvalidDomain);
        }

        if !(1..=32).contains(&res.state.nicklen) {
            return Err(Error::InvalidNickLength);
        }

        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: Config = serde_yaml::from_str("domain: irc.example.org").unwrap();
        assert_eq!(config.port, 6667);
        assert_eq!(config.link_port, None);
        assert_eq!(config.state.domain, "irc.example.org");
        assert_eq!(config.state.ping_timeout, 180);
        assert_eq!(config.state.nicklen, 9);
        assert!(config.state.opers.is_empty());
    }

    #[test]
    fn test_full_config() {
        let config: Config = serde_yaml::from_str(r##"
domain: hub.example.org
network: ExampleNet
port: 6697
link_port: 6668
password: "$argon2id$..."
motd: "hello"
opers:
  - name: root
    password: "$argon2id$..."
links:
  - name: leaf.example.org
    host: 10.0.0.2
    password: sekrit
    password_hash: "$argon2id$..."
    token: 2
channels:
  - name: "#lobby"
    topic: "welcome"
whowas_limit: 16
"##).unwrap();
        assert_eq!(config.link_port, Some(6668));
        assert_eq!(config.state.network, "ExampleNet");
        assert_eq!(config.state.opers.len(), 1);
        assert_eq!(config.state.links[0].port, 6668);
        assert_eq!(config.state.links[0].token, 2);
        assert_eq!(config.state.channels[0].name, "#lobby");
        assert_eq!(config.state.whowas_limit, 16);
    }

    #[test]
    fn test_domain_validation() {
        assert!(is_valid_domain("irc.example.org"));
        assert!(is_valid_domain("localhost"));
        assert!(!is_valid_domain(""));
        assert!(!is_valid_domain("has space.org"));
    }
}
