//! Remote session abstraction
//!
//! The Step Runner talks to target hosts exclusively through these traits so
//! the transport can be swapped out in tests.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use crate::errors::ClusterError;

/// Login credentials for a target host.
///
/// Passed explicitly through every executor call; there is no ambient agent
/// or shared session cache.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }
}

// SecretString refuses to serialize by design; the registry file is the one
// place credentials must round-trip, so spell the impls out here. The file
// itself is written with 0600 permissions.
impl Serialize for Credentials {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Credentials", 2)?;
        state.serialize_field("username", &self.username)?;
        state.serialize_field("password", self.password.expose_secret())?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for Credentials {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CredentialsVisitor;

        impl<'de> Visitor<'de> for CredentialsVisitor {
            type Value = Credentials;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a credentials object with username and password")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut username: Option<String> = None;
                let mut password: Option<String> = None;
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "username" => username = Some(map.next_value()?),
                        "password" => password = Some(map.next_value()?),
                        _ => {
                            let _ = map.next_value::<serde::de::IgnoredAny>()?;
                        }
                    }
                }
                let username =
                    username.ok_or_else(|| serde::de::Error::missing_field("username"))?;
                let password =
                    password.ok_or_else(|| serde::de::Error::missing_field("password"))?;
                Ok(Credentials::new(username, password))
            }
        }

        deserializer.deserialize_struct(
            "Credentials",
            &["username", "password"],
            CredentialsVisitor,
        )
    }
}

/// Output of one remote command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<u32>,
}

impl CommandOutput {
    /// Whether the command completed with exit code 0
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// A scoped shell session on one target host
#[async_trait]
pub trait RemoteSession: Send {
    /// Run a command, bounded by `timeout`
    async fn run(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, ClusterError>;

    /// Close the session. Best-effort; must be called on every exit path.
    async fn close(&mut self) -> Result<(), ClusterError>;
}

/// Opens scoped sessions on target hosts
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn open(
        &self,
        host: &str,
        port: u16,
        credentials: &Credentials,
        connect_timeout: Duration,
    ) -> Result<Box<dyn RemoteSession>, ClusterError>;
}
