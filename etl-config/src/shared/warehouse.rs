use std::fmt;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer, de};

/// Port used when the credentials secret does not carry one.
pub const DEFAULT_WAREHOUSE_PORT: u16 = 5432;

/// Connection parameters for the warehouse, as stored in the secret store.
///
/// The secret is a JSON object with the fields `host`, `dbname` (or `database`), `user`,
/// `password` and `port`. The port may be a number or a numeric string.
///
/// This intentionally does not implement `Serialize` so the password cannot leak into
/// serialized forms.
#[derive(Clone, Debug, Deserialize)]
pub struct WarehouseCredentials {
    pub host: String,
    #[serde(alias = "database")]
    pub dbname: String,
    pub user: String,
    #[serde(default)]
    pub password: Option<SecretString>,
    #[serde(default = "default_port", deserialize_with = "deserialize_port")]
    pub port: u16,
}

impl WarehouseCredentials {
    /// Parses the secret string returned by the secret store.
    pub fn from_secret_string(secret: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(secret)
    }
}

const fn default_port() -> u16 {
    DEFAULT_WAREHOUSE_PORT
}

fn deserialize_port<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    struct PortVisitor;

    impl de::Visitor<'_> for PortVisitor {
        type Value = u16;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a port number or a numeric string")
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<u16, E> {
            u16::try_from(value).map_err(|_| E::custom(format!("port {value} is out of range")))
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<u16, E> {
            u16::try_from(value).map_err(|_| E::custom(format!("port {value} is out of range")))
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<u16, E> {
            value
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid port `{value}`")))
        }
    }

    deserializer.deserialize_any(PortVisitor)
}
