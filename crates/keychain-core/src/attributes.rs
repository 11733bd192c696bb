//! Keychain attribute vocabulary
//!
//! Attribute keys follow the platform keychain's four-character names so a
//! query built here reads the same as one written against the native API.
//! Protocol and authentication type tags are closed sets; anything the store
//! would not understand is rejected while the query is being built.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{KeychainError, Result};

/// Open mapping of attribute name to value
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Well-known attribute keys
pub mod keys {
    pub const CLASS: &str = "class";
    pub const SERVICE: &str = "svce";
    pub const ACCOUNT: &str = "acct";
    pub const SERVER: &str = "srvr";
    pub const SECURITY_DOMAIN: &str = "sdmn";
    pub const PATH: &str = "path";
    pub const PORT: &str = "port";
    pub const PROTOCOL: &str = "ptcl";
    pub const AUTHENTICATION_TYPE: &str = "atyp";
    pub const LABEL: &str = "labl";
    pub const COMMENT: &str = "icmt";
    pub const DESCRIPTION: &str = "desc";
    pub const CREATION_DATE: &str = "cdat";
    pub const MODIFICATION_DATE: &str = "mdat";

    /// Keys owned by typed fields or stamped by the store.
    /// Caller-supplied extras never override these.
    pub const RESERVED: &[&str] = &[
        CLASS,
        SERVICE,
        ACCOUNT,
        SERVER,
        SECURITY_DOMAIN,
        PATH,
        PORT,
        PROTOCOL,
        AUTHENTICATION_TYPE,
        CREATION_DATE,
        MODIFICATION_DATE,
    ];

    /// Check whether a key belongs to a typed field
    pub fn is_reserved(key: &str) -> bool {
        RESERVED.contains(&key)
    }
}

/// Kind of keychain item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemClass {
    /// Service/account password
    #[serde(rename = "genp")]
    Generic,
    /// Password scoped to a network endpoint
    #[serde(rename = "inet")]
    Internet,
}

impl ItemClass {
    /// Attributes that together identify an item of this class.
    /// The store refuses to add a second item with equal values for all of them.
    pub fn identity_keys(self) -> &'static [&'static str] {
        match self {
            Self::Generic => &[keys::SERVICE, keys::ACCOUNT],
            Self::Internet => &[
                keys::SERVER,
                keys::SECURITY_DOMAIN,
                keys::ACCOUNT,
                keys::PATH,
                keys::PORT,
                keys::PROTOCOL,
                keys::AUTHENTICATION_TYPE,
            ],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generic => "genp",
            Self::Internet => "inet",
        }
    }
}

impl fmt::Display for ItemClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of a single attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    String(String),
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
    Integer(i64),
    Date(DateTime<Utc>),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            Self::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Date(d) => write!(f, "{}", d.to_rfc3339()),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<&[u8]> for AttributeValue {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(value.to_vec())
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<u16> for AttributeValue {
    fn from(value: u16) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<DateTime<Utc>> for AttributeValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Date(value)
    }
}

/// Defines a closed tag set with a human name and the store's four-character code
macro_rules! tag_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $what:literal {
            $($variant:ident => ($human:literal, $code:literal)),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Every member of the set
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Human-readable name, also accepted by `from_str`
            pub fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $human),+
                }
            }

            /// Four-character code stored in the keychain
            pub fn code(self) -> &'static str {
                match self {
                    $($name::$variant => $code),+
                }
            }

            /// Look up a member by its stored code
            pub fn from_code(code: &str) -> Option<Self> {
                Self::ALL.iter().copied().find(|t| t.code() == code)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }

        impl FromStr for $name {
            type Err = KeychainError;

            fn from_str(s: &str) -> Result<Self> {
                let wanted = s.trim().to_ascii_lowercase();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|t| t.name() == wanted)
                    .or_else(|| Self::ALL.iter().copied().find(|t| t.code().trim_end() == wanted))
                    .ok_or_else(|| KeychainError::invalid(format!("unrecognized {} '{}'", $what, s)))
            }
        }
    };
}

tag_enum! {
    /// Network protocol of an internet item
    Protocol, "protocol" {
        Ftp => ("ftp", "ftp "),
        FtpAccount => ("ftp-account", "ftpa"),
        Http => ("http", "http"),
        Irc => ("irc", "irc "),
        Nntp => ("nntp", "nntp"),
        Pop3 => ("pop3", "pop3"),
        Smtp => ("smtp", "smtp"),
        Socks => ("socks", "sox "),
        Imap => ("imap", "imap"),
        Ldap => ("ldap", "ldap"),
        AppleTalk => ("appletalk", "atlk"),
        Afp => ("afp", "afp "),
        Telnet => ("telnet", "teln"),
        Ssh => ("ssh", "ssh "),
        Ftps => ("ftps", "ftps"),
        Https => ("https", "htps"),
        HttpProxy => ("http-proxy", "htpx"),
        HttpsProxy => ("https-proxy", "htsx"),
        FtpProxy => ("ftp-proxy", "ftpx"),
        Smb => ("smb", "smb "),
        Rtsp => ("rtsp", "rtsp"),
        RtspProxy => ("rtsp-proxy", "rtsx"),
        Daap => ("daap", "daap"),
        Eppc => ("eppc", "eppc"),
        Ipp => ("ipp", "ipp "),
        Nntps => ("nntps", "ntps"),
        Ldaps => ("ldaps", "ldps"),
        Telnets => ("telnets", "tels"),
        Imaps => ("imaps", "imps"),
        Ircs => ("ircs", "ircs"),
        Pop3s => ("pop3s", "pops"),
    }
}

tag_enum! {
    /// Authentication scheme of an internet item
    AuthenticationType, "authentication type" {
        Ntlm => ("ntlm", "ntlm"),
        Msn => ("msn", "msna"),
        Dpa => ("dpa", "dpaa"),
        Rpa => ("rpa", "rpaa"),
        HttpBasic => ("http-basic", "http"),
        HttpDigest => ("http-digest", "httd"),
        HtmlForm => ("html-form", "form"),
        Default => ("default", "dflt"),
    }
}

/// Serde helper storing byte values as base64 text
mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_parses_name_and_code() {
        assert_eq!("https".parse::<Protocol>().unwrap(), Protocol::Https);
        assert_eq!("htps".parse::<Protocol>().unwrap(), Protocol::Https);
        assert_eq!("FTP".parse::<Protocol>().unwrap(), Protocol::Ftp);
        assert_eq!(Protocol::from_code("ssh "), Some(Protocol::Ssh));
    }

    #[test]
    fn test_unknown_tag_is_invalid_attribute() {
        let err = "gopher".parse::<Protocol>().unwrap_err();
        assert!(matches!(err, KeychainError::InvalidAttribute(_)));

        let err = "kerberos".parse::<AuthenticationType>().unwrap_err();
        assert!(matches!(err, KeychainError::InvalidAttribute(_)));
    }

    #[test]
    fn test_auth_type_codes_are_distinct() {
        for (i, a) in AuthenticationType::ALL.iter().enumerate() {
            for b in &AuthenticationType::ALL[i + 1..] {
                assert_ne!(a.code(), b.code());
            }
        }
        assert_eq!("http".parse::<AuthenticationType>().unwrap(), AuthenticationType::HttpBasic);
    }

    #[test]
    fn test_bytes_value_serializes_as_base64() {
        let value = AttributeValue::Bytes(vec![0xde, 0xad, 0xbe, 0xef]);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"{"type":"bytes","value":"3q2+7w=="}"#);

        let back: AttributeValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_reserved_keys() {
        assert!(keys::is_reserved("acct"));
        assert!(keys::is_reserved("mdat"));
        assert!(!keys::is_reserved("labl"));
        assert!(!keys::is_reserved("custom"));
    }
}
