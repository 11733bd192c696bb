//! Secret data with automatic zeroization

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{KeychainError, Result};

/// Secret bytes of a keychain item - automatically zeroed when dropped
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Secret {
    data: Vec<u8>,
}

impl Secret {
    /// Create a secret from raw bytes
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Get the secret bytes (use carefully - avoid copying)
    pub fn expose(&self) -> &[u8] {
        &self.data
    }

    /// Decode the secret as a UTF-8 password
    pub fn to_password(&self) -> Result<Password> {
        let text = std::str::from_utf8(&self.data)
            .map_err(|_| KeychainError::invalid("password data is not valid UTF-8"))?;
        Ok(Password::new(text.to_string()))
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value.as_bytes().to_vec())
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secret")
            .field("data", &"[REDACTED]")
            .finish()
    }
}

/// Password held by a credential record - automatically zeroed when dropped
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Password {
    value: String,
}

impl Password {
    pub fn new(value: String) -> Self {
        Self { value }
    }

    /// Get the password (use carefully)
    pub fn expose(&self) -> &str {
        &self.value
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Password")
            .field("value", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts() {
        let secret = Secret::from("hunter2");
        assert!(!format!("{:?}", secret).contains("hunter2"));

        let password = secret.to_password().unwrap();
        assert_eq!(password.expose(), "hunter2");
        assert!(!format!("{:?}", password).contains("hunter2"));
    }

    #[test]
    fn test_non_utf8_password_rejected() {
        let secret = Secret::new(vec![0xff, 0xfe]);
        assert!(matches!(
            secret.to_password(),
            Err(KeychainError::InvalidAttribute(_))
        ));
    }

    #[test]
    fn test_empty_password_is_valid() {
        let password = Secret::new(Vec::new()).to_password().unwrap();
        assert_eq!(password.expose(), "");
    }
}
