use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::AuthError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Doctor,
    Patient,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Doctor => write!(f, "doctor"),
            Role::Patient => write!(f, "patient"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub role: Role,
    pub display_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub display_name: String,
    pub username: String,
    pub password: String,
    pub role: Option<Role>,
    /// Required for doctor accounts.
    pub license_key: Option<String>,
}

/// Flat username lookup. Plain-text passwords; demo-grade only.
#[derive(Debug, Clone, Default)]
pub struct CredentialDirectory {
    accounts: HashMap<String, Account>,
}

impl CredentialDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, account: Account) {
        self.accounts.insert(account.username.clone(), account);
    }

    pub fn get(&self, username: &str) -> Option<&Account> {
        self.accounts.get(username)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Checks user, then password, then that the account has `requested_role`.
    pub fn authenticate(
        &self,
        username: &str,
        password: &str,
        requested_role: Role,
    ) -> Result<&Account, AuthError> {
        let account = self.accounts.get(username).ok_or(AuthError::UnknownUser)?;
        if account.password != password {
            return Err(AuthError::WrongPassword);
        }
        if account.role != requested_role {
            return Err(AuthError::RoleMismatch {
                requested: requested_role.to_string(),
            });
        }
        Ok(account)
    }

    pub fn register(
        &mut self,
        registration: Registration,
        doctor_license_key: &str,
    ) -> Result<&Account, AuthError> {
        if self.accounts.contains_key(&registration.username) {
            return Err(AuthError::UsernameTaken);
        }
        if registration.username.is_empty()
            || registration.password.is_empty()
            || registration.display_name.is_empty()
        {
            return Err(AuthError::MissingField);
        }

        let role = registration.role.unwrap_or(Role::Patient);
        if role == Role::Doctor
            && registration.license_key.as_deref() != Some(doctor_license_key)
        {
            return Err(AuthError::InvalidLicenseKey);
        }

        let username = registration.username.clone();
        self.insert(Account {
            username: registration.username,
            password: registration.password,
            role,
            display_name: registration.display_name,
        });
        tracing::info!(username = %username, role = %role, "Account registered");
        self.accounts.get(&username).ok_or(AuthError::UnknownUser)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> CredentialDirectory {
        let mut dir = CredentialDirectory::new();
        dir.insert(Account {
            username: "admin".into(),
            password: "admin".into(),
            role: Role::Doctor,
            display_name: "Dr. Gênesis".into(),
        });
        dir.insert(Account {
            username: "ana".into(),
            password: "123".into(),
            role: Role::Patient,
            display_name: "Ana Silva".into(),
        });
        dir
    }

    #[test]
    fn test_authenticate_order_of_checks() {
        let dir = directory();
        assert_eq!(
            dir.authenticate("nobody", "x", Role::Doctor).unwrap_err(),
            AuthError::UnknownUser
        );
        assert_eq!(
            dir.authenticate("ana", "wrong", Role::Doctor).unwrap_err(),
            AuthError::WrongPassword
        );
        assert_eq!(
            dir.authenticate("ana", "123", Role::Doctor).unwrap_err(),
            AuthError::RoleMismatch { requested: "doctor".into() }
        );
        let account = dir.authenticate("admin", "admin", Role::Doctor).unwrap();
        assert_eq!(account.display_name, "Dr. Gênesis");
    }

    #[test]
    fn test_register_rules() {
        let mut dir = directory();
        let taken = Registration {
            display_name: "Ana".into(),
            username: "ana".into(),
            password: "x".into(),
            ..Default::default()
        };
        assert_eq!(dir.register(taken, "crm123").unwrap_err(), AuthError::UsernameTaken);

        let incomplete = Registration {
            username: "joao".into(),
            ..Default::default()
        };
        assert_eq!(dir.register(incomplete, "crm123").unwrap_err(), AuthError::MissingField);

        let doctor = Registration {
            display_name: "Dra. Paula".into(),
            username: "paula".into(),
            password: "pw".into(),
            role: Some(Role::Doctor),
            license_key: Some("wrong".into()),
        };
        assert_eq!(
            dir.register(doctor.clone(), "crm123").unwrap_err(),
            AuthError::InvalidLicenseKey
        );

        let doctor = Registration {
            license_key: Some("crm123".into()),
            ..doctor
        };
        assert_eq!(dir.register(doctor, "crm123").unwrap().role, Role::Doctor);
        assert!(dir.authenticate("paula", "pw", Role::Doctor).is_ok());
    }

    #[test]
    fn test_password_not_serialized() {
        let dir = directory();
        let json = serde_json::to_string(dir.get("admin").unwrap()).unwrap();
        assert!(!json.contains("password"));
    }
}
