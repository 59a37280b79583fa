use crate::devices::Device;
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

const FIRST_PERSON_ID: u64 = 1_000_001;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocateBody {
    pub server_context: ServerContext,
    pub content: Vec<Device>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContext {
    pub auth_token: String,
    pub prs_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Unauthorized,
    NotFound,
}

struct Account {
    person_id: u64,
    token: Option<String>,
    devices: Vec<Device>,
}

/// Accounts known to the simulated service and their current sessions
pub struct Directory {
    password: String,
    accounts: HashMap<String, Account>,
}

impl Directory {
    pub fn new(rng: &mut impl Rng, names: &[String], devices_per_account: usize, password: String) -> Self {
        let accounts = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let devices = (0..devices_per_account)
                    .map(|d| Device::random(rng, name, d))
                    .collect();
                let account = Account {
                    person_id: FIRST_PERSON_ID + i as u64,
                    token: None,
                    devices,
                };
                (name.clone(), account)
            })
            .collect();

        Self { password, accounts }
    }

    /// Login with the account password. Starts a new session and
    /// invalidates any previous token.
    pub fn init_client(
        &mut self,
        rng: &mut impl Rng,
        login: &str,
        username: &str,
        password: &str,
        now_ms: i64,
    ) -> Result<LocateBody, Rejection> {
        let account = self.accounts.get_mut(login).ok_or(Rejection::NotFound)?;
        if username != login || password != self.password {
            warn!(account = login, "Rejected login");
            return Err(Rejection::Unauthorized);
        }

        info!(account = login, prs_id = account.person_id, "New session");
        Ok(account.respond(rng, now_ms))
    }

    /// Refresh addressed by session id. Only the current token is accepted.
    pub fn refresh_client(
        &mut self,
        rng: &mut impl Rng,
        login: &str,
        username: &str,
        token: &str,
        now_ms: i64,
    ) -> Result<LocateBody, Rejection> {
        let person_id: u64 = login.parse().map_err(|_| Rejection::NotFound)?;
        let account = self
            .accounts
            .values_mut()
            .find(|a| a.person_id == person_id)
            .ok_or(Rejection::NotFound)?;

        if username != login || account.token.as_deref() != Some(token) {
            warn!(prs_id = person_id, "Rejected stale or mismatched session");
            return Err(Rejection::Unauthorized);
        }

        debug!(prs_id = person_id, "Session refreshed");
        Ok(account.respond(rng, now_ms))
    }
}

impl Account {
    fn respond(&mut self, rng: &mut impl Rng, now_ms: i64) -> LocateBody {
        let token = uuid::Uuid::new_v4().simple().to_string();
        self.token = Some(token.clone());

        for device in &mut self.devices {
            device.step(rng, now_ms);
        }

        LocateBody {
            server_context: ServerContext {
                auth_token: token,
                prs_id: self.person_id,
            },
            content: self.devices.iter().map(|d| d.reading(rng)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> Directory {
        let names = vec!["alice".to_string(), "bob".to_string()];
        Directory::new(&mut rand::thread_rng(), &names, 2, "secret".to_string())
    }

    #[test]
    fn test_login_issues_session() {
        let mut directory = directory();
        let mut rng = rand::thread_rng();

        let body = directory
            .init_client(&mut rng, "alice", "alice", "secret", 0)
            .unwrap();

        assert_eq!(body.server_context.prs_id, FIRST_PERSON_ID);
        assert!(!body.server_context.auth_token.is_empty());
        assert_eq!(body.content.len(), 2);
    }

    #[test]
    fn test_login_rejections() {
        let mut directory = directory();
        let mut rng = rand::thread_rng();

        assert_eq!(
            directory.init_client(&mut rng, "alice", "alice", "wrong", 0).unwrap_err(),
            Rejection::Unauthorized
        );
        assert_eq!(
            directory.init_client(&mut rng, "alice", "bob", "secret", 0).unwrap_err(),
            Rejection::Unauthorized
        );
        assert_eq!(
            directory.init_client(&mut rng, "carol", "carol", "secret", 0).unwrap_err(),
            Rejection::NotFound
        );
    }

    #[test]
    fn test_refresh_rotates_token() {
        let mut directory = directory();
        let mut rng = rand::thread_rng();

        let login = directory
            .init_client(&mut rng, "bob", "bob", "secret", 0)
            .unwrap();
        let id = login.server_context.prs_id.to_string();
        let first = login.server_context.auth_token;

        let refreshed = directory
            .refresh_client(&mut rng, &id, &id, &first, 1)
            .unwrap();
        let second = refreshed.server_context.auth_token;
        assert_ne!(first, second);

        // The previous token is no longer valid
        assert_eq!(
            directory.refresh_client(&mut rng, &id, &id, &first, 2).unwrap_err(),
            Rejection::Unauthorized
        );
        assert!(directory.refresh_client(&mut rng, &id, &id, &second, 3).is_ok());
    }

    #[test]
    fn test_refresh_rejects_mismatched_pair() {
        let mut directory = directory();
        let mut rng = rand::thread_rng();

        let alice = directory
            .init_client(&mut rng, "alice", "alice", "secret", 0)
            .unwrap();
        let bob = directory
            .init_client(&mut rng, "bob", "bob", "secret", 0)
            .unwrap();

        // alice's id with bob's token
        let id = alice.server_context.prs_id.to_string();
        assert_eq!(
            directory
                .refresh_client(&mut rng, &id, &id, &bob.server_context.auth_token, 1)
                .unwrap_err(),
            Rejection::Unauthorized
        );
        assert_eq!(
            directory.refresh_client(&mut rng, "0", "0", "anything", 1).unwrap_err(),
            Rejection::NotFound
        );
    }
}
