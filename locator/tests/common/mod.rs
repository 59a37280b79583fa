#![allow(dead_code)]

use async_trait::async_trait;
use locator::model::Credentials;
use locator::mqtt::Publisher;
use locator::transport::{Action, LocateRequest, RawResponse, Transport};
use locator::Result;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Location service stand-in: every account owns one device and a session
/// id derived from its position in `accounts`. Accounts listed in `deny`
/// are refused at login.
pub struct StubService {
    accounts: Vec<String>,
    deny: HashSet<String>,
    pub requests: Mutex<Vec<LocateRequest>>,
}

impl StubService {
    pub fn new(accounts: &[&str], deny: &[&str]) -> Self {
        Self {
            accounts: accounts.iter().map(|a| a.to_string()).collect(),
            deny: deny.iter().map(|a| a.to_string()).collect(),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn person_id(index: usize) -> u64 {
        1000 + index as u64
    }

    fn account_for(&self, request: &LocateRequest) -> Option<usize> {
        match request.action {
            Action::InitClient => self.accounts.iter().position(|a| *a == request.login),
            Action::RefreshClient => {
                let id: u64 = request.login.parse().ok()?;
                (0..self.accounts.len()).find(|i| Self::person_id(*i) == id)
            }
        }
    }
}

#[async_trait]
impl Transport for StubService {
    async fn send(&self, request: &LocateRequest) -> Result<RawResponse> {
        self.requests.lock().unwrap().push(request.clone());

        let Some(index) = self.account_for(request) else {
            return Ok(RawResponse { status: 404, body: Vec::new() });
        };
        let account = &self.accounts[index];
        if self.deny.contains(account) {
            return Ok(RawResponse { status: 401, body: Vec::new() });
        }

        let body = serde_json::json!({
            "serverContext": {
                "authToken": format!("{}-token-{}", account, self.requests.lock().unwrap().len()),
                "prsId": Self::person_id(index)
            },
            "content": [{
                "id": format!("{}-device", account),
                "name": format!("{}'s phone", account),
                "deviceDisplayName": "iPhone-12",
                "batteryLevel": 0.5,
                "batteryStatus": "NotCharging",
                "location": {
                    "latitude": 50.0,
                    "longitude": 14.0,
                    "altitude": 200.0,
                    "horizontalAccuracy": 10.0,
                    "verticalAccuracy": 3.0
                }
            }]
        });

        Ok(RawResponse {
            status: 200,
            body: serde_json::to_vec(&body).unwrap(),
        })
    }
}

/// Forwards every publish to a channel the test reads from.
pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<(String, Vec<u8>)>,
    pub closed: AtomicBool,
}

impl ChannelPublisher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(String, Vec<u8>)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                closed: AtomicBool::new(false),
            },
            rx,
        )
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Publisher for ChannelPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) {
        let _ = self.tx.send((topic.to_string(), payload));
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub fn credentials(usernames: &[&str]) -> Vec<Credentials> {
    usernames
        .iter()
        .map(|u| Credentials {
            username: u.to_string(),
            password: format!("{}-password", u),
        })
        .collect()
}
