//! Cookie-keyed, in-memory client sessions.
//!
//! The only value a session carries is its [`StreamingFlag`]. Reading a
//! session never creates one: a client without a known cookie is simply not
//! streaming. Sessions are created by [`SessionStore::start`], which also
//! drops every session whose flag has gone back to false, so the map holds
//! at most the streaming clients plus the one being started.

use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::Response;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;
use webcam_capture::StreamingFlag;

pub const SESSION_COOKIE: &str = "sessionid";

#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, StreamingFlag>>,
}

/// A client session found or created for the current request.
pub struct Session {
    pub id: String,
    pub flag: StreamingFlag,
    is_new: bool,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, StreamingFlag>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The session named by the request's cookie, if the store knows it.
    pub fn lookup(&self, headers: &HeaderMap) -> Option<Session> {
        let id = session_cookie(headers)?;
        let flag = self.lock().get(&id)?.clone();
        Some(Session {
            id,
            flag,
            is_new: false,
        })
    }

    /// Mark the request's session as streaming, creating it if the cookie is
    /// missing or unknown.
    pub fn start(&self, headers: &HeaderMap) -> Session {
        let cookie = session_cookie(headers);
        let mut sessions = self.lock();

        let before = sessions.len();
        sessions.retain(|_, flag| flag.get());
        if sessions.len() < before {
            debug!(pruned = before - sessions.len(), "Dropped idle sessions");
        }

        if let Some(id) = cookie {
            if let Some(flag) = sessions.get(&id) {
                flag.set(true);
                return Session {
                    id,
                    flag: flag.clone(),
                    is_new: false,
                };
            }
            debug!("Unknown session cookie, issuing a new session");
        }
        let id = Uuid::new_v4().simple().to_string();
        let flag = StreamingFlag::new(true);
        sessions.insert(id.clone(), flag.clone());
        Session {
            id,
            flag,
            is_new: true,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Session {
    pub fn streaming(&self) -> bool {
        self.flag.get()
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Add the `Set-Cookie` header for sessions created by this request.
    pub fn attach(&self, mut response: Response) -> Response {
        if !self.is_new {
            return response;
        }
        let cookie = format!(
            "{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax",
            self.id
        );
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => warn!("Could not encode session cookie: {e}"),
        }
        response
    }
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}
