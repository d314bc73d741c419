use std::time::Duration;

/// Per-operation deadlines applied inside every check. `connect` bounds the
/// initial TCP connect; `io` bounds each subsequent read or write step.
#[derive(Debug, Clone)]
pub struct Timeouts {
    pub connect: Duration,
    pub io: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(3),
            io: Duration::from_secs(4),
        }
    }
}

impl Timeouts {
    pub fn from_secs(connect: u64, io: u64) -> Self {
        Self {
            connect: Duration::from_secs(connect),
            io: Duration::from_secs(io),
        }
    }
}

/// One username/password pair for default-credential checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

/// The short fixed list of default credentials that authenticated-session
/// checks are allowed to try. Constructed here and injected into each check
/// so tests can substitute their own fixtures.
pub fn default_credentials() -> Vec<Credential> {
    vec![
        Credential::new("root", ""),
        Credential::new("root", "root"),
        Credential::new("root", "password"),
        Credential::new("admin", "admin"),
        Credential::new("test", "test"),
    ]
}
