pub mod net;

pub mod ajp;
pub mod elasticsearch;
pub mod memcached;
pub mod nats;
pub mod redis;
pub mod telnet;
pub mod vnc;
pub mod zookeeper;

use crate::config::{Timeouts, default_credentials};
use crate::report::{CheckResult, ExposureCounter};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// One pluggable probe for one wire protocol.
///
/// `probe` must not fail outward: every internal failure is converted into
/// a [`CheckResult`] whose `reachable` reflects only the TCP-connect
/// outcome and whose `error` carries a classified cause. Connections are
/// owned by the probe invocation and closed on every exit path.
#[async_trait]
pub trait ProtocolCheck: Send + Sync {
    /// Service identifier; also names the output file.
    fn name(&self) -> &'static str;

    /// Ports probed when no override is given.
    fn default_ports(&self) -> &'static [u16];

    /// Probe one (target, port) pair, with each network step bounded by
    /// the given per-operation timeouts.
    async fn probe(&self, target: &str, port: u16, timeouts: &Timeouts) -> CheckResult;
}

/// Registry entry: the check plus the summary counters it contributes.
pub struct ServiceEntry {
    pub check: Arc<dyn ProtocolCheck>,
    pub counters: Vec<ExposureCounter>,
}

pub fn create_registry() -> Vec<ServiceEntry> {
    vec![
        ServiceEntry {
            check: Arc::new(telnet::TelnetCheck),
            counters: vec![ExposureCounter {
                name: "ntlm_negotiation",
                applies: |r| r.field_is_true("ntlm_negotiation"),
            }],
        },
        ServiceEntry {
            check: Arc::new(zookeeper::ZookeeperCheck),
            counters: vec![],
        },
        ServiceEntry {
            check: Arc::new(memcached::MemcachedCheck),
            counters: vec![],
        },
        ServiceEntry {
            check: Arc::new(nats::NatsCheck),
            counters: vec![ExposureCounter {
                name: "pong_received",
                applies: |r| r.field_is_true("pong_received"),
            }],
        },
        ServiceEntry {
            check: Arc::new(ajp::AjpCheck),
            counters: vec![ExposureCounter {
                name: "cpong_received",
                applies: |r| r.field_is_true("cpong_received"),
            }],
        },
        ServiceEntry {
            check: Arc::new(vnc::VncCheck),
            counters: vec![ExposureCounter {
                name: "no_auth",
                applies: |r| r.field_is_true("no_auth"),
            }],
        },
        ServiceEntry {
            check: Arc::new(redis::RedisCheck::new(default_credentials())),
            counters: vec![
                ExposureCounter {
                    name: "unauthenticated_access",
                    applies: |r| r.field_is_true("unauthenticated_access"),
                },
                ExposureCounter {
                    name: "default_credentials_worked",
                    applies: |r| {
                        matches!(
                            r.fields.get("default_credentials_worked"),
                            Some(Value::Array(creds)) if !creds.is_empty()
                        )
                    },
                },
            ],
        },
        ServiceEntry {
            check: Arc::new(elasticsearch::ElasticsearchCheck),
            counters: vec![ExposureCounter {
                name: "unauthenticated_access",
                applies: |r| r.field_is_true("unauthenticated_access"),
            }],
        },
    ]
}

pub fn lookup(name: &str) -> Option<ServiceEntry> {
    create_registry().into_iter().find(|e| e.check.name() == name)
}

pub fn service_names() -> Vec<&'static str> {
    create_registry().iter().map(|e| e.check.name()).collect()
}
