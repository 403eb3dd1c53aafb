//! Wire protocol between the controller and the privileged broker
//!
//! JSON-encoded messages, one per line, over a Unix domain socket. The
//! broker detaching is signaled by socket EOF, not by a message.
//!
//! Command arguments travel as discrete tokens: target identifiers are
//! never joined into a single shell string, so a crafted identifier cannot
//! smuggle extra arguments into the privileged process.

use serde::{Deserialize, Serialize};

/// Request from the controller to the broker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrokerRequest {
    /// Attach this client to the broker
    Attach {
        /// Client name, for broker-side logging
        client: String,
    },

    /// Ask the broker to raise a user-mediated permission grant dialog
    RequestPermission {
        /// Correlates the eventual result push
        request_id: u64,
    },

    /// Run a privileged command
    Exec {
        /// Correlates the eventual result push
        id: u64,
        /// Command tokens; each element is one discrete argument
        argv: Vec<String>,
    },

    /// Liveness check
    Ping,
}

/// Message pushed from the broker to the controller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrokerPush {
    /// Attach accepted
    Attached {
        /// Whether this client already holds the execution permission
        permission: bool,
    },

    /// Result of a permission request
    PermissionResult {
        /// Matches the originating request
        request_id: u64,
        /// Whether the grant was given
        granted: bool,
    },

    /// Result of an `Exec` request
    ExecResult {
        /// Matches the originating request
        id: u64,
        /// Process exit code
        exit_code: i32,
        /// Captured standard output
        stdout: String,
        /// Captured standard error
        stderr: String,
    },

    /// Liveness reply
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip_request(req: &BrokerRequest) -> BrokerRequest {
        let json = serde_json::to_string(req).unwrap();
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn test_exec_request_keeps_discrete_argv() {
        let req = BrokerRequest::Exec {
            id: 7,
            argv: vec!["suspend".into(), "com.x".into(), "com.y z".into()],
        };
        match round_trip_request(&req) {
            BrokerRequest::Exec { id, argv } => {
                assert_eq!(id, 7);
                assert_eq!(argv.len(), 3);
                assert_eq!(argv[2], "com.y z");
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_push_tagging() {
        let push = BrokerPush::PermissionResult {
            request_id: 3,
            granted: true,
        };
        let json = serde_json::to_string(&push).unwrap();
        assert!(json.contains("\"type\":\"permission_result\""));

        let parsed: BrokerPush = serde_json::from_str(&json).unwrap();
        match parsed {
            BrokerPush::PermissionResult {
                request_id,
                granted,
            } => {
                assert_eq!(request_id, 3);
                assert!(granted);
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_exec_result_round_trip() {
        let push = BrokerPush::ExecResult {
            id: 1,
            exit_code: 1,
            stdout: String::new(),
            stderr: "permission denied".into(),
        };
        let json = serde_json::to_string(&push).unwrap();
        let parsed: BrokerPush = serde_json::from_str(&json).unwrap();
        match parsed {
            BrokerPush::ExecResult {
                exit_code, stderr, ..
            } => {
                assert_eq!(exit_code, 1);
                assert_eq!(stderr, "permission denied");
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }
}
