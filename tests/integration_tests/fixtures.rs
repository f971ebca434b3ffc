//! Response bodies shared by the integration tests

#![allow(dead_code)]

/// Successful batch upload acknowledgement
pub const BATCH_OK: &str = r#"{"status":"success","adds":1,"deletes":0}"#;

/// Batch rejected for a malformed document
pub const BATCH_REJECTED: &str =
    r#"{"status":"error","errors":[{"message":"Field \"title\" must be a string"}]}"#;

/// Page returned by a service that is up but overloaded
pub const SERVICE_UNAVAILABLE: &str = "Service Unavailable";

/// Server information returned by the probe endpoint
pub const SERVER_INFO: &str = r#"{"baseUrl":"http://wiki.example.com","version":"7.19.1","buildNumber":"8804"}"#;

/// A body that is not JSON at all
pub const NOT_JSON: &str = "<html><body>maintenance</body></html>";
