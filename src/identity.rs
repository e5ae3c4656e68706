//! Client identity
//!
//! The service tells clients apart by two identifiers:
//!
//! - the **client name** sent as the initial `sessionId`: the service name plus
//!   an underscore and nine random base36 characters (`Sample_k3x9q0z1m`)
//! - the **machine id**, generated once per connector and reused on every
//!   reconnect so the service can correlate a restarted client

use rand::Rng;
use uuid::Uuid;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of the random suffix appended to the service name
pub const CLIENT_SUFFIX_LEN: usize = 9;

/// Generate a unique client name for `service_name`.
pub fn client_name(service_name: &str) -> String {
    format!("{}_{}", service_name, random_base36(CLIENT_SUFFIX_LEN))
}

/// Generate a new machine identifier.
pub fn machine_id() -> String {
    Uuid::new_v4().to_string()
}

/// `len` random base36 characters.
fn random_base36(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}
