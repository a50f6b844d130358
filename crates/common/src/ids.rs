use std::time::{SystemTime, UNIX_EPOCH};

pub fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn new_connection_id() -> String {
    format!("c_{}", uuid::Uuid::new_v4().simple())
}

pub fn now_ms() -> i64 {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_millis() as i64
}
