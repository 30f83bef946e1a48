use crate::app::response::{Empty, Reply};

pub async fn health() -> Reply<Empty> {
    Reply::Ok(Empty {})
}
