pub mod cache;
pub mod error;
pub mod http;
pub mod listener;
pub mod request;

use anyhow::Result;
use std::sync::Arc;

use crate::settings::Settings;

use self::http::Forwarder;

/// Shared state handed to every connection task.
#[derive(Clone)]
pub struct AppContext {
    pub settings: Arc<Settings>,
    pub cache: Arc<cache::HttpCache>,
    pub forwarder: Forwarder,
}

impl AppContext {
    pub fn new(settings: Arc<Settings>, cache: Arc<cache::HttpCache>) -> Self {
        let forwarder = Forwarder::from_settings(&settings);
        Self {
            settings,
            cache,
            forwarder,
        }
    }
}

pub async fn run(app: AppContext) -> Result<()> {
    listener::start_listener(app).await
}
