use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::config::AppConfig;
use crate::services::calendar::CalendarMirror;
use crate::services::classifier::IntentClassifier;
use crate::services::messaging::MessagingProvider;
use crate::services::notify::Notifier;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub classifier: Box<dyn IntentClassifier>,
    pub messaging: Box<dyn MessagingProvider>,
    pub notifier: Box<dyn Notifier>,
    pub calendar: Option<Box<dyn CalendarMirror>>,
}
