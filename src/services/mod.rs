pub mod agenda;
pub mod calendar;
pub mod classifier;
pub mod conversation;
pub mod followup;
pub mod keywords;
pub mod media;
pub mod messaging;
pub mod notify;
