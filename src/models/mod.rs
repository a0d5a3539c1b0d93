pub mod appointment;
pub mod conversation;
pub mod intent;
pub mod message;

pub use appointment::{Appointment, AppointmentStatus, Attachment};
pub use conversation::{ConversationState, Draft, Stage};
pub use intent::{Classification, Entities, Intent};
pub use message::IncomingMessage;
