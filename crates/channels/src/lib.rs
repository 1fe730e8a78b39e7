//! Messaging transports for authorchat.
//!
//! Each channel delivers author replies to one platform and reports on
//! delivery. Inbound traffic reaches the turn pipeline through
//! [`MessagingService`].
//!
//! Available channels:
//! - **Twilio** - WhatsApp through the Twilio REST API
//! - **Console** - Interactive terminal chat (stdin/stdout)

pub mod console;
pub mod messaging;
pub mod twilio;

pub use console::ConsoleChannel;
pub use messaging::MessagingService;
pub use twilio::TwilioChannel;
