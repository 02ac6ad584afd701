pub mod capabilities;
pub mod consts;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod messages;
pub mod resources;
pub mod smart_home;
pub mod state_report;

pub use errors::{AlexaError, HandlerResult};
pub use messages::{Directive, DirectiveError, PropertyReport, Response};
pub use smart_home::{AuditEvent, SmartHome};
