// HTTP surface for Alexa directives

mod directives;

pub use directives::{create_router, AppState};
