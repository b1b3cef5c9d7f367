mod course_settings;
mod organization;
mod organization_settings;
mod provider;

pub use course_settings::*;
pub use organization::*;
pub use organization_settings::*;
pub use provider::*;
