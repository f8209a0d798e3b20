mod error;
mod settings;
mod site_json;

pub use error::*;
pub use settings::*;
pub use site_json::*;
