pub mod config;
pub mod error;
pub mod ident;

pub use config::{active_profile, available_profiles, load_dotenv};
pub use error::*;
pub use ident::to_column_name;
