mod document;
mod friend;
mod user;

pub use document::*;
pub use friend::*;
pub use user::*;
