//! SAML 2.0 assertion types and the claims they are projected into.

mod assertion;
mod claims;
mod constants;
mod key_info;
mod name_id;

pub use assertion::*;
pub use claims::*;
pub use constants::*;
pub use key_info::*;
pub use name_id::*;
