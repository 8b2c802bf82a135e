pub mod address;
pub mod anoncreds;
pub mod did;
pub mod error;
pub mod receipt;
pub mod record;
pub mod transaction;

pub use address::*;
pub use did::*;
pub use error::*;
pub use receipt::*;
pub use record::*;
pub use transaction::*;
