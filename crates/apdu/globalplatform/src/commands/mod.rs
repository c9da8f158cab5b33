//! GlobalPlatform command definitions
//!
//! One module per APDU: a command struct with builder constructors and a
//! typed success/error pair parsed from the status word.

pub mod delete;
pub mod external_authenticate;
pub mod generate_key;
pub mod get_data;
pub mod initialize_update;
pub mod internal_authenticate;
pub mod perform_security_operation;
pub mod put_key;
pub mod select;
pub mod store_data;

pub use delete::DeleteCommand;
pub use external_authenticate::ExternalAuthenticateCommand;
pub use generate_key::GenerateKeyCommand;
pub use get_data::GetDataCommand;
pub use initialize_update::InitializeUpdateCommand;
pub use internal_authenticate::InternalAuthenticateCommand;
pub use perform_security_operation::PerformSecurityOperationCommand;
pub use put_key::PutKeyCommand;
pub use select::SelectCommand;
pub use store_data::StoreDataCommand;
