//! The call-control core: the per-connection TU state machine and the PBX
//! registry that ties TUs together by extension.

pub mod error;
pub mod pbx;
pub mod tu;

pub use error::PbxError;
pub use pbx::Pbx;
pub use tu::{Tu, TuState};
