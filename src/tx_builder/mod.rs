//! Transaction assembly
//!
//! - **instructions**: budget prefix planning and order validation
//! - **lookup**: lookup-table resolution (required vs optional)
//! - **builder**: checkpoint binding and V0 compilation
//! - **output**: immutable compiled/signed outputs
//! - **simulate**: unsigned transactions for simulation and fee estimation

pub mod builder;
pub mod instructions;
pub mod lookup;
pub mod output;
pub mod simulate;

pub use builder::{compile_message, TxAssembler};
pub use output::{CompiledMessage, SignedTransaction};
