pub mod debugger;
pub mod replay;
