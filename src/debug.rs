//! Listing printer and interactive debugger, built with the `debugger` feature.
//!
//! The debugger is an ordinary [`Observer`](crate::Observer): running an
//! instance under it uses the same interpreter as everything else.

mod printer;
mod session;

pub use printer::{Line, Listing, Site, Style};
pub use session::{Command, Controller, Debugger, Terminal};
