//! Domain types, the pure identity-matching rules, and the ports the
//! application layer drives.

pub mod financials;
pub mod ledger;
pub mod matching;
pub mod ports;
pub mod remote;
pub mod transaction;
pub mod workflow;
