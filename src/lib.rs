//! streamwatch
//!
//! Supervises recording of live-streamed channels. Each registered
//! channel gets an independent monitor task that polls for a live
//! broadcast via an external capture tool and, while one is running,
//! records it to disk with that same tool. The supervisor mediates
//! concurrent add/remove/start/stop commands against the monitor fleet
//! without leaking capture processes.

pub mod capture;
pub mod cli;
pub mod config;
pub mod logging;
pub mod monitor;
pub mod probe;
pub mod registry;
pub mod status;
pub mod supervisor;
